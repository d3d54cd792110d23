use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn main() {
    // Re-run build script when this file changes
    println!("cargo:rerun-if-changed=build.rs");

    // Build date (UTC RFC 3339). Fallback to unix:<secs> if formatting fails.
    let now = OffsetDateTime::now_utc();
    let build_date = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| format!("unix:{}", now.unix_timestamp()));
    println!("cargo:rustc-env=DCC_FREE_MEM_BUILD_DATE={build_date}");

    // Target triple and profile
    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=DCC_FREE_MEM_BUILD_TARGET={target}");

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=DCC_FREE_MEM_BUILD_PROFILE={profile}");

    // rustc version (best-effort)
    let rustc_ver = rustc_version::version_meta()
        .map(|m| m.short_version_string)
        .unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=DCC_FREE_MEM_BUILD_RUSTC={rustc_ver}");
}

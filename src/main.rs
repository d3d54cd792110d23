use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use dcc_free_mem::{
    exit_code_for_io_error, init_local_offset, start_proxy, telemetry_init, FileLogs,
    FreeCommand, MemorySampler, RequestLog,
};

mod cli;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Must run while the process is still single-threaded.
    init_local_offset();
    telemetry_init(cli.verbose);

    let sampler = FreeCommand::from_env();
    if cli.verbose {
        eprintln!(
            "{}: build={} target={} profile={} rust={} ver={}",
            env!("CARGO_PKG_NAME"),
            env!("DCC_FREE_MEM_BUILD_DATE"),
            env!("DCC_FREE_MEM_BUILD_TARGET"),
            env!("DCC_FREE_MEM_BUILD_PROFILE"),
            env!("DCC_FREE_MEM_BUILD_RUSTC"),
            env!("CARGO_PKG_VERSION")
        );
        eprintln!(
            "{}: memory report: {}",
            env!("CARGO_PKG_NAME"),
            sampler.program().to_string_lossy()
        );
    }

    let sampler: Arc<dyn MemorySampler> = Arc::new(sampler);
    let logs: Arc<dyn RequestLog> = Arc::new(FileLogs::new(cli.log_targets()));

    let (_addr, _running, handle) = match start_proxy(&cli.proxy_config(), sampler, logs) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}: {e}", env!("CARGO_PKG_NAME"));
            return ExitCode::from(exit_code_for_io_error(&e));
        }
    };

    if handle.join().is_err() {
        eprintln!("{}: server thread panicked", env!("CARGO_PKG_NAME"));
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

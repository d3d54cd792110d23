//! Memory-stats provider: available memory in MiB as reported by `free(1)`.
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use which::which;

use crate::errors::ProviderError;
use crate::util::{ExecRequest, ExecService};

/// Environment override for the memory-report program.
pub const FREE_BIN_ENV: &str = "DCC_FREE_MEM_FREE_BIN";

/// One fresh reading of available memory. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeMemSample {
    pub megabytes: u64,
}

/// Anything that can produce a [`FreeMemSample`] on demand.
pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> Result<FreeMemSample, ProviderError>;
}

/// Runs `free --mebi --wide` and reads the last column of the `Mem:` row.
#[derive(Debug, Clone)]
pub struct FreeCommand {
    program: OsString,
    exec: ExecService,
}

impl FreeCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            exec: ExecService::new().require_success(true),
        }
    }

    /// Honor `DCC_FREE_MEM_FREE_BIN`, then fall back to `free` on PATH.
    pub fn from_env() -> Self {
        match env::var_os(FREE_BIN_ENV).filter(|v| !v.is_empty()) {
            Some(p) => Self::new(p),
            None => Self::new(resolve_free().into_os_string()),
        }
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }
}

// Resolve eagerly for a readable path in diagnostics; spawning reports the real failure.
fn resolve_free() -> PathBuf {
    which("free").unwrap_or_else(|_| PathBuf::from("free"))
}

impl MemorySampler for FreeCommand {
    fn sample(&self) -> Result<FreeMemSample, ProviderError> {
        let out = self.exec.run(
            ExecRequest::new(self.program.clone())
                .args(["--mebi", "--wide"])
                .env("LC_ALL", "C"),
        )?;
        tracing::debug!(
            program = ?self.program,
            elapsed_ms = out.duration.as_millis() as u64,
            "memory report finished"
        );
        let megabytes = parse_free_output(&out.stdout)?;
        Ok(FreeMemSample { megabytes })
    }
}

/// Parse `free --wide` output: the first line starting with `Mem:` is split on
/// whitespace and its last field is the "available" column.
pub fn parse_free_output(output: &str) -> Result<u64, ProviderError> {
    let line = output
        .lines()
        .find(|l| l.starts_with("Mem:"))
        .ok_or(ProviderError::NoMemLine)?;
    let last = line.split_whitespace().last().unwrap_or_default();
    last.parse::<u64>()
        .map_err(|_| ProviderError::BadField(last.to_string()))
}

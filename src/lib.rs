//! Wrapper over distccd's `--stats` endpoint that adds `dcc_free_mem`, the
//! host's available memory in MiB, to the reported statistics.
//!
//! The pieces, leaf to root: [`memory`] samples `free(1)`, [`server`] fetches
//! from the daemon, rewrites the document and answers the caller, and
//! [`logs`] records every request in the access/error/system logs.

pub mod errors;
pub mod logs;
pub mod memory;
pub mod server;
pub mod telemetry;
pub mod util;

pub use errors::*;
pub use logs::{init_local_offset, FileLogs, LogTargets, RequestLog};
pub use memory::{FreeCommand, FreeMemSample, MemorySampler};
pub use server::*;
pub use telemetry::telemetry_init;

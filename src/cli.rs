use std::path::PathBuf;

use clap::Parser;

use dcc_free_mem::logs::{DEFAULT_ACCESS_LOG, DEFAULT_ERROR_LOG, DEFAULT_SYSTEM_LOG};
use dcc_free_mem::{LogTargets, ProxyConfig, DEFAULT_HOST};

#[derive(Parser, Debug)]
#[command(
    name = "dcc-free-mem",
    version,
    about = "Serve `dcc_free_mem` alongside the reported statistics of a 'distccd' server."
)]
pub(crate) struct Cli {
    /// The TCP port to listen on where the extended statistics will be reported
    pub listen_port: u16,

    /// The statistics server's port number, as was passed to "distccd --stats-port=PORT"
    #[arg(value_name = "PORT")]
    pub stats_port: u16,

    /// Path to the webserver's output "access log" file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ACCESS_LOG)]
    pub access_log: PathBuf,

    /// Path to the webserver's output "error log" file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ERROR_LOG)]
    pub error_log: PathBuf,

    /// Path to the standard "syslog" file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SYSTEM_LOG)]
    pub system_log: PathBuf,

    /// Address to listen on
    #[arg(long, value_name = "HOST", default_value = DEFAULT_HOST)]
    pub listen_host: String,

    /// Address of the distccd statistics server
    #[arg(long, value_name = "HOST", default_value = DEFAULT_HOST)]
    pub stats_host: String,

    /// Print startup details and info-level diagnostics
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    pub(crate) fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port,
            stats_host: self.stats_host.clone(),
            stats_port: self.stats_port,
            verbose: self.verbose,
        }
    }

    pub(crate) fn log_targets(&self) -> LogTargets {
        LogTargets {
            access_log: self.access_log.clone(),
            error_log: self.error_log.clone(),
            system_log: self.system_log.clone(),
        }
    }
}

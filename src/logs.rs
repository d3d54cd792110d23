/*!
Diagnostic log files: access log, error log and an emulated syslog.

Access/error lines follow the classic HTTP server layout
`<client> - - [<dd/Mon/yyyy HH:MM:SS>] <message>`; the system log uses
`<Mon> <d> <HH:MM:SS> <host> <tag>[<pid>]: <message>`.

Logging is best-effort. A failed append is reported to the system log
(and stderr), and a failed system-log append goes to stderr only. Nothing
here returns an error to the request path.
*/
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use once_cell::sync::{Lazy, OnceCell};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::errors::LoggingError;

/// Default log locations.
pub const DEFAULT_ACCESS_LOG: &str = "/var/log/access.log";
pub const DEFAULT_ERROR_LOG: &str = "/var/log/error.log";
pub const DEFAULT_SYSTEM_LOG: &str = "/var/log/syslog";

static LOCAL_OFFSET: OnceCell<UtcOffset> = OnceCell::new();

static HOSTNAME: Lazy<String> = Lazy::new(|| {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
});

/// Capture the local UTC offset. Call before spawning threads; the offset
/// cannot be queried reliably once the process is multi-threaded.
pub fn init_local_offset() {
    let _ = LOCAL_OFFSET.set(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC));
}

fn now_local() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

/// `17/Oct/2026 09:05:01`
pub fn log_date_time_string(t: OffsetDateTime) -> String {
    t.format(format_description!(
        "[day]/[month repr:short]/[year] [hour]:[minute]:[second]"
    ))
    .unwrap_or_default()
}

pub fn format_log_line(client: &str, date: &str, message: &str) -> String {
    format!("{client} - - [{date}] {message}\n")
}

pub fn format_syslog_line(t: OffsetDateTime, host: &str, tag: &str, pid: u32, message: &str) -> String {
    let date = t
        .format(format_description!(
            "[month repr:short] [day padding:space] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();
    format!("{date} {host} {tag}[{pid}]: {message}\n")
}

/// Append one complete line under an exclusive advisory lock.
pub fn append_line(path: &Path, line: &str) -> Result<(), LoggingError> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.lock_exclusive()?;
    let res = f.write_all(line.as_bytes()).and_then(|_| f.flush());
    let _ = FileExt::unlock(&f);
    res?;
    Ok(())
}

/// Logging capability handed to the front door.
pub trait RequestLog: Send + Sync {
    /// One access-log entry per answered request.
    fn access(&self, client: &str, message: &str);
    fn error(&self, client: &str, message: &str);
    fn system(&self, message: &str);
}

#[derive(Debug, Clone)]
pub struct LogTargets {
    pub access_log: PathBuf,
    pub error_log: PathBuf,
    pub system_log: PathBuf,
}

/// File-backed [`RequestLog`].
#[derive(Debug, Clone)]
pub struct FileLogs {
    targets: LogTargets,
    tag: String,
}

impl FileLogs {
    pub fn new(targets: LogTargets) -> Self {
        Self {
            targets,
            tag: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    fn log_to(&self, path: &Path, client: &str, message: &str) {
        let line = format_log_line(client, &log_date_time_string(now_local()), message);
        if let Err(e) = append_line(path, &line) {
            tracing::debug!(path = %path.display(), error = %e, "log append failed");
            self.system(&format!(
                "{} failed to log a message to file \"{}\":",
                self.tag,
                path.display()
            ));
            self.system(line.trim_end());
            eprintln!("{}", line.trim_end());
        }
    }
}

impl RequestLog for FileLogs {
    fn access(&self, client: &str, message: &str) {
        self.log_to(&self.targets.access_log, client, message);
    }

    fn error(&self, client: &str, message: &str) {
        self.log_to(&self.targets.error_log, client, message);
    }

    fn system(&self, message: &str) {
        let line = format_syslog_line(
            now_local(),
            &HOSTNAME,
            &self.tag,
            std::process::id(),
            message,
        );
        if append_line(&self.targets.system_log, &line).is_err() {
            eprintln!("{}", line.trim_end());
        }
    }
}

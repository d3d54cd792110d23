//! Error mapping guide:
//! - UpstreamError answers the caller with 500 and the diagnostic text.
//! - DocumentError answers with 204 and an empty body.
//! - ProviderError answers with 203 and the untouched upstream body.
//! - LoggingError never leaves the logs module.
//! - Map io::ErrorKind::NotFound to exit code 127; all others to 1.
use std::fmt;
use std::io;

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Failure reaching or talking to the stats daemon.
#[derive(Debug)]
pub enum UpstreamError {
    Io(io::Error),
    /// The daemon answered with an error status (code, reason).
    Status(u16, String),
    Protocol(String),
}

/// The upstream body is not a framed stats document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
    Empty,
    MissingStartMarker,
    MissingEndMarker,
}

/// The memory sampler could not produce a value.
#[derive(Debug)]
pub enum ProviderError {
    Exec(String),
    NoMemLine,
    BadField(String),
}

#[derive(Debug)]
pub enum LoggingError {
    Io(io::Error),
}

impl From<io::Error> for UpstreamError {
    fn from(e: io::Error) -> Self {
        UpstreamError::Io(e)
    }
}

impl From<io::Error> for LoggingError {
    fn from(e: io::Error) -> Self {
        LoggingError::Io(e)
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(e: anyhow::Error) -> Self {
        ProviderError::Exec(format!("{e:#}"))
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Io(e) => write!(f, "{e}"),
            UpstreamError::Status(code, reason) => write!(f, "HTTP Error {code}: {reason}"),
            UpstreamError::Protocol(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentError::Empty => "empty response",
            DocumentError::MissingStartMarker => "missing <distccstats> marker",
            DocumentError::MissingEndMarker => "missing </distccstats> marker",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Exec(s) => write!(f, "failed to run memory report: {s}"),
            ProviderError::NoMemLine => f.write_str("No 'Mem:' line found in the output of `free`"),
            ProviderError::BadField(v) => {
                write!(f, "last field of the 'Mem:' line is not an integer: {v:?}")
            }
        }
    }
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpstreamError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for DocumentError {}

impl std::error::Error for ProviderError {}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggingError::Io(e) => Some(e),
        }
    }
}

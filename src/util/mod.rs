#![allow(clippy::module_name_repetitions)]
//! Small utilities: subprocess execution and byte-level header helpers.

pub mod exec;

pub use exec::{ExecOutput, ExecRequest, ExecService};

fn find_crlfcrlf(buf: &[u8]) -> Option<usize> {
    if buf.len() < 4 {
        return None;
    }
    let pattern: &[u8; 4] = b"\r\n\r\n";
    buf.windows(4).position(|w| w == pattern)
}

/// Find end of HTTP headers, accepting either CRLF-CRLF or LF-LF separators.
/// Returns the index just after the header terminator when found.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    let crlf = find_crlfcrlf(buf).map(|pos| pos + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Split a header block terminator off: returns (header bytes, body start).
pub fn split_header_block(buf: &[u8]) -> Option<(&[u8], usize)> {
    let end_idx = find_header_end(buf)?;
    let header_bytes: &[u8] = if end_idx >= 4 && &buf[end_idx - 4..end_idx] == b"\r\n\r\n" {
        &buf[..end_idx - 4]
    } else {
        &buf[..end_idx - 2]
    };
    Some((header_bytes, end_idx))
}

/*!
Response rewriter: decide what the caller gets for one upstream answer.

Four exits, checked in order:
1. Invalid document (empty, or a marker missing) -> 204, empty body.
2. Metric already present -> upstream status and body verbatim.
3. Sample ok -> `dcc_free_mem <N> MB` spliced in before the last line.
4. Sample failed -> 203 with the untouched upstream body.

Headers always mirror upstream in order; only `Content-Length` is recomputed.
*/

use super::http::HeaderList;
use super::upstream::UpstreamResponse;
use crate::errors::{DocumentError, ProviderError};
use crate::memory::{FreeMemSample, MemorySampler};

pub const START_MARKER: &str = "<distccstats>";
pub const END_MARKER: &str = "</distccstats>";
pub const METRIC_NAME: &str = "dcc_free_mem";

pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_NON_AUTHORITATIVE: u16 = 203;

/// Which branch produced the response.
#[derive(Debug)]
pub enum Outcome {
    Invalid(DocumentError),
    AlreadyInstrumented,
    Injected(FreeMemSample),
    ProviderFailed(ProviderError),
}

/// The response to send back, headers already finalized.
#[derive(Debug)]
pub struct Rewritten {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
    pub outcome: Outcome,
}

pub fn validate_document(body: &str) -> Result<(), DocumentError> {
    if body.is_empty() {
        Err(DocumentError::Empty)
    } else if !body.contains(START_MARKER) {
        Err(DocumentError::MissingStartMarker)
    } else if !body.contains(END_MARKER) {
        Err(DocumentError::MissingEndMarker)
    } else {
        Ok(())
    }
}

pub fn has_metric(body: &str) -> bool {
    body.contains(METRIC_NAME)
}

/// Split on `\n`, `\r\n` and a lone `\r`. A terminator at the very end
/// does not open an extra empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                out.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                out.push(&text[start..i]);
                i += 1;
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        out.push(&text[start..]);
    }
    out
}

/// Insert the metric as the second-to-last line, then close the document
/// with a trailing blank line (`...</distccstats>\n\n`).
pub fn inject_free_mem(body: &str, megabytes: u64) -> String {
    let mut lines = split_lines(body);
    let metric = format!("{METRIC_NAME} {megabytes} MB");
    let at = lines.len().saturating_sub(1);
    lines.insert(at, &metric);
    lines.push("");
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Copy headers in order, replacing `Content-Length` in place (appending it
/// when absent) and dropping `Transfer-Encoding`.
pub fn finalize_headers(headers: &HeaderList, body_len: usize) -> HeaderList {
    let mut out = HeaderList::with_capacity(headers.len() + 1);
    let mut has_length = false;
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("transfer-encoding") {
            continue;
        }
        if k.eq_ignore_ascii_case("content-length") {
            if has_length {
                continue;
            }
            has_length = true;
            out.push((k.clone(), body_len.to_string()));
        } else {
            out.push((k.clone(), v.clone()));
        }
    }
    if !has_length {
        out.push(("Content-Length".to_string(), body_len.to_string()));
    }
    out
}

fn respond(upstream: &UpstreamResponse, status: u16, body: Vec<u8>, outcome: Outcome) -> Rewritten {
    Rewritten {
        status,
        headers: finalize_headers(&upstream.headers, body.len()),
        body,
        outcome,
    }
}

/// Run the decision chain. The sampler is only consulted for a valid,
/// not yet instrumented document.
pub fn rewrite(upstream: &UpstreamResponse, sampler: &dyn MemorySampler) -> Rewritten {
    let text = upstream.text();

    if let Err(e) = validate_document(text) {
        return respond(upstream, STATUS_NO_CONTENT, Vec::new(), Outcome::Invalid(e));
    }

    if has_metric(text) {
        return respond(
            upstream,
            upstream.status,
            upstream.body.clone(),
            Outcome::AlreadyInstrumented,
        );
    }

    match sampler.sample() {
        Ok(sample) => {
            let body = inject_free_mem(text, sample.megabytes).into_bytes();
            respond(upstream, upstream.status, body, Outcome::Injected(sample))
        }
        Err(e) => respond(
            upstream,
            STATUS_NON_AUTHORITATIVE,
            upstream.body.clone(),
            Outcome::ProviderFailed(e),
        ),
    }
}

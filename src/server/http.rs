/*!
HTTP helpers for the stats wrapper: tolerant request-head parsing, upstream
response parsing, and response emission.

Headers are kept as an ordered list so duplicates and original spelling
survive the round trip through the wrapper.
*/

use std::io::{self, Read, Write};

use crate::util::{find_header_end, split_header_block};

/// Header cap for inbound request heads.
const HDR_CAP: usize = 64 * 1024;

/// Supported HTTP methods (minimal)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Other(String),
}

/// Ordered header list; names keep their original spelling.
pub type HeaderList = Vec<(String, String)>;

/// Parsed inbound request head. Request bodies are never read.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub request_line: String,
    pub path: String,
}

/// Parsed response head from the stats daemon.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderList,
}

/// Read one request head from a stream.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything. A malformed request line yields `InvalidData` with a message
/// suitable for a 400 response.
pub fn read_http_request<R: Read>(reader: &mut R) -> io::Result<Option<HttpRequest>> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    while find_header_end(&buf).is_none() && buf.len() < HDR_CAP {
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    if buf.is_empty() {
        return Ok(None);
    }

    let header_bytes = match split_header_block(&buf) {
        Some((hdr, _)) => hdr,
        None => &buf[..],
    };
    let header_str = String::from_utf8_lossy(header_bytes);
    let mut lines = header_str.lines();
    let request_line = lines
        .next()
        .unwrap_or_default()
        .trim_end_matches(['\r', '\n'])
        .to_string();

    let (method, path) = parse_request_line(&request_line).map_err(|msg| {
        io::Error::new(io::ErrorKind::InvalidData, msg)
    })?;
    Ok(Some(HttpRequest {
        method,
        request_line,
        path,
    }))
}

fn parse_request_line(request_line: &str) -> Result<(Method, String), String> {
    let words: Vec<&str> = request_line.split_whitespace().collect();
    let (method, target) = match words.as_slice() {
        [m, t, v] => {
            if !v.starts_with("HTTP/") {
                return Err(format!("Bad request version ({v:?})"));
            }
            (*m, *t)
        }
        [m, t] if *m == "GET" => (*m, *t),
        _ => return Err(format!("Bad request syntax ({request_line:?})")),
    };
    let method = match method {
        "GET" => Method::Get,
        other => Method::Other(other.to_string()),
    };
    Ok((method, target.to_string()))
}

fn parse_headers<'a, I: Iterator<Item = &'a str>>(lines: I) -> HeaderList {
    let mut out = HeaderList::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            out.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    out
}

/// Case-insensitive lookup of the first header with this name.
pub fn header_value<'a>(headers: &'a HeaderList, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Split a complete upstream response (read to EOF) into head and de-framed body.
pub fn parse_response(buf: &[u8]) -> Result<(ResponseHead, Vec<u8>), String> {
    let (header_bytes, body_start) =
        split_header_block(buf).ok_or_else(|| "incomplete response head".to_string())?;
    let header_str = String::from_utf8_lossy(header_bytes);
    let mut lines = header_str.lines();
    let status_line = lines.next().unwrap_or_default().trim();

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(format!("bad status line: {status_line:?}"));
    }
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .filter(|c| (100..1000).contains(c))
        .ok_or_else(|| format!("bad status line: {status_line:?}"))?;
    let reason = parts.next().unwrap_or_default().trim().to_string();
    let headers = parse_headers(lines);

    let raw = &buf[body_start..];
    let chunked = header_value(&headers, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);
    let body = if chunked {
        decode_chunked(raw)?
    } else if let Some(cl) = header_value(&headers, "content-length") {
        let n: usize = cl
            .trim()
            .parse()
            .map_err(|_| format!("bad Content-Length: {cl:?}"))?;
        if raw.len() < n {
            return Err(format!(
                "incomplete read ({} bytes read, {} more expected)",
                raw.len(),
                n - raw.len()
            ));
        }
        raw[..n].to_vec()
    } else {
        raw.to_vec()
    };

    Ok((
        ResponseHead {
            status,
            reason,
            headers,
        },
        body,
    ))
}

/// Decode a complete chunked body; trailers are discarded.
pub fn decode_chunked(mut raw: &[u8]) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    loop {
        let eol = raw
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| "truncated chunk size line".to_string())?;
        let line = String::from_utf8_lossy(&raw[..eol]);
        let size_hex = line.trim().split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| format!("bad chunk size: {size_hex:?}"))?;
        raw = &raw[eol + 1..];
        if size == 0 {
            return Ok(body);
        }
        if raw.len() < size {
            return Err("truncated chunk payload".to_string());
        }
        body.extend_from_slice(&raw[..size]);
        raw = &raw[size..];
        if raw.starts_with(b"\r\n") {
            raw = &raw[2..];
        } else if raw.starts_with(b"\n") {
            raw = &raw[1..];
        }
    }
}

/// Standard reason phrase for the codes this wrapper can emit or relay.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Write status line, then headers, close the head, then the body.
pub fn write_response<W: Write>(
    w: &mut W,
    status: u16,
    headers: &HeaderList,
    body: &[u8],
) -> io::Result<()> {
    let mut head = format!("HTTP/1.0 {status} {}\r\n", reason_phrase(status));
    for (k, v) in headers {
        head.push_str(k);
        head.push_str(": ");
        head.push_str(v);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    w.write_all(head.as_bytes())?;
    w.write_all(body)?;
    w.flush()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Minimal HTML error page carrying the code, message and explanation.
pub fn error_page(code: u16, message: &str, explain: &str) -> String {
    let mut page = String::new();
    page.push_str("<!DOCTYPE HTML>\n");
    page.push_str("<html lang=\"en\">\n");
    page.push_str("    <head>\n");
    page.push_str("        <meta charset=\"utf-8\">\n");
    page.push_str("        <title>Error response</title>\n");
    page.push_str("    </head>\n");
    page.push_str("    <body>\n");
    page.push_str("        <h1>Error response</h1>\n");
    page.push_str(&format!("        <p>Error code: {code}</p>\n"));
    page.push_str(&format!("        <p>Message: {}.</p>\n", html_escape(message)));
    page.push_str(&format!(
        "        <p>Error code explanation: {code} - {}.</p>\n",
        html_escape(explain)
    ));
    page.push_str("    </body>\n");
    page.push_str("</html>\n");
    page
}

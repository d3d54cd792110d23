//! Single-shot HTTP GET against the distccd `--stats` server.
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use url::Url;

use super::http::{parse_response, HeaderList};
use crate::errors::UpstreamError;

/// What the stats daemon answered. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// Body as text; the client only hands out UTF-8 bodies.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    url: Url,
}

impl UpstreamClient {
    pub fn new(host: &str, port: u16) -> Result<Self, UpstreamError> {
        let url = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| UpstreamError::Protocol(format!("invalid stats url for {host}:{port}: {e}")))?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// One GET, fresh connection, no retries, transport default timeouts.
    pub fn fetch(&self) -> Result<UpstreamResponse, UpstreamError> {
        let addrs = self.url.socket_addrs(|| None)?;
        let mut stream = TcpStream::connect(&*addrs)?;

        let host = self.url.host_str().unwrap_or("localhost");
        let port = self.url.port_or_known_default().unwrap_or(80);
        let req = format!(
            "GET {} HTTP/1.1\r\nHost: {host}:{port}\r\nAccept-Encoding: identity\r\nConnection: close\r\n\r\n",
            self.url.path()
        );
        stream.write_all(req.as_bytes())?;
        stream.flush()?;
        let _ = stream.shutdown(Shutdown::Write);

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw)?;
        if raw.is_empty() {
            return Err(UpstreamError::Protocol(
                "Remote end closed connection without response".to_string(),
            ));
        }

        let (head, body) = parse_response(&raw).map_err(UpstreamError::Protocol)?;
        if head.status >= 400 {
            return Err(UpstreamError::Status(head.status, head.reason));
        }
        if std::str::from_utf8(&body).is_err() {
            return Err(UpstreamError::Protocol(
                "stats body is not valid UTF-8".to_string(),
            ));
        }

        Ok(UpstreamResponse {
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
        })
    }
}

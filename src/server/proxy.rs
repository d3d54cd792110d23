/*!
Front door: listener, accept loop, and the per-connection handler.

- Non-blocking accept loop polling a running flag (50 ms backoff).
- One thread per accepted connection; one request per connection.
- Upstream fetch -> rewrite -> access log -> response.
- The "wrapper is redundant" notice fires once per ServerState.
*/
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::http::{self, HeaderList, Method};
use super::rewrite::{self, Outcome, Rewritten};
use super::upstream::UpstreamClient;
use crate::errors::UpstreamError;
use crate::logs::RequestLog;
use crate::memory::MemorySampler;

pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Where to listen and which stats daemon to wrap.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub stats_host: String,
    pub stats_port: u16,
    pub verbose: bool,
}

impl ProxyConfig {
    pub fn new(listen_port: u16, stats_port: u16) -> Self {
        Self {
            listen_host: DEFAULT_HOST.to_string(),
            listen_port,
            stats_host: DEFAULT_HOST.to_string(),
            stats_port,
            verbose: false,
        }
    }
}

/// Process-wide state shared by all handlers.
#[derive(Debug)]
pub struct ServerState {
    stats_port: u16,
    warned_unnecessary: AtomicBool,
}

impl ServerState {
    pub fn new(stats_port: u16) -> Self {
        Self {
            stats_port,
            warned_unnecessary: AtomicBool::new(false),
        }
    }

    pub fn stats_port(&self) -> u16 {
        self.stats_port
    }

    /// True for exactly one caller over the lifetime of this state.
    pub fn claim_unnecessary_warning(&self) -> bool {
        self.warned_unnecessary
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_warned_unnecessary(&self) -> bool {
        self.warned_unnecessary.load(Ordering::Acquire)
    }
}

struct ProxyCtx {
    state: Arc<ServerState>,
    upstream: UpstreamClient,
    sampler: Arc<dyn MemorySampler>,
    logs: Arc<dyn RequestLog>,
}

const UNNECESSARY_SYSLOG_MSG: &str =
    "'dcc_free_mem' found in the output of native 'distccd', the wrapper is now unnecessary!";

fn unnecessary_error_msg() -> String {
    format!("'{}' is unnecessary!", env!("CARGO_PKG_NAME"))
}

/// Bind and start serving on a background thread.
///
/// Returns the bound address, the running flag (store `false` to stop) and
/// the accept-loop join handle.
pub fn start_proxy(
    config: &ProxyConfig,
    sampler: Arc<dyn MemorySampler>,
    logs: Arc<dyn RequestLog>,
) -> io::Result<(SocketAddr, Arc<AtomicBool>, JoinHandle<()>)> {
    let upstream = UpstreamClient::new(&config.stats_host, config.stats_port)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let listener = TcpListener::bind((config.listen_host.as_str(), config.listen_port))
        .map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "proxy bind failed on {}:{}: {e}",
                    config.listen_host, config.listen_port
                ),
            )
        })?;
    let addr = listener
        .local_addr()
        .map_err(|e| io::Error::new(e.kind(), format!("proxy addr failed: {e}")))?;
    listener.set_nonblocking(true)?;

    let ctx = Arc::new(ProxyCtx {
        state: Arc::new(ServerState::new(config.stats_port)),
        upstream,
        sampler,
        logs,
    });
    let running = Arc::new(AtomicBool::new(true));
    let running_cl = running.clone();
    let verbose = config.verbose;

    let handle = std::thread::spawn(move || {
        if verbose {
            eprintln!(
                "{}: listening on {addr}, wrapping {}",
                env!("CARGO_PKG_NAME"),
                ctx.upstream.url()
            );
        }
        tracing::info!(%addr, upstream = %ctx.upstream.url(), "stats wrapper listening");
        loop {
            if !running_cl.load(Ordering::SeqCst) {
                break;
            }
            let (stream, peer) = match listener.accept() {
                Ok(pair) => pair,
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        tracing::warn!(error = %e, "accept error");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                    continue;
                }
            };
            let _ = stream.set_nonblocking(false);
            let ctx_cl = ctx.clone();
            std::thread::spawn(move || {
                let mut s = stream;
                handle_connection(&ctx_cl, &mut s, &peer.ip().to_string());
            });
        }
        tracing::info!("stats wrapper stopped");
    });

    Ok((addr, running, handle))
}

fn handle_connection<S: Read + Write>(ctx: &ProxyCtx, stream: &mut S, client: &str) {
    let req = match http::read_http_request(stream) {
        Ok(Some(r)) => r,
        Ok(None) => return,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            send_error(
                ctx,
                stream,
                client,
                "-",
                400,
                &e.to_string(),
                "Bad request syntax or unsupported method",
            );
            return;
        }
        Err(e) => {
            tracing::debug!(client, error = %e, "dropping connection after read error");
            return;
        }
    };

    if let Method::Other(m) = &req.method {
        send_error(
            ctx,
            stream,
            client,
            &req.request_line,
            501,
            &format!("Unsupported method ('{m}')"),
            "Server does not support this operation",
        );
        return;
    }

    let stats_port = ctx.state.stats_port();
    tracing::debug!(client, path = %req.path, stats_port, "forwarding stats request");

    let upstream = match ctx.upstream.fetch() {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, stats_port, "stats query failed");
            send_error(
                ctx,
                stream,
                client,
                &req.request_line,
                500,
                &format!("An exception occurred when querying the --stats server at :{stats_port}"),
                &upstream_detail(&e),
            );
            return;
        }
    };

    let rewritten = rewrite::rewrite(&upstream, ctx.sampler.as_ref());
    report_outcome(ctx, client, &rewritten);

    ctx.logs.access(
        client,
        &format!(
            "\"{}\" {} {}",
            req.request_line,
            rewritten.status,
            rewritten.body.len()
        ),
    );
    let written = http::write_response(
        stream,
        rewritten.status,
        &rewritten.headers,
        &rewritten.body,
    );
    if let Err(e) = written {
        tracing::debug!(client, error = %e, "client went away before the response was written");
    }
}

fn report_outcome(ctx: &ProxyCtx, client: &str, rewritten: &Rewritten) {
    let stats_port = ctx.state.stats_port();
    match &rewritten.outcome {
        Outcome::Invalid(reason) => {
            tracing::error!(%reason, stats_port, "invalid stats document");
            ctx.logs.error(
                client,
                &format!("--stats at :{stats_port} returned empty or invalid response"),
            );
        }
        Outcome::AlreadyInstrumented => {
            if ctx.state.claim_unnecessary_warning() {
                tracing::warn!("{}", UNNECESSARY_SYSLOG_MSG);
                ctx.logs.system(UNNECESSARY_SYSLOG_MSG);
                ctx.logs.error(client, &unnecessary_error_msg());
            }
        }
        Outcome::Injected(sample) => {
            tracing::debug!(megabytes = sample.megabytes, "injected dcc_free_mem");
        }
        Outcome::ProviderFailed(e) => {
            tracing::error!(error = %e, "memory sample failed");
            ctx.logs
                .error(client, "Failed to get valid response from `free`!");
        }
    }
}

fn upstream_detail(e: &UpstreamError) -> String {
    match e {
        UpstreamError::Io(ioe) => format!("{:?}: {ioe}", ioe.kind()),
        other => other.to_string(),
    }
}

fn send_error<W: Write>(
    ctx: &ProxyCtx,
    w: &mut W,
    client: &str,
    request_line: &str,
    code: u16,
    message: &str,
    explain: &str,
) {
    ctx.logs
        .error(client, &format!("code {code}, message {message}"));
    ctx.logs
        .access(client, &format!("\"{request_line}\" {code} -"));

    let body = http::error_page(code, message, explain).into_bytes();
    let headers: HeaderList = vec![
        ("Connection".to_string(), "close".to_string()),
        (
            "Content-Type".to_string(),
            "text/html;charset=utf-8".to_string(),
        ),
        ("Content-Length".to_string(), body.len().to_string()),
    ];
    let _ = http::write_response(w, code, &headers, &body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Barrier, Mutex};

    use crate::errors::ProviderError;
    use crate::memory::FreeMemSample;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<String>>);

    impl RequestLog for Recorded {
        fn access(&self, client: &str, message: &str) {
            self.0.lock().unwrap().push(format!("access {client} {message}"));
        }
        fn error(&self, client: &str, message: &str) {
            self.0.lock().unwrap().push(format!("error {client} {message}"));
        }
        fn system(&self, message: &str) {
            self.0.lock().unwrap().push(format!("system {message}"));
        }
    }

    struct NeverSampled;

    impl MemorySampler for NeverSampled {
        fn sample(&self) -> Result<FreeMemSample, ProviderError> {
            panic!("sampler must not run");
        }
    }

    /// Scripted client side: reads come from `input` (or fail with `read_err`).
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        read_err: Option<io::ErrorKind>,
        written: Vec<u8>,
    }

    impl ScriptedStream {
        fn sending(bytes: &[u8]) -> Self {
            Self {
                input: Cursor::new(bytes.to_vec()),
                read_err: None,
                written: Vec::new(),
            }
        }

        fn failing(kind: io::ErrorKind) -> Self {
            Self {
                input: Cursor::new(Vec::new()),
                read_err: Some(kind),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.read_err {
                Some(kind) => Err(io::Error::new(kind, "scripted")),
                None => self.input.read(buf),
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn ctx_with(logs: Arc<Recorded>) -> ProxyCtx {
        ProxyCtx {
            state: Arc::new(ServerState::new(1)),
            upstream: UpstreamClient::new("127.0.0.1", 1).unwrap(),
            sampler: Arc::new(NeverSampled),
            logs,
        }
    }

    #[test]
    fn test_read_failure_drops_connection_without_logging() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::TimedOut,
            io::ErrorKind::BrokenPipe,
        ] {
            let logs = Arc::new(Recorded::default());
            let ctx = ctx_with(logs.clone());
            let mut s = ScriptedStream::failing(kind);
            handle_connection(&ctx, &mut s, "10.0.0.1");
            assert!(s.written.is_empty(), "{kind:?}");
            assert!(logs.0.lock().unwrap().is_empty(), "{kind:?}");
        }
    }

    #[test]
    fn test_malformed_request_line_is_400_and_logged() {
        let logs = Arc::new(Recorded::default());
        let ctx = ctx_with(logs.clone());
        let mut s = ScriptedStream::sending(b"hello\r\n\r\n");
        handle_connection(&ctx, &mut s, "10.0.0.1");
        let out = String::from_utf8_lossy(&s.written).into_owned();
        assert!(out.starts_with("HTTP/1.0 400 Bad Request\r\n"), "{out}");
        let lines = logs.0.lock().unwrap();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].starts_with("error 10.0.0.1 code 400, message Bad request syntax"));
        assert_eq!(lines[1], "access 10.0.0.1 \"-\" 400 -");
    }

    #[test]
    fn test_silent_peer_is_dropped_without_logging() {
        let logs = Arc::new(Recorded::default());
        let ctx = ctx_with(logs.clone());
        let mut s = ScriptedStream::sending(b"");
        handle_connection(&ctx, &mut s, "10.0.0.1");
        assert!(s.written.is_empty());
        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_claim_unnecessary_warning_once_across_threads() {
        let state = Arc::new(ServerState::new(3633));
        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let s = state.clone();
                let b = barrier.clone();
                std::thread::spawn(move || {
                    b.wait();
                    s.claim_unnecessary_warning()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert!(state.has_warned_unnecessary());
        assert!(!state.claim_unnecessary_warning());
    }

    #[test]
    fn test_upstream_detail_names_io_kind() {
        let e = UpstreamError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(upstream_detail(&e), "ConnectionRefused: refused");
        let e = UpstreamError::Status(502, "Bad Gateway".to_string());
        assert_eq!(upstream_detail(&e), "HTTP Error 502: Bad Gateway");
    }
}

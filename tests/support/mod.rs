/*!
Test support helpers shared across integration tests.

- FakeStats: a canned-response HTTP server standing in for distccd --stats
- ScriptedSampler: memory sampler with a fixed answer and a call counter
- start_wrapper(): run the wrapper on an ephemeral port with temp log files
- http_send_raw()/split_response(): minimal raw HTTP client side
*/
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dcc_free_mem::errors::ProviderError;
use dcc_free_mem::{FileLogs, FreeMemSample, LogTargets, MemorySampler, ProxyConfig};

pub const STATS_BODY: &str = "<distccstats>\ndcc_tcp_accept 12\ndcc_rej_bad_req 0\n</distccstats>\n";

/// Serves the same raw response to every connection; counts requests.
pub struct FakeStats {
    pub port: u16,
    pub hits: Arc<AtomicUsize>,
}

impl FakeStats {
    pub fn start(raw_response: Vec<u8>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake stats");
        let port = listener.local_addr().expect("addr").port();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cl = hits.clone();
        let raw = Arc::new(raw_response);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut s = match stream {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                hits_cl.fetch_add(1, Ordering::SeqCst);
                let raw = raw.clone();
                std::thread::spawn(move || {
                    let mut buf = Vec::new();
                    let mut tmp = [0u8; 512];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match s.read(&mut tmp) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => buf.extend_from_slice(&tmp[..n]),
                        }
                    }
                    let _ = s.write_all(&raw);
                });
            }
        });
        FakeStats { port, hits }
    }

    /// `HTTP/1.0 200 OK` with distccd-like headers around `body`.
    pub fn with_body(body: &str) -> Self {
        Self::start(ok_response(body).into_bytes())
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.0 200 OK\r\nServer: distccd\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

/// A port that nothing listens on (bound once, then released).
pub fn closed_port() -> u16 {
    let l = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    l.local_addr().expect("addr").port()
}

pub struct ScriptedSampler {
    answer: Option<u64>,
    calls: AtomicUsize,
}

impl ScriptedSampler {
    pub fn ok(megabytes: u64) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(megabytes),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MemorySampler for ScriptedSampler {
    fn sample(&self) -> Result<FreeMemSample, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Some(megabytes) => Ok(FreeMemSample { megabytes }),
            None => Err(ProviderError::Exec("scripted failure".to_string())),
        }
    }
}

pub struct Wrapper {
    pub addr: SocketAddr,
    pub running: Arc<AtomicBool>,
    pub handle: Option<JoinHandle<()>>,
    pub dir: tempfile::TempDir,
}

impl Wrapper {
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn access_log(&self) -> String {
        read_log(&self.log_path("access.log"))
    }

    pub fn error_log(&self) -> String {
        read_log(&self.log_path("error.log"))
    }

    pub fn system_log(&self) -> String {
        read_log(&self.log_path("syslog"))
    }

    pub fn get(&self, path: &str) -> String {
        http_send_raw(
            self.addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"),
        )
    }
}

impl Drop for Wrapper {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

pub fn start_wrapper(stats_port: u16, sampler: Arc<dyn MemorySampler>) -> Wrapper {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = FileLogs::new(LogTargets {
        access_log: dir.path().join("access.log"),
        error_log: dir.path().join("error.log"),
        system_log: dir.path().join("syslog"),
    });
    let mut cfg = ProxyConfig::new(0, stats_port);
    cfg.listen_host = "127.0.0.1".to_string();
    cfg.stats_host = "127.0.0.1".to_string();
    let (addr, running, handle) =
        dcc_free_mem::start_proxy(&cfg, sampler, Arc::new(logs)).expect("start wrapper");
    Wrapper {
        addr,
        running,
        handle: Some(handle),
        dir,
    }
}

pub fn read_log(p: &Path) -> String {
    std::fs::read_to_string(p).unwrap_or_default()
}

pub fn http_send_raw(addr: SocketAddr, req: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect failed");
    stream.write_all(req.as_bytes()).expect("write");
    let _ = stream.shutdown(Shutdown::Write);
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Split a raw response into (status line, headers in order, body).
pub fn split_response(resp: &str) -> (String, Vec<(String, String)>, String) {
    let (head, body) = resp
        .split_once("\r\n\r\n")
        .unwrap_or_else(|| panic!("no header terminator in:\n{resp}"));
    let mut lines = head.split("\r\n");
    let status = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    (status, headers, body.to_string())
}

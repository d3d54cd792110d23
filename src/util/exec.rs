use std::ffi::OsString;
use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

/// Structured one-shot command execution with captured output.
///
/// There is no timeout: a hung child stalls only the calling worker thread.
#[derive(Debug, Clone, Default)]
pub struct ExecService {
    require_success: bool,
}

impl ExecService {
    pub fn new() -> Self {
        Self {
            require_success: false,
        }
    }

    /// Treat a non-zero exit status as an error.
    pub fn require_success(mut self, yes: bool) -> Self {
        self.require_success = yes;
        self
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.overrides.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let t0 = Instant::now();
        let out = cmd.output().with_context(|| {
            format!(
                "failed to spawn {:?} with args {:?}",
                request.program, request.args
            )
        })?;
        let elapsed = t0.elapsed();

        if self.require_success && !out.status.success() {
            return Err(anyhow!(
                "command {:?} exited with {}: {}",
                request.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }

        Ok(ExecOutput {
            duration: elapsed,
            stdout: decode_stream(out.stdout, "stdout")?,
        })
    }
}

fn decode_stream(bytes: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        .with_context(|| format!("process {what} is not valid UTF-8"))
}

/// Program, argv and extra environment for one run. The parent
/// environment is always inherited; `env` entries override it.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    overrides: Vec<(OsString, OsString)>,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub duration: Duration,
    pub stdout: String,
}

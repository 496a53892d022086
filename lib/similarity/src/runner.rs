//! External script invocation.
//!
//! Scripts are run as `<script> <path> [<path2>]` and their standard output
//! is parsed with [`parse_script_output`]. A non-zero exit, a timeout or
//! unparsable output fails the unit that ran the script.

use dprof_core::config::{self, Options};
use dprof_core::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub const OPT_SCRIPT: &str = "script";
pub const OPT_TIMEOUT: &str = "timeout";

/// The `timeout` option in seconds; absent or 0 means no limit
pub fn parse_timeout(options: &Options) -> Result<Option<Duration>> {
    match config::parse_option::<f64>(options, OPT_TIMEOUT)? {
        None => Ok(None),
        Some(secs) if secs == 0.0 => Ok(None),
        Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => Err(Error::InvalidConfig(format!(
            "timeout must be a non-negative number of seconds, got {}",
            secs
        ))),
    }
}

/// Wire form of a timeout: seconds, 0 for none
pub(crate) fn timeout_secs(timeout: Option<Duration>) -> f64 {
    timeout.map(|t| t.as_secs_f64()).unwrap_or(0.0)
}

pub(crate) fn timeout_from_secs(secs: f64) -> Result<Option<Duration>> {
    if secs == 0.0 {
        Ok(None)
    } else if secs.is_finite() && secs > 0.0 {
        Ok(Some(Duration::from_secs_f64(secs)))
    } else {
        Err(Error::Decode(format!("invalid timeout {}", secs)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRunner {
    script: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptRunner {
    pub fn new<P: AsRef<Path>>(script: P, timeout: Option<Duration>) -> Self {
        Self {
            script: script.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the script over `args` and parse the values it prints
    pub fn run(&self, args: &[&Path]) -> Result<Vec<f64>> {
        let stdout = self.output(args)?;
        parse_script_output(&stdout)
            .map_err(|e| Error::Script(format!("{}: {}", self.script.display(), e)))
    }

    fn spawn(&self, args: &[&Path]) -> Result<Child> {
        debug!("Running {} {:?}", self.script.display(), args);
        Command::new(&self.script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Script(format!("{}: {}", self.script.display(), e)))
    }

    /// Captured standard output of a successful run
    pub fn output(&self, args: &[&Path]) -> Result<String> {
        let mut child = self.spawn(args)?;
        let (status, stdout, stderr) = match self.timeout {
            None => {
                let output = child.wait_with_output()?;
                (
                    output.status,
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                )
            }
            Some(limit) => self.wait_with_deadline(&mut child, limit)?,
        };
        if !status.success() {
            return Err(Error::Script(format!(
                "{} exited with {}: {}",
                self.script.display(),
                status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        limit: Duration,
    ) -> Result<(ExitStatus, String, String)> {
        // Drain the pipes on the side so a chatty script cannot block on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let deadline = Instant::now() + limit;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ScriptTimeout(limit));
            }
            thread::sleep(POLL_INTERVAL);
        };
        let collect = |handle: Option<thread::JoinHandle<String>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };
        Ok((status, collect(stdout), collect(stderr)))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Parse script output into values.
///
/// Blank lines are ignored. A single line holds whitespace separated values.
/// With several lines the first is a header: an integer header declares the
/// number of values that follow and must match, any other header is skipped.
pub fn parse_script_output(output: &str) -> Result<Vec<f64>> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let (header, body) = match lines.as_slice() {
        [] => return Err(Error::Script("empty output".to_string())),
        [single] => (None, std::slice::from_ref(single)),
        [header, rest @ ..] => (Some(*header), rest),
    };
    let values = body
        .iter()
        .flat_map(|l| l.split_whitespace())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| Error::Script(format!("unparsable value {:?}", token)))
        })
        .collect::<Result<Vec<f64>>>()?;
    if let Some(expected) = header.and_then(|h| h.parse::<usize>().ok()) {
        if expected != values.len() {
            return Err(Error::Script(format!(
                "header declares {} values, found {}",
                expected,
                values.len()
            )));
        }
    }
    Ok(values)
}

//! dmidecode command channel
//!
//! Runs `dmidecode -s <keyword>` with a bounded wait. A missing binary is the
//! only condition reported as an error; every other failure (non-zero exit,
//! timeout, garbage output) reads as "no value".

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::normalize_attribute;
use crate::constants::{dmidecode, limits, timing};
use crate::error::{MachIdError, Result};

/// An external hardware inventory command queried by keyword.
///
/// Returns `Err(MachIdError::InventoryToolMissing)` when the command itself is
/// not installed, `Ok("")` when it ran but had nothing useful to say.
#[cfg_attr(test, mockall::automock)]
pub trait InventoryCommand: Send + Sync {
    fn query(&self, keyword: &str) -> Result<String>;
}

/// Output of a bounded command run
#[derive(Debug, Clone)]
struct CommandOutput {
    stdout: String,
    /// `None` when the command was killed at the deadline
    status: Option<ExitStatus>,
}

impl CommandOutput {
    fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }
}

/// Run `program` with `args`, capturing at most
/// [`limits::MAX_COMMAND_OUTPUT`] bytes of stdout, and kill it once `timeout`
/// has elapsed.
///
/// Spawn failures are returned unchanged so callers can tell a missing binary
/// (`io::ErrorKind::NotFound`) from anything else.
fn run_bounded(program: &str, args: &[&str], timeout: Duration) -> io::Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    // The helper thread owns only the pipe; the child handle stays here so it
    // can be killed without coordination.
    let stdout = child.stdout.take();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(out) = stdout {
            let _ = out.take(limits::MAX_COMMAND_OUTPUT).read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() >= deadline => {
                debug!("{} exceeded {:?}, killing", program, timeout);
                kill_and_reap(&mut child);
                break None;
            }
            Ok(None) => thread::sleep(timing::COMMAND_POLL_INTERVAL),
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e);
            }
        }
    };

    // Bounded: a grandchild holding the pipe open must not block us
    let raw = rx.recv_timeout(timing::PROCESS_REAP_TIMEOUT).unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&raw).into_owned(),
        status,
    })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let deadline = Instant::now() + timing::PROCESS_REAP_TIMEOUT;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(None) => thread::sleep(timing::COMMAND_POLL_INTERVAL),
            _ => return,
        }
    }
    debug!("child process {} could not be reaped in time", child.id());
}

/// `dmidecode -s <keyword>`
#[derive(Debug, Clone)]
pub struct Dmidecode {
    program: String,
    timeout: Duration,
}

impl Dmidecode {
    pub fn new() -> Self {
        Self::with_program(dmidecode::PROGRAM)
    }

    /// Use another binary with the same `-s <keyword>` interface
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: timing::COMMAND_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for Dmidecode {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryCommand for Dmidecode {
    fn query(&self, keyword: &str) -> Result<String> {
        match run_bounded(&self.program, &["-s", keyword], self.timeout) {
            Ok(output) if output.success() => Ok(normalize_attribute(&output.stdout)),
            Ok(output) => {
                debug!(keyword, status = ?output.status, "{} returned no value", self.program);
                Ok(String::new())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(MachIdError::InventoryToolMissing),
            Err(e) => {
                debug!(keyword, "failed to run {}: {}", self.program, e);
                Ok(String::new())
            }
        }
    }
}

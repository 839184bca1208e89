// SPDX-License-Identifier: GPL-3.0-only

//! External process execution
//!
//! Every fact the engine knows about disks comes from running a tool and
//! reading its output. [`CommandRunner`] is the narrow seam for that: argv in,
//! merged stdout and stderr out, non-zero exits surfaced as
//! [`SysError::Execution`] with the output attached.
//!
//! - In production this is a [`HostRunner`].
//! - Under test a [`FakeRunner`] answers with canned output and records argv.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SysError};

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments and wait for it to exit.
    async fn run(&self, argv: &[String]) -> Result<String>;
}

/// Shared runner handle
pub type BoxedRunner = Arc<dyn CommandRunner>;

pub fn render(argv: &[String]) -> String {
    argv.join(" ")
}

/// Build the error for a process that exited unsuccessfully
pub fn execution_error(argv: &[String], status: impl Into<String>, output: impl Into<String>) -> SysError {
    SysError::Execution {
        command: render(argv),
        status: status.into(),
        output: output.into(),
    }
}

/// Runs commands on the host
#[derive(Debug, Clone, Default)]
pub struct HostRunner {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl HostRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Kill any running child and fail pending calls once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, argv: &[String]) -> Result<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SysError::Config("empty command line".to_string()))?;
        let binary = which::which(program).map_err(|_| SysError::ToolNotFound(program.clone()))?;
        let command = render(argv);

        if self.cancel.is_cancelled() {
            return Err(SysError::Cancelled { command });
        }

        debug!(command = %command, "running command");
        let child = Command::new(binary)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = self.cancel.cancelled() => {
                warn!(command = %command, "command cancelled");
                return Err(SysError::Cancelled { command });
            }
            _ = expire(self.timeout) => {
                warn!(command = %command, "command timed out");
                return Err(SysError::Timeout {
                    command,
                    seconds: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|c| format!("status {c}"))
                .unwrap_or_else(|| "signal".to_string());
            debug!(command = %command, %status, output = %combined, "command failed");
            return Err(execution_error(argv, status, combined));
        }

        debug!(command = %command, bytes = combined.len(), "command finished");
        Ok(combined)
    }
}

/// Handler answering a fake command
pub type FakeHandler = Box<dyn Fn(&[String]) -> Result<String> + Send + Sync>;

/// A runner that answers from a handler function and records every call
pub struct FakeRunner {
    handler: Mutex<FakeHandler>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new(handler: impl Fn(&[String]) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Mutex::new(Box::new(handler)),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Replace the handler.
    pub fn set_handler(&self, handler: impl Fn(&[String]) -> Result<String> + Send + Sync + 'static) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Box::new(handler);
    }

    /// Every argv seen so far, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every command line seen so far, joined with spaces
    pub fn rendered_calls(&self) -> Vec<String> {
        self.calls().iter().map(|argv| render(argv)).collect()
    }

    /// Number of recorded command lines containing `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.rendered_calls()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    pub fn as_runner(self: Arc<Self>) -> BoxedRunner {
        self
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, argv: &[String]) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(argv.to_vec());
        let handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        handler(argv)
    }
}

//! Stdin/stdout pipe transport for the `dprint editor-service` process.
//!
//! Owns the child process and is the only reader/writer of its pipes.
//! Frames go out on the child's stdin and come back on its stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::{debug, warn};

use super::{recv_frame, send_frame, Transport};
use crate::error::{Result, ServiceError};

/// Transport that talks to the editor service via stdin/stdout pipes.
///
/// The service is spawned once and kept alive for the editor session.
/// Reads and writes are bounded by `io_timeout`; expiry is reported as
/// `ServiceUnavailable`.
pub struct StdioPipeTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    io_timeout: Duration,
    alive: bool,
}

impl StdioPipeTransport {
    /// Spawn `<executable> editor-service --parent-pid <pid>`.
    ///
    /// The parent pid lets the service exit on its own if this process
    /// disappears without a shutdown request.
    pub fn spawn(executable: &str, io_timeout: Duration) -> Result<Self> {
        let parent_pid = std::process::id().to_string();
        debug!(exec = %executable, parent_pid = %parent_pid, "Spawning editor service");

        let mut child = tokio::process::Command::new(executable)
            .args(["editor-service", "--parent-pid", &parent_pid])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServiceError::Spawn {
                executable: executable.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ServiceError::ServiceUnavailable("failed to take service stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::ServiceUnavailable("failed to take service stdout".into()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            io_timeout,
            alive: true,
        })
    }

    /// Process id of the service, if it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Transport for StdioPipeTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.alive {
            return Err(ServiceError::ServiceStopped);
        }
        tokio::time::timeout(self.io_timeout, send_frame(&mut self.stdin, frame))
            .await
            .map_err(|_| {
                ServiceError::ServiceUnavailable(format!(
                    "write did not complete within {:?}",
                    self.io_timeout
                ))
            })?
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        if !self.alive {
            return Err(ServiceError::ServiceStopped);
        }
        tokio::time::timeout(self.io_timeout, recv_frame(&mut self.stdout))
            .await
            .map_err(|_| {
                ServiceError::ServiceUnavailable(format!(
                    "no reply within {:?}",
                    self.io_timeout
                ))
            })?
    }

    async fn close(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        // Hard stop; any shutdown exchange has already happened in the engine
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Editor service already exited");
        }
        match self.child.wait().await {
            Ok(status) => debug!(%status, "Editor service exited"),
            Err(e) => warn!(error = %e, "Failed to reap editor service"),
        }
    }

    fn is_alive(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "Editor service has exited");
                self.alive = false;
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to poll editor service");
                self.alive = false;
                false
            }
        }
    }
}

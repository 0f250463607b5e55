//! Fallback transport: an external resumable-download command.
//!
//! The command is invoked as
//! `<program> -c -q -T <secs> -O <dest> <url>`, the `wget` argument
//! convention. `-c` continues whatever partial file the primary transport
//! left behind. The exit code is the only success signal.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::constants::{DEFAULT_FALLBACK_PROGRAM, DEFAULT_FALLBACK_TIMEOUT_SECS};
use super::error::{DownloadError, FallbackError};
use super::transport::Transport;

/// Runs a resumable-download utility as a child process.
#[derive(Debug, Clone)]
pub struct CommandTransport {
    program: String,
    timeout: Duration,
}

impl Default for CommandTransport {
    fn default() -> Self {
        Self::new(
            DEFAULT_FALLBACK_PROGRAM,
            Duration::from_secs(DEFAULT_FALLBACK_TIMEOUT_SECS),
        )
    }
}

impl CommandTransport {
    /// Creates a fallback that runs `program` with a ceiling of `timeout`.
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Returns the configured program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the ceiling applied to one invocation.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, url: &str, dest: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-c")
            .arg("-q")
            .arg("-T")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg("-O")
            .arg(dest)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, url: &str, dest: &Path) -> Result<(), FallbackError> {
        let mut child = self
            .command(url, dest)
            .spawn()
            .map_err(|source| FallbackError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the child on timeout kills it (kill_on_drop).
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(FallbackError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(FallbackError::Timeout {
                    program: self.program.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(FallbackError::ExitStatus {
                program: self.program.clone(),
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl Transport for CommandTransport {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip(self), fields(program = %self.program, url = %url))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.run(url, dest).await?;
        debug!("fallback fetch complete");
        Ok(())
    }
}

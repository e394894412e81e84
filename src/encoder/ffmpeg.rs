//! FFmpeg-backed encoder.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::command::FfmpegCommand;
use super::{EncodeOutcome, EncodeProfile, Encoder};
use crate::storage::partial_path;

/// Lines of encoder stderr kept for diagnostics
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder binary '{0}' not found")]
    NotFound(String),

    #[error("failed to launch encoder: {0}")]
    Spawn(#[source] io::Error),

    #[error("encoder failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("encoder produced no output")]
    EmptyOutput,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Runs an `ffmpeg` executable once per job.
///
/// Output is written next to the target as `<output>.partial` and renamed
/// into place only after a clean exit with a non-empty file.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
    timeout: Option<Duration>,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Kill the encoder if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the configured binary through PATH
    pub fn locate(&self) -> Result<PathBuf, EncodeError> {
        which::which(&self.binary).map_err(|_| EncodeError::NotFound(self.binary.clone()))
    }

    async fn try_encode(&self, input: &Path, output: &Path, profile: &EncodeProfile) -> Result<(), EncodeError> {
        let partial = partial_path(output);
        let args = FfmpegCommand::for_profile(input, &partial, profile).build_args();
        debug!("Running encoder: {} {}", self.binary, args.join(" "));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => EncodeError::NotFound(self.binary.clone()),
                _ => EncodeError::Spawn(e),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let finished = child.wait_with_output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, finished)
                .await
                .map_err(|_| EncodeError::Timeout(limit))??,
            None => finished.await?,
        };

        if !result.status.success() {
            return Err(EncodeError::Failed {
                status: result.status,
                stderr: stderr_tail(&result.stderr),
            });
        }

        let written = match tokio::fs::metadata(&partial).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if written == 0 {
            return Err(EncodeError::EmptyOutput);
        }

        tokio::fs::rename(&partial, output).await?;
        Ok(())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, input: &Path, output: &Path, profile: &EncodeProfile) -> EncodeOutcome {
        let started = Instant::now();

        match self.try_encode(input, output, profile).await {
            Ok(()) => {
                info!(
                    "Encoded {} -> {} ({}) in {:.1?}",
                    input.display(),
                    output.display(),
                    profile.name,
                    started.elapsed()
                );
                EncodeOutcome::Success
            }
            Err(e) => {
                let partial = partial_path(output);
                if let Err(remove_err) = tokio::fs::remove_file(&partial).await {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        warn!("Failed to remove partial output {}: {}", partial.display(), remove_err);
                    }
                }
                EncodeOutcome::Failure {
                    diagnostics: e.to_string(),
                }
            }
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

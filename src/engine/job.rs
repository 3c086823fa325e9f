//! One conversion subprocess per request.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::marker::OutputScanner;
use super::{forward_lines, output_lines, EngineCommand, OutputStream};

/// How long output is still read after the subprocess exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Result of one [`ConversionJobRunner::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success {
        converted_path: PathBuf,
        /// Without the dot.
        converted_extension: String,
    },
    Failure {
        reason: FailureReason,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }
}

/// Why a conversion produced no document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The subprocess could not be spawned.
    #[error("process can't be started: {0}")]
    SpawnFailed(String),

    /// The subprocess exited unsuccessfully or never announced its output.
    #[error("no converted document produced (exit code {exit_code:?})")]
    NoOutput { exit_code: Option<i32> },

    /// The subprocess outlived the job timeout and was killed.
    #[error("conversion timed out after {0:?}")]
    TimedOut(Duration),
}

/// Spawns the engine in job mode and watches its output for the marker.
#[derive(Debug, Clone)]
pub struct ConversionJobRunner {
    command: EngineCommand,
    timeout: Option<Duration>,
}

impl ConversionJobRunner {
    /// `timeout = None` lets a job run forever.
    pub fn new(command: EngineCommand, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }

    pub fn command(&self) -> &EngineCommand {
        &self.command
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Convert `source` into `format`.
    ///
    /// Success requires both a zero exit status and a captured marker.
    pub async fn run(&self, source: &Path, format: &str) -> ConversionOutcome {
        debug!(
            program = %self.command.program,
            args = ?self.command.job_args(format, source),
            "Spawning conversion subprocess"
        );

        let mut child = match self.command.job(format, source).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.command.program, "Conversion process can't be started: {}", e);
                return ConversionOutcome::Failure {
                    reason: FailureReason::SpawnFailed(e.to_string()),
                };
            }
        };
        let pid = child.id();

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, "conversion", OutputStream::Stderr));
        }
        let stdout = child.stdout.take();

        let watch = async {
            let mut scanner = OutputScanner::new();
            let mut lines = stdout.map(|stdout| Box::pin(output_lines(stdout)));

            // The exit status decides the outcome; stdout may stay open after
            // exit when the engine left a process behind that inherited it.
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    line = next_line(&mut lines) => {
                        scan_line(&mut scanner, line);
                    }
                }
            };

            if let Some(rest) = lines.as_mut() {
                let drain = async {
                    while let Some(line) = rest.next().await {
                        if !scan_line(&mut scanner, Some(line)) {
                            break;
                        }
                    }
                };
                if tokio::time::timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
                    debug!(?pid, "Conversion output still open after exit, no longer reading it");
                }
            }
            (scanner.finish(), status)
        };

        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, watch).await.ok(),
            None => Some(watch.await),
        };

        let Some((converted, status)) = finished else {
            // Only reachable with a timeout set.
            let limit = self.timeout.unwrap_or_default();
            warn!(?pid, ?limit, "Conversion timed out, killing subprocess");
            if let Err(e) = child.kill().await {
                warn!(?pid, "Failed to kill conversion subprocess: {}", e);
            }
            return ConversionOutcome::Failure {
                reason: FailureReason::TimedOut(limit),
            };
        };

        let exit_code = exit_code_of(&status);
        let succeeded = matches!(&status, Ok(s) if s.success());

        match converted {
            Some(file) if succeeded => {
                info!(?pid, path = %file.path.display(), "Conversion complete");
                ConversionOutcome::Success {
                    converted_path: file.path,
                    converted_extension: file.extension,
                }
            }
            converted => {
                if let Err(e) = &status {
                    warn!(?pid, "Failed to wait for conversion subprocess: {}", e);
                }
                warn!(
                    ?pid,
                    ?exit_code,
                    marker = converted.is_some(),
                    "Conversion process didn't create a converted document"
                );
                ConversionOutcome::Failure {
                    reason: FailureReason::NoOutput { exit_code },
                }
            }
        }
    }
}

/// Next line of `lines`, pending forever once the stream ended or failed.
async fn next_line<S>(lines: &mut Option<S>) -> Option<std::io::Result<String>>
where
    S: Stream<Item = std::io::Result<String>> + Unpin,
{
    let Some(stream) = lines.as_mut() else {
        return std::future::pending().await;
    };
    let line = stream.next().await;
    if !matches!(line, Some(Ok(_))) {
        *lines = None;
    }
    line
}

/// Feed one stdout line to the scanner. `false` once the stream ended or
/// failed.
fn scan_line(scanner: &mut OutputScanner, line: Option<std::io::Result<String>>) -> bool {
    match line {
        Some(Ok(line)) => {
            debug!(target: "docconv_bridge::engine", source = "conversion", "{}", line.trim_end());
            if scanner.feed_line(&line) {
                debug!(path = ?scanner.found().map(|f| &f.path), "Output marker captured");
            }
            true
        }
        Some(Err(e)) => {
            warn!("Failed to read conversion output: {}", e);
            false
        }
        None => false,
    }
}

fn exit_code_of(status: &std::io::Result<ExitStatus>) -> Option<i32> {
    status.as_ref().ok().and_then(ExitStatus::code)
}

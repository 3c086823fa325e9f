//! The external conversion engine.
//!
//! Two kinds of engine processes exist:
//!
//! - one long-running **listener** (`<engine> -l`), owned by
//!   [`supervisor::ListenerSupervisor`] for the lifetime of the service;
//! - one short-lived **conversion subprocess** per request
//!   (`<engine> -n -v -f<format> <source>`), driven by
//!   [`job::ConversionJobRunner`].
//!
//! Their stdout/stderr only ever reach the log.

pub mod job;
pub mod marker;
pub mod probe;
pub mod supervisor;

use std::io;
use std::path::Path;
use std::process::Stdio;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// Engine executable used when none is configured.
pub const DEFAULT_ENGINE: &str = "unoconv";

/// How to invoke the conversion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments placed before the mode-specific flags.
    pub base_args: Vec<String>,
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE)
    }
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `<engine> <base_args...> -l`
    pub fn listener(&self) -> Command {
        self.command(["-l".to_string()])
    }

    /// `<engine> <base_args...> -n -v -f<format> <source>`
    pub fn job(&self, format: &str, source: &Path) -> Command {
        self.command(job_mode_args(format, source))
    }

    /// Arguments of a job invocation, for logging.
    pub fn job_args(&self, format: &str, source: &Path) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(job_mode_args(format, source));
        args
    }

    fn command<const N: usize>(&self, mode_args: [String; N]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(mode_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn job_mode_args(format: &str, source: &Path) -> [String; 4] {
    [
        "-n".to_string(),
        "-v".to_string(),
        format!("-f{format}"),
        source.display().to_string(),
    ]
}

// ── Output forwarding ────────────────────────────────────────────────────────

/// Which stream of a child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStream {
    Stdout,
    Stderr,
}

/// Lines of a child's output, decoded lossily (engines do not promise
/// UTF-8), without the trailing `\n`.
pub(crate) fn output_lines<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                Some((Ok(String::from_utf8_lossy(&buf).into_owned()), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Log every line of `reader` until EOF.
pub(crate) async fn forward_lines<R>(reader: R, source: &'static str, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = Box::pin(output_lines(reader));
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                match stream {
                    OutputStream::Stdout => info!(target: "docconv_bridge::engine", source, "{}", line),
                    OutputStream::Stderr => warn!(target: "docconv_bridge::engine", source, "{}", line),
                }
            }
            Err(e) => {
                warn!(source, "Failed to read engine output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_arguments_follow_engine_convention() {
        let cmd = EngineCommand::new("unoconv").with_args(["--port", "2002"]);
        assert_eq!(
            cmd.job_args("pdf", Path::new("/tmp/a.docx")),
            vec!["--port", "2002", "-n", "-v", "-fpdf", "/tmp/a.docx"]
        );
    }

    #[test]
    fn default_engine_is_unoconv() {
        let cmd = EngineCommand::default();
        assert_eq!(cmd.program, "unoconv");
        assert!(cmd.base_args.is_empty());
    }

    #[tokio::test]
    async fn output_lines_handles_missing_final_newline_and_bad_utf8() {
        let input: &[u8] = b"first\r\nsecond\n\xffthird";
        let lines: Vec<String> = output_lines(input)
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["first\r", "second", "\u{fffd}third"]);
    }

    #[tokio::test]
    async fn output_lines_of_empty_reader_is_empty() {
        let input: &[u8] = b"";
        let lines: Vec<io::Result<String>> = output_lines(input).collect().await;
        assert!(lines.is_empty());
    }
}

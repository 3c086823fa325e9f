//! Listener liveness probes.
//!
//! A probe answers one question: is a conversion listener available right
//! now? `Ok(false)` means "not running"; `Err` means the question itself could
//! not be answered, which the supervisor treats as fatal.

use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{ProcessesToUpdate, System};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::BridgeError;

/// Where the engine's listener accepts connections by default.
pub const DEFAULT_LISTENER_ADDR: &str = "127.0.0.1:2002";

/// Office binary the listener runs as.
pub const DEFAULT_LISTENER_BINARY: &str = "/usr/lib/libreoffice/program/soffice.bin";

/// Default connect timeout of [`SocketProbe`].
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[async_trait]
pub trait ListenerProbe: Send + Sync + fmt::Debug {
    async fn is_running(&self) -> Result<bool, BridgeError>;

    /// Short human description for logs.
    fn describe(&self) -> String;
}

// ── Socket handshake ─────────────────────────────────────────────────────────

/// Readiness handshake: the listener is alive if its socket accepts a
/// connection.
#[derive(Debug, Clone)]
pub struct SocketProbe {
    addr: SocketAddr,
    timeout: Duration,
}

impl SocketProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ListenerProbe for SocketProbe {
    async fn is_running(&self) -> Result<bool, BridgeError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.addr)).await {
            Err(_) => {
                debug!(addr = %self.addr, "Listener probe timed out");
                Ok(false)
            }
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => match e.kind() {
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut => Ok(false),
                _ => Err(BridgeError::ProbeFailed(format!(
                    "connect to {} failed: {}",
                    self.addr, e
                ))),
            },
        }
    }

    fn describe(&self) -> String {
        format!("socket {}", self.addr)
    }
}

// ── Process table ────────────────────────────────────────────────────────────

/// Scans the process table for the listener's binary.
#[derive(Debug, Clone)]
pub struct ProcessTableProbe {
    binary: PathBuf,
}

impl ProcessTableProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ProcessTableProbe {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_BINARY)
    }
}

#[async_trait]
impl ListenerProbe for ProcessTableProbe {
    async fn is_running(&self) -> Result<bool, BridgeError> {
        let binary = self.binary.clone();
        tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            let refreshed = system.refresh_processes(ProcessesToUpdate::All, true);
            if refreshed == 0 {
                return Err(BridgeError::ProbeFailed(
                    "process table is empty or unreadable".into(),
                ));
            }
            Ok(system.processes().values().any(|p| {
                matches_binary(
                    &binary,
                    p.exe(),
                    p.cmd().first().map(|a| Path::new(a)),
                    Path::new(p.name()),
                )
            }))
        })
        .await
        .map_err(|e| BridgeError::ProbeFailed(format!("process table scan panicked: {e}")))?
    }

    fn describe(&self) -> String {
        format!("process {}", self.binary.display())
    }
}

/// A process matches if its executable path or first argument is the binary,
/// or its name equals the binary's file name.
fn matches_binary(binary: &Path, exe: Option<&Path>, argv0: Option<&Path>, name: &Path) -> bool {
    if exe == Some(binary) || argv0 == Some(binary) {
        return true;
    }
    binary.file_name().is_some_and(|f| Path::new(f) == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn socket_probe_sees_open_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let probe = SocketProbe::new(listener.local_addr().unwrap());
        assert!(probe.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn socket_probe_reports_closed_port_as_not_running() {
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let probe = SocketProbe::new(addr).with_timeout(Duration::from_millis(500));
        assert!(!probe.is_running().await.unwrap());
        assert_eq!(probe.describe(), format!("socket {addr}"));
    }

    #[test]
    fn binary_matching() {
        let bin = Path::new("/usr/lib/libreoffice/program/soffice.bin");
        assert!(matches_binary(bin, Some(bin), None, Path::new("x")));
        assert!(matches_binary(bin, None, Some(bin), Path::new("x")));
        assert!(matches_binary(bin, None, None, Path::new("soffice.bin")));
        assert!(!matches_binary(bin, Some(Path::new("/usr/bin/soffice")), None, Path::new("soffice")));
    }

    #[tokio::test]
    async fn process_probe_does_not_find_made_up_binary() {
        let probe = ProcessTableProbe::new("/nonexistent/docconv-listener-test.bin");
        assert!(!probe.is_running().await.unwrap());
    }
}

//! Service configuration.
//!
//! Everything the bridge needs besides object-store credentials lives in
//! [`BridgeConfig`], built via [`BridgeConfigBuilder`]. Object-store settings
//! are a separate concern owned by [`docconv_store::StoreConfig`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::job::ConversionJobRunner;
use crate::engine::probe::{
    ListenerProbe, ProcessTableProbe, SocketProbe, DEFAULT_LISTENER_BINARY, DEFAULT_PROBE_TIMEOUT,
};
use crate::engine::supervisor::{ListenerSupervisor, RestartPolicy};
use crate::engine::EngineCommand;
use crate::error::BridgeError;
use crate::tempfiles::TempFileManager;

/// HTTP port used when none is configured.
pub const DEFAULT_PORT: u16 = 9080;

/// Per-job timeout used when none is configured.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for the bridge service.
///
/// # Example
/// ```rust
/// use docconv_bridge::BridgeConfig;
///
/// let config = BridgeConfig::builder()
///     .port(8080)
///     .engine_program("unoconv")
///     .job_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.bind_addr.port(), 8080);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// HTTP listen address. Default: `0.0.0.0:9080`.
    pub bind_addr: SocketAddr,

    /// Conversion engine invocation. Default: `unoconv` with no extra args.
    pub engine: EngineCommand,

    /// Upper bound for one conversion subprocess. Default: 300 s.
    /// `None` lets a hung engine hold its request forever.
    pub job_timeout: Option<Duration>,

    /// Directory for scoped temp files. Default: the system temp dir.
    pub temp_dir: PathBuf,

    /// How listener liveness is determined. Default: socket handshake.
    pub probe: ProbeKind,

    /// Listener restart behaviour.
    pub restart: RestartPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            engine: EngineCommand::default(),
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            temp_dir: std::env::temp_dir(),
            probe: ProbeKind::default(),
            restart: RestartPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn temp_files(&self) -> TempFileManager {
        TempFileManager::new(&self.temp_dir)
    }

    pub fn job_runner(&self) -> ConversionJobRunner {
        ConversionJobRunner::new(self.engine.clone(), self.job_timeout)
    }

    pub fn supervisor(&self) -> ListenerSupervisor {
        ListenerSupervisor::new(self.engine.clone(), self.probe.build(), self.restart.clone())
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.bind_addr.set_ip(host);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.bind_addr.set_port(port);
        self
    }

    pub fn engine(mut self, engine: EngineCommand) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn engine_program(mut self, program: impl Into<String>) -> Self {
        self.config.engine.program = program.into();
        self
    }

    pub fn engine_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.engine.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    /// `0` disables the timeout.
    pub fn job_timeout_secs(self, secs: u64) -> Self {
        let timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self.job_timeout(timeout)
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn probe(mut self, probe: ProbeKind) -> Self {
        self.config.probe = probe;
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.restart = policy;
        self
    }

    pub fn restart_backoff_ms(mut self, ms: u64) -> Self {
        self.config.restart.initial_backoff = Duration::from_millis(ms);
        self
    }

    pub fn restart_max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.restart.max_backoff = Duration::from_millis(ms);
        self
    }

    pub fn max_restarts(mut self, max: Option<u32>) -> Self {
        self.config.restart.max_restarts = max;
        self
    }

    pub fn alert_after(mut self, n: u32) -> Self {
        self.config.restart.alert_after = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BridgeConfig, BridgeError> {
        let c = &self.config;
        if c.engine.program.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "Engine program must not be empty".into(),
            ));
        }
        if c.restart.initial_backoff.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "Restart backoff must be > 0 ms".into(),
            ));
        }
        if c.restart.max_backoff < c.restart.initial_backoff {
            return Err(BridgeError::InvalidConfig(format!(
                "Maximum restart backoff ({:?}) is below the initial backoff ({:?})",
                c.restart.max_backoff, c.restart.initial_backoff
            )));
        }
        if c.restart.alert_after == 0 {
            return Err(BridgeError::InvalidConfig(
                "Restart alert threshold must be ≥ 1".into(),
            ));
        }
        if !c.temp_dir.is_dir() {
            return Err(BridgeError::InvalidConfig(format!(
                "Temp directory {} does not exist",
                c.temp_dir.display()
            )));
        }
        Ok(self.config)
    }
}

// ── Probe selection ──────────────────────────────────────────────────────────

/// Which liveness check the supervisor uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// Connect to the listener's socket (default).
    Socket { addr: SocketAddr, timeout: Duration },
    /// Look for the listener binary in the process table.
    ProcessTable { binary: PathBuf },
}

impl Default for ProbeKind {
    fn default() -> Self {
        ProbeKind::Socket {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2002),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ProbeKind {
    /// `"socket"` or `"process"`.
    pub fn from_name(name: &str, addr: SocketAddr, binary: Option<PathBuf>) -> Result<Self, BridgeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "socket" => Ok(ProbeKind::Socket {
                addr,
                timeout: DEFAULT_PROBE_TIMEOUT,
            }),
            "process" => Ok(ProbeKind::ProcessTable {
                binary: binary.unwrap_or_else(|| PathBuf::from(DEFAULT_LISTENER_BINARY)),
            }),
            other => Err(BridgeError::InvalidConfig(format!(
                "Unknown listener probe '{other}' (expected 'socket' or 'process')"
            ))),
        }
    }

    pub fn build(&self) -> Arc<dyn ListenerProbe> {
        match self {
            ProbeKind::Socket { addr, timeout } => {
                Arc::new(SocketProbe::new(*addr).with_timeout(*timeout))
            }
            ProbeKind::ProcessTable { binary } => Arc::new(ProcessTableProbe::new(binary.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = BridgeConfig::default();
        assert_eq!(c.bind_addr.port(), 9080);
        assert_eq!(c.engine.program, "unoconv");
        assert_eq!(c.job_timeout, Some(Duration::from_secs(300)));
        assert_eq!(c.restart.initial_backoff, Duration::from_millis(500));
        assert!(matches!(c.probe, ProbeKind::Socket { addr, .. } if addr.port() == 2002));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let c = BridgeConfig::builder().job_timeout_secs(0).build().unwrap();
        assert_eq!(c.job_timeout, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(BridgeConfig::builder().engine_program(" ").build().is_err());
        assert!(BridgeConfig::builder().restart_backoff_ms(0).build().is_err());
        assert!(BridgeConfig::builder()
            .restart_backoff_ms(1000)
            .restart_max_backoff_ms(10)
            .build()
            .is_err());
        assert!(BridgeConfig::builder().alert_after(0).build().is_err());
        assert!(BridgeConfig::builder()
            .temp_dir("/nonexistent/docconv-temp")
            .build()
            .is_err());
    }

    #[test]
    fn probe_names() {
        let addr: SocketAddr = "127.0.0.1:2002".parse().unwrap();
        assert!(matches!(
            ProbeKind::from_name("Socket", addr, None).unwrap(),
            ProbeKind::Socket { .. }
        ));
        assert_eq!(
            ProbeKind::from_name("process", addr, None).unwrap(),
            ProbeKind::ProcessTable {
                binary: PathBuf::from(DEFAULT_LISTENER_BINARY)
            }
        );
        assert!(ProbeKind::from_name("ps", addr, None).is_err());
    }

    #[test]
    fn builder_wires_engine_into_runner() {
        let c = BridgeConfig::builder()
            .engine_program("/opt/unoconv")
            .engine_args(["--port", "2003"])
            .job_timeout_secs(5)
            .build()
            .unwrap();
        let runner = c.job_runner();
        assert_eq!(runner.command().program, "/opt/unoconv");
        assert_eq!(runner.command().base_args, vec!["--port", "2003"]);
        assert_eq!(runner.timeout(), Some(Duration::from_secs(5)));
    }
}

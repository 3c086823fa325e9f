//! Supervision of the long-running conversion listener.
//!
//! The supervisor owns the only handle to the listener it spawns; nothing
//! else may signal that process. Its lifecycle:
//!
//! ```text
//!            probe says running
//!  Probing ───────────────────────► External   (supervision ends, Ok)
//!     │
//!     │ spawn
//!     ▼
//!  Running{pid} ── exit ──► Restarting{attempt} ── backoff ──► Probing
//!                                 │
//!                                 │ max_restarts exceeded
//!                                 ▼
//!                              Stopped      (ListenerGaveUp)
//! ```
//!
//! Spawn failures and probe failures are fatal: without a listener no
//! conversion can succeed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::probe::ListenerProbe;
use super::{forward_lines, EngineCommand, OutputStream};
use crate::error::BridgeError;

/// Name used in logs and errors.
pub const LISTENER_NAME: &str = "Document Converter Service";

/// Observable state of the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerStatus {
    /// Checking whether a listener already runs.
    Probing,
    /// A listener was already running; it is not ours to manage.
    External,
    /// We spawned the listener and it is running.
    Running { pid: Option<u32> },
    /// Our listener exited; waiting before the next start.
    Restarting { attempt: u32 },
    /// Supervision ended.
    Stopped,
}

impl ListenerStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, ListenerStatus::External | ListenerStatus::Running { .. })
    }
}

/// Exponential backoff with an optional restart budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before the first restart. Default: 500 ms.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay. Default: 30 s.
    pub max_backoff: Duration,
    /// A listener that stayed up this long resets the failure streak. Default: 30 s.
    pub stable_after: Duration,
    /// From this many consecutive restarts on, each restart logs at `error`. Default: 5.
    pub alert_after: u32,
    /// Consecutive restarts allowed before giving up. `None` = never give up.
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            stable_after: Duration::from_secs(30),
            alert_after: 5,
            max_restarts: None,
        }
    }
}

impl RestartPolicy {
    /// Delay before restart number `streak` (1-based) of the current streak.
    pub fn backoff(&self, streak: u32) -> Duration {
        let exp = streak.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Streak after an exit following `uptime` of running.
    pub fn next_streak(&self, streak: u32, uptime: Duration) -> u32 {
        if uptime >= self.stable_after {
            1
        } else {
            streak.saturating_add(1)
        }
    }
}

/// Keeps one conversion listener alive.
#[derive(Debug)]
pub struct ListenerSupervisor {
    name: String,
    command: EngineCommand,
    probe: Arc<dyn ListenerProbe>,
    policy: RestartPolicy,
    status: watch::Sender<ListenerStatus>,
}

impl ListenerSupervisor {
    pub fn new(command: EngineCommand, probe: Arc<dyn ListenerProbe>, policy: RestartPolicy) -> Self {
        let (status, _) = watch::channel(ListenerStatus::Probing);
        Self {
            name: LISTENER_NAME.to_string(),
            command,
            probe,
            policy,
            status,
        }
    }

    /// Subscribe to status changes.
    pub fn status(&self) -> watch::Receiver<ListenerStatus> {
        self.status.subscribe()
    }

    pub fn is_alive(&self) -> bool {
        self.status.borrow().is_alive()
    }

    /// Start the listener unless one is already running.
    ///
    /// Returns the spawned child, or `None` if the probe found a running
    /// listener (in which case nothing is spawned).
    pub async fn start(&self) -> Result<Option<Child>, BridgeError> {
        self.publish(ListenerStatus::Probing);
        if self.probe.is_running().await? {
            info!(
                probe = %self.probe.describe(),
                "{} already running, not spawning another", self.name
            );
            self.publish(ListenerStatus::External);
            return Ok(None);
        }

        let mut child = self
            .command
            .listener()
            .spawn()
            .map_err(|source| BridgeError::ListenerSpawnFailed {
                name: self.name.clone(),
                program: self.command.program.clone(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "listener", OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, "listener", OutputStream::Stderr));
        }

        let pid = child.id();
        info!(?pid, program = %self.command.program, "{} started", self.name);
        self.publish(ListenerStatus::Running { pid });
        Ok(Some(child))
    }

    /// Supervise until the listener is found external (Ok) or a fatal error
    /// occurs.
    ///
    /// Dropping the returned future kills a listener we spawned.
    pub async fn run(self) -> Result<(), BridgeError> {
        let mut streak = 0u32;
        loop {
            let Some(mut child) = self.start().await? else {
                return Ok(());
            };

            let started = Instant::now();
            let exit = child.wait().await;
            let uptime = started.elapsed();
            match &exit {
                Ok(status) => warn!(code = ?status.code(), ?uptime, "{} exited", self.name),
                Err(e) => error!(?uptime, "Lost track of {}: {}", self.name, e),
            }

            streak = self.policy.next_streak(streak, uptime);
            if let Some(max) = self.policy.max_restarts {
                if streak > max {
                    error!(attempts = streak, "{} keeps exiting, giving up", self.name);
                    self.publish(ListenerStatus::Stopped);
                    return Err(BridgeError::ListenerGaveUp {
                        name: self.name.clone(),
                        attempts: streak,
                    });
                }
            }

            let delay = self.policy.backoff(streak);
            if streak >= self.policy.alert_after {
                error!(attempt = streak, ?delay, "Restarting {} again", self.name);
            } else {
                info!(attempt = streak, ?delay, "Restarting {}", self.name);
            }
            self.publish(ListenerStatus::Restarting { attempt: streak });
            tokio::time::sleep(delay).await;
        }
    }

    fn publish(&self, status: ListenerStatus) {
        self.status.send_replace(status);
    }
}

//! Dual-protocol server lifecycle.
//!
//! [`ServerLifecycleManager`] exclusively owns every protocol listener. It
//! starts them together, waits for a termination signal (or for one of them
//! to die), then drains all of them at once under a per-protocol grace window
//! and an absolute outer bound:
//!
//! ```text
//!   start ──► all LISTENING ──► signal | failure ──► all DRAINING ──► STOPPED
//!     │                                                   │
//!     └─ bind error: stop started servers, fail           └─ grace elapsed: abort (forced)
//! ```
//!
//! Every server's cancellation token is a child of one root token, so a
//! single cancel reaches all of them.

mod server;
mod state;

pub(crate) use server::accept_with_backoff;
pub use server::{ManagedServer, ProtocolServer, ServerFailure, StopOutcome};
pub use state::ServerState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::{Result, ServerConfig};

/// Final outcome of one protocol server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolOutcome {
    pub protocol: String,
    pub outcome: StopOutcome,
}

/// What happened during shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub outcomes: Vec<ProtocolOutcome>,
    /// The whole sequence was cut off by the outer bound.
    pub outer_bound_hit: bool,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn outcome(&self, protocol: &str) -> Option<StopOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.protocol == protocol)
            .map(|o| o.outcome)
    }

    /// Every server drained in time.
    pub fn is_clean(&self) -> bool {
        !self.outer_bound_hit && self.outcomes.iter().all(|o| o.outcome == StopOutcome::Drained)
    }

    /// At least one serve loop died on its own.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome == StopOutcome::Failed)
    }
}

/// Coordinates start and shutdown of all protocol servers.
#[derive(Debug)]
pub struct ServerLifecycleManager {
    servers: Vec<ManagedServer>,
    grace_period: Duration,
    shutdown_timeout: Duration,
    root: CancellationToken,
    failures_tx: mpsc::UnboundedSender<ServerFailure>,
    failures_rx: mpsc::UnboundedReceiver<ServerFailure>,
    report: Option<ShutdownReport>,
}

impl ServerLifecycleManager {
    /// `grace_period` applies to each server; `shutdown_timeout` bounds the
    /// whole shutdown sequence.
    pub fn new(grace_period: Duration, shutdown_timeout: Duration) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            servers: Vec::new(),
            grace_period,
            shutdown_timeout,
            root: CancellationToken::new(),
            failures_tx,
            failures_rx,
            report: None,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.grace_period, config.shutdown_timeout)
    }

    /// Register a server. Must be called before [`start`](Self::start).
    pub fn register(&mut self, server: Arc<dyn ProtocolServer>) -> &mut Self {
        self.servers
            .push(ManagedServer::new(server, self.root.child_token()));
        self
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn states(&self) -> Vec<(&'static str, ServerState)> {
        self.servers.iter().map(|s| (s.protocol(), s.state())).collect()
    }

    pub fn local_addr(&self, protocol: &str) -> Option<SocketAddr> {
        self.servers
            .iter()
            .find(|s| s.protocol() == protocol)
            .and_then(ManagedServer::local_addr)
    }

    /// Bind and start every registered server.
    ///
    /// If any server fails to bind, the ones already started are shut down
    /// and the bind error is returned: the service runs with all protocols
    /// or not at all.
    pub async fn start(&mut self) -> Result<()> {
        for index in 0..self.servers.len() {
            let failures = self.failures_tx.clone();
            if let Err(err) = self.servers[index].start(failures).await {
                tracing::error!(error = %err, "server_start_failed");
                self.shutdown().await;
                return Err(err);
            }
        }
        tracing::info!(servers = self.servers.len(), "all_servers_listening");
        Ok(())
    }

    /// Run until `signal` resolves or a server dies, then shut down.
    pub async fn run<F>(&mut self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {
                tracing::info!("termination_signal_received");
            }
            Some(failure) = self.failures_rx.recv() => {
                tracing::error!(
                    protocol = failure.protocol,
                    reason = %failure.reason,
                    "server_failed_shutting_down"
                );
            }
        }
        self.shutdown().await
    }

    /// Drain all servers at once.
    ///
    /// Each server gets `grace_period` before it is aborted; the whole call
    /// returns within `shutdown_timeout`. Calls after the first return the
    /// first report without doing anything.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            tracing::debug!("shutdown_already_completed");
            return report.clone();
        }

        let started = Instant::now();
        tracing::info!(
            grace_period = ?self.grace_period,
            shutdown_timeout = ?self.shutdown_timeout,
            "shutdown_started"
        );

        // All servers leave LISTENING before any of them is awaited.
        for server in &self.servers {
            server.mark_draining();
        }
        self.root.cancel();

        let grace = self.grace_period;
        let drains = futures::future::join_all(self.servers.iter_mut().map(|s| s.finish(grace)));
        let outer_bound_hit = tokio::time::timeout(self.shutdown_timeout, drains)
            .await
            .is_err();
        if outer_bound_hit {
            tracing::error!(shutdown_timeout = ?self.shutdown_timeout, "shutdown_outer_bound_elapsed");
        }

        let outcomes = self
            .servers
            .iter_mut()
            .map(|s| ProtocolOutcome {
                protocol: s.protocol().to_string(),
                outcome: s.force_stop(),
            })
            .collect();

        let report = ShutdownReport {
            outcomes,
            outer_bound_hit,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            clean = report.is_clean(),
            "shutdown_completed"
        );
        self.report = Some(report.clone());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Error;
    use async_trait::async_trait;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    /// Listener that drains for a fixed time, optionally dying on its own.
    #[derive(Debug)]
    struct FakeServer {
        protocol: &'static str,
        address: String,
        drain_time: Duration,
        fail_after: Option<Duration>,
    }

    impl FakeServer {
        fn new(protocol: &'static str, drain_time: Duration) -> Arc<Self> {
            Arc::new(Self {
                protocol,
                address: "127.0.0.1:0".to_string(),
                drain_time,
                fail_after: None,
            })
        }
    }

    #[async_trait]
    impl ProtocolServer for FakeServer {
        fn protocol(&self) -> &'static str {
            self.protocol
        }

        fn address(&self) -> String {
            self.address.clone()
        }

        async fn serve(&self, _listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
            match self.fail_after {
                Some(after) => tokio::select! {
                    _ = tokio::time::sleep(after) => return Err(Error::internal("listener died")),
                    _ = shutdown.cancelled() => {}
                },
                None => shutdown.cancelled().await,
            }
            tokio::time::sleep(self.drain_time).await;
            Ok(())
        }
    }

    fn manager(servers: Vec<Arc<FakeServer>>) -> ServerLifecycleManager {
        let mut manager = ServerLifecycleManager::new(Duration::from_secs(10), Duration::from_secs(30));
        for server in servers {
            manager.register(server);
        }
        manager
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_shutdown_drains_both() {
        let mut manager = manager(vec![
            FakeServer::new("http", Duration::from_secs(1)),
            FakeServer::new("rpc", Duration::from_secs(2)),
        ]);
        manager.start().await.unwrap();
        assert!(manager.states().iter().all(|(_, s)| *s == ServerState::Listening));
        assert!(manager.local_addr("http").is_some());

        let report = manager.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(report.outcome("http"), Some(StopOutcome::Drained));
        assert_eq!(report.outcome("rpc"), Some(StopOutcome::Drained));
        // Drains run concurrently, so the slower one sets the pace.
        assert!(report.elapsed < Duration::from_secs(3));
        assert!(manager.states().iter().all(|(_, s)| *s == ServerState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_work() {
        let mut manager = manager(vec![FakeServer::new("http", Duration::from_secs(5))]);
        manager.start().await.unwrap();

        let report = manager.shutdown().await;
        assert_eq!(report.outcome("http"), Some(StopOutcome::Drained));
        assert!(report.elapsed >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_slow_drain_is_forced_after_grace() {
        let mut manager = manager(vec![
            FakeServer::new("http", Duration::from_secs(1)),
            FakeServer::new("rpc", Duration::from_secs(600)),
        ]);
        manager.start().await.unwrap();

        let report = manager.shutdown().await;
        assert_eq!(report.outcome("http"), Some(StopOutcome::Drained));
        assert_eq!(report.outcome("rpc"), Some(StopOutcome::Forced));
        assert!(!report.outer_bound_hit);
        assert!(!report.is_clean());
        assert!(report.elapsed < Duration::from_secs(11));
        assert!(logs_contain("server_force_stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_bound_caps_shutdown() {
        let mut manager = ServerLifecycleManager::new(Duration::from_secs(60), Duration::from_secs(5));
        manager.register(FakeServer::new("http", Duration::from_secs(600)));
        manager.start().await.unwrap();

        let report = manager.shutdown().await;
        assert!(report.outer_bound_hit);
        assert_eq!(report.outcome("http"), Some(StopOutcome::Forced));
        assert!(report.elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_shutdown_is_a_no_op() {
        let mut manager = manager(vec![FakeServer::new("http", Duration::from_secs(1))]);
        manager.start().await.unwrap();

        let first = manager.shutdown().await;
        let second = manager.shutdown().await;
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_on_signal() {
        let mut manager = manager(vec![
            FakeServer::new("http", Duration::from_millis(10)),
            FakeServer::new("rpc", Duration::from_millis(10)),
        ]);
        manager.start().await.unwrap();

        let report = manager.run(tokio::time::sleep(Duration::from_secs(1))).await;
        assert!(report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failure_triggers_full_shutdown() {
        let failing = Arc::new(FakeServer {
            protocol: "rpc",
            address: "127.0.0.1:0".to_string(),
            drain_time: Duration::ZERO,
            fail_after: Some(Duration::from_secs(1)),
        });
        let mut manager = manager(vec![FakeServer::new("http", Duration::from_millis(10)), failing]);
        manager.start().await.unwrap();

        let report = manager.run(std::future::pending()).await;
        assert!(report.has_failures());
        assert_eq!(report.outcome("rpc"), Some(StopOutcome::Failed));
        assert_eq!(report.outcome("http"), Some(StopOutcome::Drained));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_within_grace_drains_and_publishes_draining() {
        let mut server = ManagedServer::new(FakeServer::new("http", Duration::from_secs(1)), CancellationToken::new());
        let (failures, _failures_rx) = mpsc::unbounded_channel();
        server.start(failures).await.unwrap();
        let mut states = server.subscribe();
        assert!(states.borrow().is_accepting());

        let observed = async {
            states.changed().await.unwrap();
            let seen = *states.borrow_and_update();
            seen
        };
        let (outcome, seen) = tokio::join!(server.stop(Duration::from_secs(5)), observed);

        assert_eq!(seen, ServerState::Draining);
        assert!(!seen.is_accepting());
        assert_eq!(outcome, StopOutcome::Drained);
        assert_eq!(server.state(), ServerState::Stopped);
        // Repeat calls report the cached outcome.
        assert_eq!(server.stop(Duration::from_secs(5)).await, StopOutcome::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_forces_slow_drain_at_grace() {
        let mut server = ManagedServer::new(FakeServer::new("rpc", Duration::from_secs(600)), CancellationToken::new());
        let (failures, _failures_rx) = mpsc::unbounded_channel();
        server.start(failures).await.unwrap();

        let grace = Duration::from_secs(2);
        let started = Instant::now();
        let outcome = server.stop(grace).await;

        assert_eq!(outcome, StopOutcome::Forced);
        assert!(started.elapsed() <= grace + Duration::from_millis(50));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_not_running() {
        let mut server = ManagedServer::new(FakeServer::new("http", Duration::ZERO), CancellationToken::new());
        assert_eq!(server.stop(Duration::from_secs(1)).await, StopOutcome::NotRunning);
        assert_eq!(server.state(), ServerState::NotStarted);
    }

    #[tokio::test]
    async fn test_bind_failure_stops_started_servers() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = occupied.local_addr().unwrap();

        let conflicting = Arc::new(FakeServer {
            protocol: "rpc",
            address: taken.to_string(),
            drain_time: Duration::ZERO,
            fail_after: None,
        });
        let mut manager = manager(vec![FakeServer::new("http", Duration::ZERO), conflicting]);

        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, Error::Bind { protocol: "rpc", .. }));

        let states = manager.states();
        assert_eq!(states[0], ("http", ServerState::Stopped));
        assert_eq!(states[1], ("rpc", ServerState::FailedToStart));
    }
}

//! Protocol server contract and its managed wrapper.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::ServerState;
use crate::types::{Error, Result};

/// A network protocol front end that the lifecycle manager can run.
#[async_trait]
pub trait ProtocolServer: Send + Sync + fmt::Debug + 'static {
    /// Short protocol label used in logs and reports (`http`, `rpc`).
    fn protocol(&self) -> &'static str;

    /// Configured `host:port` to listen on.
    fn address(&self) -> String;

    /// Acquire the listening socket.
    async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();
        TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| Error::bind(self.protocol(), addr, source))
    }

    /// Serve on `listener` until `shutdown` is cancelled, then stop accepting,
    /// let in-flight requests finish and return.
    async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()>;
}

/// Pause before retrying after a listener-level accept error.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Accept the next connection, retrying through accept errors.
///
/// Errors tied to a single connection (reset, aborted, refused) retry at
/// once. Anything else, such as descriptor exhaustion, is logged and retried
/// after [`ACCEPT_BACKOFF`]. Cancel-safe: callers race it against shutdown.
pub(crate) async fn accept_with_backoff(
    listener: &TcpListener,
    protocol: &'static str,
) -> (TcpStream, SocketAddr) {
    loop {
        match listener.accept().await {
            Ok(conn) => return conn,
            Err(err) if is_connection_error(&err) => {
                tracing::debug!(protocol, error = %err, "accept_connection_error");
            }
            Err(err) => {
                tracing::error!(protocol, error = %err, backoff = ?ACCEPT_BACKOFF, "accept_failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

fn is_connection_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}

/// A serve loop that ended without being asked to.
#[derive(Debug, Clone)]
pub struct ServerFailure {
    pub protocol: &'static str,
    pub reason: String,
}

/// How one server left the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// In-flight work finished within the grace window.
    Drained,
    /// Grace window elapsed; remaining work was abandoned.
    Forced,
    /// The serve loop had already died.
    Failed,
    /// The server never reached the listening state.
    NotRunning,
}

/// One protocol server plus its state, cancellation token and serve task.
#[derive(Debug)]
pub struct ManagedServer {
    server: Arc<dyn ProtocolServer>,
    state: Arc<watch::Sender<ServerState>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    outcome: Option<StopOutcome>,
}

fn transition(state: &watch::Sender<ServerState>, protocol: &'static str, to: ServerState) -> bool {
    state.send_if_modified(|current| {
        if !current.can_transition_to(to) {
            return false;
        }
        tracing::info!(protocol, from = %current, to = %to, "server_state_changed");
        *current = to;
        true
    })
}

impl ManagedServer {
    pub fn new(server: Arc<dyn ProtocolServer>, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(ServerState::NotStarted);
        Self {
            server,
            state: Arc::new(state),
            shutdown,
            task: None,
            local_addr: None,
            outcome: None,
        }
    }

    pub fn protocol(&self) -> &'static str {
        self.server.protocol()
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bound address, available once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and spawn the serve loop.
    ///
    /// An unexpected end of the serve loop is reported on `failures`.
    pub async fn start(&mut self, failures: mpsc::UnboundedSender<ServerFailure>) -> Result<SocketAddr> {
        let protocol = self.protocol();
        if self.state() != ServerState::NotStarted {
            return Err(Error::internal(format!("{} server already started", protocol)));
        }

        let listener = match self.server.bind().await {
            Ok(listener) => listener,
            Err(err) => {
                transition(&self.state, protocol, ServerState::FailedToStart);
                self.outcome = Some(StopOutcome::NotRunning);
                return Err(err);
            }
        };
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        transition(&self.state, protocol, ServerState::Listening);
        tracing::info!(protocol, address = %local_addr, "server_listening");

        let server = Arc::clone(&self.server);
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            let result = server.serve(listener, shutdown).await;
            let reason = match result {
                Ok(()) if *state.borrow() == ServerState::Draining => {
                    transition(&state, protocol, ServerState::Stopped);
                    return;
                }
                Ok(()) => "serve loop exited without a shutdown request".to_string(),
                Err(err) => err.to_string(),
            };
            tracing::error!(protocol, reason = %reason, "server_failed");
            transition(&state, protocol, ServerState::Failed);
            let _ = failures.send(ServerFailure { protocol, reason });
        }));

        Ok(local_addr)
    }

    /// Move to draining without signalling the serve loop.
    pub(crate) fn mark_draining(&self) {
        transition(&self.state, self.protocol(), ServerState::Draining);
    }

    /// Stop accepting new work. Returns immediately.
    pub fn begin_drain(&self) {
        self.mark_draining();
        self.shutdown.cancel();
    }

    /// Wait up to `grace` for the serve loop to finish draining, then abort it.
    ///
    /// Returns the same outcome on every call after the first.
    pub async fn finish(&mut self, grace: Duration) -> StopOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let protocol = self.protocol();

        let outcome = match self.task.as_mut() {
            None => StopOutcome::NotRunning,
            Some(task) => match tokio::time::timeout(grace, &mut *task).await {
                Ok(Ok(())) if *self.state.borrow() == ServerState::Failed => StopOutcome::Failed,
                Ok(Ok(())) => StopOutcome::Drained,
                Ok(Err(join_err)) => {
                    tracing::error!(protocol, error = %join_err, "server_task_panicked");
                    transition(&self.state, protocol, ServerState::Failed);
                    StopOutcome::Failed
                }
                Err(_elapsed) => {
                    task.abort();
                    let err = Error::ShutdownTimeout { protocol, grace };
                    tracing::warn!(protocol, error = %err, "server_force_stopped");
                    transition(&self.state, protocol, ServerState::Stopped);
                    StopOutcome::Forced
                }
            },
        };

        self.task = None;
        self.outcome = Some(outcome);
        outcome
    }

    /// Begin draining and wait up to `grace` for it to complete.
    pub async fn stop(&mut self, grace: Duration) -> StopOutcome {
        self.begin_drain();
        self.finish(grace).await
    }

    /// Abort whatever is still running and return the final outcome.
    pub(crate) fn force_stop(&mut self) -> StopOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let protocol = self.protocol();
        let outcome = match self.task.take() {
            None => StopOutcome::NotRunning,
            Some(task) if task.is_finished() => {
                if self.state() == ServerState::Failed {
                    StopOutcome::Failed
                } else {
                    StopOutcome::Drained
                }
            }
            Some(task) => {
                task.abort();
                tracing::warn!(protocol, "server_aborted_at_outer_bound");
                transition(&self.state, protocol, ServerState::Stopped);
                StopOutcome::Forced
            }
        };
        self.outcome = Some(outcome);
        outcome
    }
}

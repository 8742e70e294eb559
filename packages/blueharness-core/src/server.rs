//! Listener startup and lifecycle control.
//!
//! [`ComposedServer::serve`] is the only point in the system where
//! external RPC calls become possible: it binds the port after every
//! registration is already in the router, so no partial service set is
//! ever exposed. The returned [`RunningServer`] is the process-wide
//! lifecycle coordination point, driven by exactly one external caller in
//! the order shutdown -> await_termination -> deinit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::compose::ComposedServer;
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError};

/// Lifecycle phase of the endpoint.
///
/// Transitions are strictly forward; no state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Composed but not yet listening.
    Uninitialized,
    /// Accepting and serving RPC calls.
    Running,
    /// No longer accepting new calls; draining in-flight ones.
    ShuttingDown,
    /// Fully drained and stopped.
    Terminated,
}

impl ComposedServer {
    /// Lifecycle phase of a composed, not-yet-served endpoint.
    #[must_use]
    pub fn state(&self) -> ServerState {
        ServerState::Uninitialized
    }

    /// Binds the listener and starts serving RPC calls.
    ///
    /// Consumes the composed endpoint; service handles move into the
    /// returned [`RunningServer`], which owns them until teardown.
    ///
    /// # Errors
    ///
    /// Binding failure is a fatal startup error; no service is exposed.
    pub async fn serve(self, addr: SocketAddr) -> HarnessResult<RunningServer> {
        let listener = TcpListener::bind(addr).await.map_err(HarnessError::Bind)?;
        let local_addr = listener.local_addr().map_err(HarnessError::Bind)?;

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let router = self.router;
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        log::info!("[Server] RPC listener started on {}", local_addr);
        Ok(RunningServer {
            handles: self.handles,
            local_addr,
            state: Mutex::new(ServerState::Running),
            cancel,
            serve_task: Mutex::new(Some(serve_task)),
            deinit_done: AtomicBool::new(false),
        })
    }
}

/// A live endpoint and its lifecycle controls.
pub struct RunningServer {
    handles: Vec<Arc<dyn RpcService>>,
    local_addr: SocketAddr,
    state: Mutex<ServerState>,
    cancel: CancellationToken,
    serve_task: Mutex<Option<JoinHandle<Result<(), std::io::Error>>>>,
    deinit_done: AtomicBool,
}

impl RunningServer {
    /// The address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Requests the listener stop accepting new calls.
    ///
    /// Non-blocking: in-flight calls keep draining until
    /// [`await_termination`](Self::await_termination) observes completion.
    /// Idempotent - a second call on a server already shutting down is a
    /// no-op, not an error.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        match *state {
            ServerState::Running => {
                *state = ServerState::ShuttingDown;
                self.cancel.cancel();
                tracing::info!("Shutdown requested, draining in-flight calls");
            }
            _ => tracing::debug!("Shutdown already requested, ignoring"),
        }
    }

    /// Blocks until the listener has drained all in-flight calls and
    /// stopped.
    ///
    /// Meaningful after [`shutdown`](Self::shutdown) has been issued;
    /// returns immediately if the server already terminated.
    pub async fn await_termination(&self) -> HarnessResult<()> {
        let task = self.serve_task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        let result = task.await;
        *self.state.lock() = ServerState::Terminated;
        tracing::info!("Listener terminated");
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::Listener(e.to_string())),
            Err(e) => Err(HarnessError::Listener(format!("listener task failed: {}", e))),
        }
    }

    /// Deinitializes every owned service handle in construction order.
    ///
    /// Exactly-once: a repeated call is a no-op returning no failures.
    /// Failure-isolated: one module's teardown error is collected and the
    /// pass continues with the remaining modules. Tolerates being invoked
    /// in any lifecycle phase, since some services hold resources
    /// independent of RPC state.
    pub fn deinit(&self) -> Vec<TeardownError> {
        if self.deinit_done.swap(true, Ordering::SeqCst) {
            tracing::debug!("Deinit already ran, ignoring");
            return Vec::new();
        }
        if *self.state.lock() != ServerState::Terminated {
            tracing::debug!("Deinit invoked before listener termination");
        }

        let mut failures = Vec::new();
        for handle in &self.handles {
            if let Err(e) = handle.deinit() {
                tracing::warn!("{}", e);
                failures.push(e);
            }
        }
        tracing::info!(
            "Deinitialized {} service(s), {} failure(s)",
            self.handles.len(),
            failures.len()
        );
        failures
    }
}

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

#[derive(thiserror::Error, Debug)]
pub enum ShutdownError {
    #[error("requests still in flight after {0:?} grace period")]
    GraceExpired(Duration),
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Drives `Running -> Draining -> Stopped` for the serving loop.
///
/// The server future is expected to stop accepting connections once
/// [`drain_signal`](Self::drain_signal) resolves and to finish when its
/// in-flight requests are done. Draining is bounded by the grace period.
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { state, grace }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    pub fn begin_drain(&self) {
        self.state.send_if_modified(|s| {
            if *s == ShutdownState::Running {
                *s = ShutdownState::Draining;
                true
            } else {
                false
            }
        });
    }

    fn stop(&self) {
        self.state.send_replace(ShutdownState::Stopped);
    }

    /// Resolves once draining has started.
    pub fn drain_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            let _ = rx.wait_for(|s| *s != ShutdownState::Running).await;
        }
    }

    /// Runs `server` until it ends on its own or `signal` fires. After the
    /// signal the server gets the grace period to finish; if it does not,
    /// it is dropped and [`ShutdownError::GraceExpired`] is returned.
    pub async fn run<S, F>(&self, server: S, signal: F) -> Result<(), ShutdownError>
    where
        S: Future<Output = std::io::Result<()>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(server);

        tokio::select! {
            res = &mut server => {
                self.stop();
                return res.map_err(ShutdownError::from);
            }
            _ = signal => {}
        }

        self.begin_drain();
        info!(grace_ms = self.grace.as_millis() as u64, "draining in-flight requests");

        let drained = tokio::time::timeout(self.grace, &mut server).await;
        self.stop();
        match drained {
            Ok(res) => {
                info!("shutdown complete");
                res.map_err(ShutdownError::from)
            }
            Err(_) => {
                warn!("grace period elapsed, forcing shutdown");
                Err(ShutdownError::GraceExpired(self.grace))
            }
        }
    }
}

/// Waits for CTRL+C or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received CTRL+C"); }
        _ = terminate => { info!("received SIGTERM"); }
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::HealthCfg;
use crate::shutdown::ShutdownState;
use crate::sink::InfluxSink;

pub struct Readiness {
    pub backend_ok: AtomicBool,
    shutdown: watch::Receiver<ShutdownState>,
}

impl Readiness {
    pub fn new(shutdown: watch::Receiver<ShutdownState>) -> Self {
        Self {
            backend_ok: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn is_ready(&self, cfg: &HealthCfg) -> bool {
        if *self.shutdown.borrow() != ShutdownState::Running {
            return false;
        }
        !cfg.require_backend || self.backend_ok.load(Ordering::Relaxed)
    }
}

/// Periodically pings the backend and records the result.
pub fn start_backend_probe(cfg: &HealthCfg, sink: InfluxSink, ready: Arc<Readiness>) {
    let interval = Duration::from_millis(cfg.probe_interval_ms.max(1));
    tokio::spawn(async move {
        loop {
            let ok = sink.ping().await;
            if ok != ready.backend_ok.swap(ok, Ordering::Relaxed) {
                tracing::info!(reachable = ok, "backend reachability changed");
            }
            tokio::time::sleep(interval).await;
        }
    });
}

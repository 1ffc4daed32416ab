use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Proxy counters, registered in a registry owned by this value.
pub struct AppMetrics {
    registry: Registry,
    requests: IntCounterVec,
    entries_received: IntCounter,
    entries_rejected: IntCounterVec,
    points_written: IntCounter,
    write_duration: Histogram,
}

impl AppMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Report requests by outcome"),
            &["outcome"],
        )?;
        let entries_received = IntCounter::new(
            "proxy_entries_received_total",
            "Value lists decoded from report bodies",
        )?;
        let entries_rejected = IntCounterVec::new(
            Opts::new(
                "proxy_entries_rejected_total",
                "Value lists skipped while building points",
            ),
            &["reason"],
        )?;
        let points_written = IntCounter::new(
            "proxy_points_written_total",
            "Points accepted by the storage backend",
        )?;
        let write_duration = Histogram::with_opts(HistogramOpts::new(
            "proxy_write_duration_seconds",
            "Latency of backend write calls",
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(entries_received.clone()))?;
        registry.register(Box::new(entries_rejected.clone()))?;
        registry.register(Box::new(points_written.clone()))?;
        registry.register(Box::new(write_duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            entries_received,
            entries_rejected,
            points_written,
            write_duration,
        })
    }

    pub fn request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    pub fn entries_received(&self, n: usize) {
        self.entries_received.inc_by(n as u64);
    }

    pub fn entry_rejected(&self, reason: &str) {
        self.entries_rejected.with_label_values(&[reason]).inc();
    }

    pub fn points_written(&self, n: usize) {
        self.points_written.inc_by(n as u64);
    }

    pub fn observe_write(&self, secs: f64) {
        self.write_duration.observe(secs);
    }

    pub fn requests_with(&self, outcome: &str) -> u64 {
        self.requests.with_label_values(&[outcome]).get()
    }

    /// Prometheus text exposition of every proxy metric.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

use axum::async_trait;
use reqwest::{StatusCode, Url};

use crate::config::InfluxCfg;
use crate::domain::Batch;

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected write ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Storage backend capability used by the request handler.
///
/// Implementations are shared by every in-flight request and must accept
/// concurrent calls.
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write(&self, batch: &Batch) -> Result<(), WriteError>;
}

/// Writes batches to an InfluxDB 1.x `/write` endpoint.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: Url,
    ping_url: Url,
}

impl InfluxSink {
    pub fn new(cfg: &InfluxCfg) -> anyhow::Result<Self> {
        let base = Url::parse(&cfg.url)?;
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("collectd-proxy/", env!("CARGO_PKG_VERSION")))
                .build()?,
            write_url: base.join("write")?,
            ping_url: base.join("ping")?,
        })
    }

    /// Returns true when the backend answers its ping endpoint.
    pub async fn ping(&self) -> bool {
        match self.client.get(self.ping_url.clone()).send().await {
            Ok(res) => res.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
        // nothing to store, no round trip
        if batch.is_empty() {
            return Ok(());
        }

        let res = self
            .client
            .post(self.write_url.clone())
            .query(&[("db", batch.database()), ("precision", "ns")])
            .body(batch.to_line_protocol())
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let message = res.text().await.unwrap_or_default();
        Err(WriteError::Rejected {
            status,
            message: message.trim().to_owned(),
        })
    }
}

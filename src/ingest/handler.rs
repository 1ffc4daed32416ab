use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};

use crate::app::AppState;
use crate::ingest::{build_batch, decode, DecodeError};
use crate::metrics::AppMetrics;
use crate::sink::{PointSink, WriteError};

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("failed to read request body: {message}")]
    Body { status: StatusCode, message: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Body { status, .. } => *status,
            ProxyError::Decode(_) => StatusCode::BAD_REQUEST,
            ProxyError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            ProxyError::Body { .. } => "body_error",
            ProxyError::Decode(_) => "decode_error",
            ProxyError::Write(_) => "write_error",
        }
    }
}

impl From<BytesRejection> for ProxyError {
    fn from(rejection: BytesRejection) -> Self {
        ProxyError::Body {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Error")]
    error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Empty success payload, serializes as `{}`.
#[derive(Debug, Serialize)]
pub struct Accepted {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub entries: usize,
    pub points: usize,
    pub rejected: usize,
}

/// Decodes a report body, builds one batch for `database` and hands it to
/// the sink in a single write.
///
/// A body that fails to decode is rejected before anything is built or
/// written. Once decoding succeeds the sink is called exactly once, even
/// when every entry was skipped and the batch is empty.
pub async fn proxy_report(
    body: &[u8],
    database: &str,
    sink: &dyn PointSink,
    metrics: &AppMetrics,
) -> Result<WriteSummary, ProxyError> {
    let entries = decode(body)?;
    metrics.entries_received(entries.len());

    let (batch, rejected) = build_batch(&entries, database);
    for r in &rejected {
        metrics.entry_rejected(r.error.reason());
    }

    let started = Instant::now();
    let written = sink.write(&batch).await;
    metrics.observe_write(started.elapsed().as_secs_f64());
    written?;
    metrics.points_written(batch.len());

    Ok(WriteSummary {
        entries: entries.len(),
        points: batch.len(),
        rejected: rejected.len(),
    })
}

pub async fn ingest(
    State(st): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Accepted>, ProxyError> {
    let result = match body {
        Ok(body) => {
            proxy_report(
                &body,
                &st.cfg.influx.database,
                st.sink.as_ref(),
                &st.metrics,
            )
            .await
        }
        Err(rejection) => Err(rejection.into()),
    };

    match result {
        Ok(summary) => {
            st.metrics.request("ok");
            debug!(
                entries = summary.entries,
                points = summary.points,
                rejected = summary.rejected,
                "report forwarded"
            );
            Ok(Json(Accepted {}))
        }
        Err(err) => {
            st.metrics.request(err.outcome());
            error!(error = %err, "report not forwarded");
            Err(err)
        }
    }
}

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use energy_client::domain::NewReading;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    pipeline::{Envelope, ItemStream, PipelineError, Source},
    validation::{check_thresholds, ScreenedReading, ThresholdCheck},
};

const MANUAL_SOURCE: &str = "manual";

#[derive(Clone)]
struct IngestState {
    tx: mpsc::Sender<Envelope<ScreenedReading>>,
    auth_bearer_token: Option<Arc<str>>,
}

/// Manual reading entry over HTTP.
///
/// - `POST /readings` takes a JSON array of readings and feeds them to the pipeline.
/// - `POST /readings/check` runs the threshold check on `{value, historical_values}`
///   without storing anything.
#[derive(Clone)]
pub struct HttpReadingSource {
    receiver: Arc<Mutex<Option<mpsc::Receiver<Envelope<ScreenedReading>>>>>,
}

#[derive(serde::Deserialize)]
struct IncomingReading {
    meter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    ts: time::OffsetDateTime,
    value: Option<f64>,
    source_system: Option<String>,
}

impl From<IncomingReading> for NewReading {
    fn from(i: IncomingReading) -> Self {
        NewReading::new(i.meter_id, i.ts, i.value).with_source(i.source_system.unwrap_or_else(|| MANUAL_SOURCE.to_string()))
    }
}

#[derive(serde::Deserialize)]
struct CheckRequest {
    value: Option<f64>,
    #[serde(default)]
    historical_values: Vec<f64>,
}

impl HttpReadingSource {
    /// Build the source and its router without binding a listener.
    pub fn with_router(channel_capacity: usize, auth_bearer_token: Option<String>) -> (Self, Router) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let state = IngestState {
            tx,
            auth_bearer_token: auth_bearer_token.map(Arc::from),
        };

        let app = Router::new()
            .route("/readings", post(ingest_readings))
            .route("/readings/check", post(check_reading))
            .with_state(state);

        let source = Self {
            receiver: Arc::new(Mutex::new(Some(rx))),
        };
        (source, app)
    }

    pub async fn new(
        bind_addr: &str,
        channel_capacity: usize,
        auth_bearer_token: Option<String>,
    ) -> Result<Self, PipelineError> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Source(format!("failed to bind reading listener on {addr}: {e}")))?;

        let (source, app) = Self::with_router(channel_capacity, auth_bearer_token);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!(error = %e, "HTTP reading source server error");
            }
        });

        tracing::info!(%addr, "HTTP reading source listening");
        Ok(source)
    }
}

#[async_trait::async_trait]
impl Source<ScreenedReading> for HttpReadingSource {
    async fn stream(&self) -> ItemStream<ScreenedReading> {
        let mut guard = self.receiver.lock().await;
        if let Some(rx) = guard.take() {
            return Box::pin(ReceiverStream::new(rx).map(Ok));
        }

        Box::pin(futures::stream::once(async {
            Err(PipelineError::Source(
                "HttpReadingSource stream already taken; only one consumer supported".to_string(),
            ))
        }))
    }
}

fn authorized(state: &IngestState, headers: &HeaderMap) -> bool {
    let Some(token) = state.auth_bearer_token.as_deref() else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == token)
}

async fn ingest_readings(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(payload): Json<Vec<IncomingReading>>,
) -> Result<StatusCode, StatusCode> {
    metrics::counter!("http_ingest_requests_total").increment(1);

    if !authorized(&state, &headers) {
        metrics::counter!("http_ingest_unauthorized_total").increment(1);
        return Err(StatusCode::UNAUTHORIZED);
    }

    for incoming in payload {
        let reading: NewReading = incoming.into();
        if state.tx.send(Envelope::new(reading.into())).await.is_err() {
            // Channel closed; treat as server error
            metrics::counter!("http_ingest_failed_total").increment(1);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    Ok(StatusCode::ACCEPTED)
}

async fn check_reading(Json(req): Json<CheckRequest>) -> Json<ThresholdCheck> {
    metrics::counter!("http_check_requests_total").increment(1);
    Json(check_thresholds(req.value, &req.historical_values))
}

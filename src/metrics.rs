//! Prometheus metrics for the exporter.
//!
//! Exposes:
//! - `tg_drive_backup_session_duration_seconds` (histogram)
//! - `tg_drive_backup_sessions_total` (counter with status)
//! - `tg_drive_backup_conversations_total` (counter with outcome)
//! - `tg_drive_backup_uploads_total` (counter with kind)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Result;

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static SESSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 0.5s up to ~2 hours.
    let buckets =
        prometheus::exponential_buckets(0.5, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "tg_drive_backup_session_duration_seconds",
        "Time spent exporting one session",
        &["session"],
        buckets
    )
    .expect("failed to register session duration histogram")
});

static SESSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tg_drive_backup_sessions_total",
        "Processed sessions by status",
        &["session", "status"]
    )
    .expect("failed to register session counter")
});

static CONVERSATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tg_drive_backup_conversations_total",
        "Direct conversations by outcome",
        &["session", "outcome"]
    )
    .expect("failed to register conversation counter")
});

static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tg_drive_backup_uploads_total",
        "Files uploaded to Google Drive",
        &["kind"]
    )
    .expect("failed to register upload counter")
});

/// Outcome of one direct conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationOutcome {
    Exported,
    Skipped,
}

impl ConversationOutcome {
    fn label(self) -> &'static str {
        match self {
            ConversationOutcome::Exported => "exported",
            ConversationOutcome::Skipped => "skipped",
        }
    }
}

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&SESSION_DURATION);
    Lazy::force(&SESSIONS_TOTAL);
    Lazy::force(&CONVERSATIONS_TOTAL);
    Lazy::force(&UPLOADS_TOTAL);
}

/// Record a finished session with its duration and status.
pub fn record_session_result(session: &str, duration: Duration, success: bool) {
    init_collectors();
    SESSION_DURATION
        .with_label_values(&[session])
        .observe(duration.as_secs_f64());
    SESSIONS_TOTAL
        .with_label_values(&[session, if success { "ok" } else { "error" }])
        .inc();
}

pub fn record_conversation(session: &str, outcome: ConversationOutcome) {
    init_collectors();
    CONVERSATIONS_TOTAL
        .with_label_values(&[session, outcome.label()])
        .inc();
}

/// `kind` is `transcript` or `run_log`.
pub fn record_upload(kind: &'static str) {
    init_collectors();
    UPLOADS_TOTAL.with_label_values(&[kind]).inc();
}

/// Text exposition of every registered metric.
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return plain_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::from("encode error"));
    }

    let mut response = plain_response(StatusCode::OK, Bytes::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

fn plain_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}

fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        _ => plain_response(StatusCode::NOT_FOUND, Bytes::new()),
    }
}

async fn serve(listener: TcpListener) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("Metrics endpoint stopped accepting connections: {}", err);
                return;
            }
        };
        let service = service_fn(|req: Request<Incoming>| async move {
            Ok::<_, Infallible>(route(req.uri().path()))
        });

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Bind the metrics endpoint and serve it in the background until the
/// process exits. Returns the bound address (port 0 picks a free one).
pub async fn spawn_metrics_server(addr: SocketAddr) -> Result<SocketAddr> {
    init_collectors();
    let listener = TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    info!(addr = %bound, "Prometheus metrics endpoint started");

    tokio::spawn(serve(listener));
    Ok(bound)
}

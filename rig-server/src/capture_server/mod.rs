mod serve;
pub use serve::run_server;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use clap::Args;
use serde::Serialize;
use serde_json::json;
use shared::config::{CaptureOverrides, RigConfig};
use shared::orchestrator::{AdmissionRejection, CaptureOrchestrator};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1 << 20;

/// Default interval between SSE keep-alive comments.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// HTTP listener arguments for the capture server.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    #[arg(
        short = 'p',
        long,
        default_value = "8080",
        help = "HTTP server port",
        long_help = "TCP port for the HTTP server. The control page will be available at \
            http://<bind_address>:<port>/. Default: 8080."
    )]
    pub port: u16,

    #[arg(
        short = 'b',
        long,
        default_value = "0.0.0.0",
        help = "HTTP server bind address",
        long_help = "IP address to bind the HTTP server to. Use '0.0.0.0' to listen on all \
            interfaces (required for remote access), or '127.0.0.1' for localhost-only access."
    )]
    pub bind_address: String,
}

/// Values used to prefill the control page form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormDefaults {
    pub horizontal_angle_deg: f64,
    pub vertical_angle_deg: f64,
    pub focal_length_mm: f64,
}

impl FormDefaults {
    pub fn from_config(config: &RigConfig) -> Self {
        Self {
            horizontal_angle_deg: config.horizontal_angle_deg(),
            vertical_angle_deg: config.vertical_angle_deg(),
            focal_length_mm: config.lens.focal_length_mm,
        }
    }
}

/// State shared by every handler.
pub struct ServerState {
    pub orchestrator: CaptureOrchestrator,
    pub form_defaults: FormDefaults,
    pub heartbeat: Duration,
    shutdown: watch::Sender<bool>,
}

impl ServerState {
    pub fn new(orchestrator: CaptureOrchestrator, form_defaults: FormDefaults) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            orchestrator,
            form_defaults,
            heartbeat: DEFAULT_HEARTBEAT,
            shutdown,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Ends every open status stream so graceful shutdown can complete.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn admission_status(rejection: &AdmissionRejection) -> StatusCode {
    match rejection {
        AdmissionRejection::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        AdmissionRejection::AlreadyRunning => StatusCode::CONFLICT,
        AdmissionRejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AdmissionRejection::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn run_endpoint(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<CaptureOverrides>, JsonRejection>,
) -> Response {
    let overrides = match body {
        Ok(Json(overrides)) => overrides,
        Err(e) => {
            debug!("Rejected /run body: {e}");
            return json_error(StatusCode::BAD_REQUEST, "invalid JSON");
        }
    };

    if let Err(e) = overrides.validate() {
        return json_error(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.orchestrator.start_run(overrides) {
        Ok(id) => {
            info!("Accepted capture run {id}");
            (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response()
        }
        Err(rejection) => {
            warn!("Capture request rejected: {rejection}");
            json_error(admission_status(&rejection), rejection.to_string())
        }
    }
}

async fn cancel_endpoint(State(state): State<Arc<ServerState>>) -> Response {
    match state.orchestrator.cancel_run() {
        Ok(()) => Json(json!({
            "status": "cancelled",
            "message": "Capture cancellation requested",
        }))
        .into_response(),
        Err(e) => json_error(StatusCode::CONFLICT, e.to_string()),
    }
}

async fn config_endpoint(State(state): State<Arc<ServerState>>) -> Json<FormDefaults> {
    Json(state.form_defaults)
}

async fn index_page() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

/// SSE stream of status events.
///
/// Opens with a `connected` comment, then sends each event as one `data:`
/// line of JSON. The subscription is dropped with the stream when the client
/// goes away.
async fn status_stream_endpoint(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.orchestrator.subscribe();
    let mut stop = state.shutdown.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().comment("connected"));
        loop {
            let next = tokio::select! {
                event = subscription.recv() => event,
                _ = stop.wait_for(|stopping| *stopping) => None,
            };
            let Some(event) = next else {
                break;
            };
            let data = event.to_json().replace(['\r', '\n'], " ");
            yield Ok(Event::default().data(data));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.heartbeat).text("heartbeat"))
}

async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(req).await;

    debug!(
        "{} {} from {} -> {} in {:.1}ms",
        method,
        uri.path(),
        peer,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    response
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/run", post(run_endpoint))
        .route("/cancel", post(cancel_endpoint))
        .route("/config", get(config_endpoint))
        .route("/status/stream", get(status_stream_endpoint))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
}

//! Gateway HTTP server — Axum-based front door for the request handler

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use harmony_core::error::CATCH_ALL_ERROR_BODY;
use harmony_core::handler::panic_detail;
use harmony_core::{InboundPayload, RequestHandler, ResponseEnvelope};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub handler: Arc<RequestHandler>,
    pub start_time: Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, handler: Arc<RequestHandler>) -> Self {
        let state = GatewayState {
            handler,
            start_time: Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/generate", post(generate_handler))
            .route("/invoke", post(lambda_handler))
            .route("/api/status", get(status_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(self.cors_layer())
            .with_state(self.state.clone())
    }

    /// CORS from the configured allow-origin; answers preflight requests.
    /// With no origin configured no Allow-Origin header is sent.
    fn cors_layer(&self) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

        match self.state.handler.envelope().cors_allow_origin() {
            Some("*") => cors.allow_origin(AllowOrigin::any()),
            Some(origin) => match HeaderValue::from_str(origin) {
                Ok(value) => cors.allow_origin(AllowOrigin::exact(value)),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    cors
                }
            },
            None => cors,
        }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

// ── HTTP Handlers ──

/// Plain HTTP: the raw body is the serialized `{input}` payload and the
/// envelope's status and headers become the HTTP response.
async fn generate_handler(State(state): State<GatewayState>, body: Bytes) -> Response {
    let envelope = state
        .handler
        .handle(InboundPayload::from_bytes(&body))
        .await;
    into_http(envelope)
}

/// Lambda proxy invocation: the body is an event and the response is the
/// proxy result object itself (`statusCode`, `headers`, `body`).
async fn lambda_handler(State(state): State<GatewayState>, body: Bytes) -> Response {
    let payload = match serde_json::from_slice(&body) {
        Ok(event) => InboundPayload::from_event(event),
        Err(_) => InboundPayload::from_bytes(&body),
    };
    let envelope = state.handler.handle(payload).await;
    axum::Json(envelope).into_response()
}

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let registry = state.handler.router().registry();
    let uptime = state.start_time.elapsed().as_secs();

    axum::Json(serde_json::json!({
        "status": "ok",
        "providers": serde_json::to_value(registry.as_slice()).unwrap_or_default(),
        "uptime_secs": uptime,
    }))
}

fn into_http(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, envelope.body).into_response();

    let headers = response.headers_mut();
    for (name, value) in &envelope.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Dropping invalid response header {}", name),
        }
    }
    response
}

/// Last resort for panics the request handler did not catch itself
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    error!("Gateway panicked: {}", panic_detail(err.as_ref()));

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "application/json")],
        CATCH_ALL_ERROR_BODY,
    )
        .into_response()
}

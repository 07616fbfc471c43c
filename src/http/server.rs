//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (trace context, timeout, request tracing)
//! - Bind server to listener with peer address info
//! - Echo the trace identity of each request
//! - Relay requests to the downstream service with propagated context

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::http::client::TracedClient;
use crate::http::error::{ApiError, ErrorCode};
use crate::http::middleware::{trace_context_middleware, PropagationState};
use crate::trace::{
    HostNetwork, OriginClassifier, TraceField, TraceHandle, TRACEPARENT, TRACESTATE,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: TracedClient,
    pub downstream: Option<String>,
}

/// HTTP server propagating trace context.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig) -> Self {
        let host = match config.propagation.host_address {
            Some(addr) => Some(HostNetwork::from_addr(addr)),
            None => HostNetwork::cached(),
        };
        let classifier = OriginClassifier::new(host, config.propagation.trusted_networks.clone());
        let propagation = PropagationState::new(classifier);

        let state = AppState {
            client: TracedClient::new(Duration::from_secs(config.timeouts.downstream_secs)),
            downstream: config
                .downstream
                .url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        };

        let router = Self::build_router(&config, state, propagation);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState, propagation: PropagationState) -> Router {
        Router::new()
            .route("/", get(whoami_handler))
            .route("/health", get(health_handler))
            .route("/relay", any(relay_handler))
            .route("/relay/", any(relay_handler))
            .route("/relay/{*path}", any(relay_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(propagation, trace_context_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for driving the service without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        // Peer addresses feed origin classification.
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct WhoAmI {
    trace: TraceField,
    node_state: String,
    internal: bool,
}

/// Echo the trace identity assigned to this request.
async fn whoami_handler(trace: TraceHandle) -> Json<WhoAmI> {
    let ctx = trace.context();
    tracing::info!("Handled request");
    Json(WhoAmI {
        trace: trace.field(),
        node_state: ctx.state().to_string(),
        internal: ctx.is_internal(),
    })
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Forward the request to the downstream service as a child of this hop.
async fn relay_handler(
    State(state): State<AppState>,
    trace: TraceHandle,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let Some(base) = state.downstream.as_deref() else {
        return Err(ApiError::not_found().with_cause("no downstream service configured"));
    };

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let forwarded = path_and_query.strip_prefix("/relay").unwrap_or(path_and_query);
    let forwarded = if forwarded.is_empty() || forwarded.starts_with('?') {
        format!("/{forwarded}")
    } else {
        forwarded.to_string()
    };

    let uri: Uri = format!("{base}{forwarded}")
        .parse()
        .map_err(|e| ApiError::bad_request().with_cause(e))?;

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(parts.version)
        .body(body)
        .map_err(|e| ApiError::internal().with_cause(e))?;
    for (name, value) in parts.headers.iter() {
        if name != axum::http::header::HOST {
            outbound.headers_mut().append(name.clone(), value.clone());
        }
    }

    match state.client.send(&trace, outbound).await {
        Ok(mut response) => {
            // This hop's identity replaces the downstream's on the way back.
            response.headers_mut().remove(TRACEPARENT);
            response.headers_mut().remove(TRACESTATE);
            Ok(response.into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Downstream call failed");
            Err(ApiError::new(StatusCode::BAD_GATEWAY, ErrorCode::InternalServerError).with_cause(e))
        }
    }
}

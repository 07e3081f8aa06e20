//! `SeanceServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use seance_core::{ConnectionId, SessionId};
use seance_spirit::ResponsePipeline;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::context::SessionContext;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, broadcaster, pipeline, and history.
    pub ctx: Arc<SessionContext>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus metrics handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
    /// Session tasks, awaited at shutdown.
    pub tasks: TaskTracker,
}

/// The Séance server.
pub struct SeanceServer {
    config: ServerConfig,
    ctx: Arc<SessionContext>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: PrometheusHandle,
    start_time: Instant,
}

impl SeanceServer {
    /// Create a server answering questions with `pipeline`.
    pub fn new(
        config: ServerConfig,
        pipeline: ResponsePipeline,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let ctx = Arc::new(SessionContext::new(
            &config,
            Arc::new(pipeline),
            shutdown.token(),
        ));
        Self {
            config,
            ctx,
            shutdown,
            metrics_handle,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
            tasks: self.shutdown.tracker(),
        };

        Router::new()
            .route("/ws/{session_id}", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(cors_layer(&self.config.cors_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the server task,
    /// which finishes after [`ShutdownCoordinator::shutdown`]. Upgraded
    /// sockets outlive it; wait for them with
    /// [`ShutdownCoordinator::graceful_shutdown`].
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });

        info!(%addr, generator = self.ctx.pipeline.generator_name(), "séance server listening");
        Ok((addr, handle))
    }

    /// Session membership.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.ctx.registry
    }

    /// Shared session-task state.
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// GET /ws/{session_id}
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if session_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "session id must not be blank").into_response();
    }
    let session_id = SessionId::from(session_id);
    let connection_id = ConnectionId::new();
    let ctx = Arc::clone(&state.ctx);
    let tasks = state.tasks.clone();
    ws.on_upgrade(move |socket| {
        tasks.track_future(run_session(socket, session_id, connection_id, ctx))
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.ctx.pipeline.generator_name(),
        &state.ctx.registry.sessions(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use seance_core::retry::RetryConfig;
    use seance_spirit::OfflineGenerator;
    use tower::ServiceExt;

    fn make_server(config: ServerConfig) -> SeanceServer {
        let pipeline = ResponsePipeline::new(Arc::new(OfflineGenerator), RetryConfig::default(), 10);
        let handle = PrometheusBuilder::new().build_recorder().handle();
        SeanceServer::new(config, pipeline, handle)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_counters() {
        let server = make_server(ServerConfig::default());
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["active_sessions"], 0);
        assert_eq!(body["sessions"], serde_json::json!([]));
        assert_eq!(body["spirit"], "offline");
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder()
            .uri("/ws/parlour")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(ServerConfig::default());
        let (status, _) = get_json(server.router(), "/sessions").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let config = ServerConfig {
            cors_origins: vec!["http://localhost:3000".into()],
            ..ServerConfig::default()
        };
        let server = make_server(config);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn cors_rejects_other_origin() {
        let config = ServerConfig {
            cors_origins: vec!["http://localhost:3000".into()],
            ..ServerConfig::default()
        };
        let server = make_server(config);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn accessors() {
        let server = make_server(ServerConfig::default());
        assert_eq!(server.config().port, 0);
        assert_eq!(server.registry().session_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.context().max_session_users, 6);
    }
}

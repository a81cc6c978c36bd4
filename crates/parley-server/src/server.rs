//! `ParleyServer`: Axum HTTP + WebSocket server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use parley_core::{AccountService, ChatService, Event};

use crate::config::ServerConfig;
use crate::gate::SessionGate;
use crate::handlers::{ChatLimits, HandlerContext};
use crate::health::{self, HealthResponse};
use crate::router::MessageRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{BroadcastDispatcher, ConnectionRegistry, session};

/// Shared state accessible from Axum handlers and connection tasks.
#[derive(Clone)]
pub struct AppState {
    /// Authenticates upgrade requests.
    pub gate: Arc<SessionGate>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Frame dispatch table.
    pub router: Arc<MessageRouter>,
    /// Handler → dispatcher queue.
    pub events: mpsc::Sender<Event>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The parley chat server.
pub struct ParleyServer {
    state: AppState,
    events_rx: Mutex<Option<mpsc::Receiver<Event>>>,
}

impl ParleyServer {
    /// Wire the gate, router and registry over the given collaborators.
    pub fn new(
        config: ServerConfig,
        accounts: Arc<dyn AccountService>,
        chat: Arc<dyn ChatService>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let ctx = HandlerContext {
            chat: Arc::clone(&chat),
            limits: ChatLimits::from(&config),
        };
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let state = AppState {
            gate: Arc::new(
                SessionGate::new(accounts, chat, config.session_header.clone())
                    .with_allowed_origins(config.allowed_origins.clone()),
            ),
            registry: Arc::new(ConnectionRegistry::new()),
            router: Arc::new(MessageRouter::with_default_handlers(ctx)),
            events: events_tx,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
            metrics,
        };
        Self {
            state,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start the dispatcher and serve until shutdown.
    ///
    /// Returns the bound address and a handle that resolves once both the
    /// listener and the dispatcher have stopped. Can only be called once.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let Some(events) = self.events_rx.lock().take() else {
            return Err(io::Error::other("server is already listening"));
        };

        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;

        let dispatcher = BroadcastDispatcher::new(Arc::clone(&self.state.registry));
        let dispatch_task = tokio::spawn(dispatcher.run(events, self.state.shutdown.token()));

        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                error!(error = %err, "server error");
            }
            let _ = dispatch_task.await;
            info!("parley server stopped");
        });

        info!(%addr, "parley server listening");
        Ok((addr, handle))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /ws
///
/// The gate runs before the upgrade is inspected, so a request without a
/// valid session is refused with 401 whether or not it is a real upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let admission = match state.gate.admit(&headers) {
        Ok(admission) => admission,
        Err(err) => return err.into_response(),
    };
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(user_id = %admission.user, error = %rejection, "not an upgrade request");
            return rejection.into_response();
        }
    };

    let max_size = state.config.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| session::run_connection(socket, admission, state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use parley_store::ParleyStore;
    use tower::ServiceExt;

    fn make_server() -> (ParleyServer, ParleyStore) {
        let store = ParleyStore::in_memory().unwrap();
        let shared = Arc::new(store.clone());
        let server = ParleyServer::new(ServerConfig::default(), shared.clone(), shared, None);
        (server, store)
    }

    async fn request(app: Router, uri: &str, token: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header("session_token", token);
        }
        app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (server, _) = make_server();
        let resp = request(server.router(), "/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn ws_without_session_is_unauthorized() {
        let (server, _) = make_server();
        let resp = request(server.router(), "/ws", None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["code"], "MISSING_CREDENTIAL");
    }

    #[tokio::test]
    async fn ws_with_unknown_session_is_unauthorized() {
        let (server, _) = make_server();
        let resp = request(server.router(), "/ws", Some("not-a-token")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["code"], "INVALID_SESSION");
    }

    #[tokio::test]
    async fn ws_with_session_but_no_upgrade_is_client_error() {
        let (server, store) = make_server();
        let user = store.accounts().create_user("a@example.com").unwrap();
        let token = store.issue_session(user.id, 1).unwrap();

        let resp = request(server.router(), "/ws", Some(&token)).await;
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn ws_from_foreign_origin_is_forbidden() {
        let store = ParleyStore::in_memory().unwrap();
        let shared = Arc::new(store.clone());
        let config = ServerConfig {
            allowed_origins: vec!["https://chat.example.com".into()],
            ..ServerConfig::default()
        };
        let server = ParleyServer::new(config, shared.clone(), shared, None);
        let user = store.accounts().create_user("a@example.com").unwrap();
        let token = store.issue_session(user.id, 1).unwrap();

        let req = Request::builder()
            .uri("/ws")
            .header("session_token", token)
            .header("origin", "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await["error"]["code"], "ORIGIN_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let (server, _) = make_server();
        let resp = request(server.router(), "/metrics", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (server, _) = make_server();
        let resp = request(server.router(), "/nonexistent", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_twice_fails_and_shutdown_stops() {
        let (server, _) = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.listen().await.is_err());

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn config_accessible() {
        let (server, _) = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert!(!server.shutdown().is_shutting_down());
    }
}

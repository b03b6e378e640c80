use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use leadbox_store::InquiryStore;

use crate::client::{self, ClientRegistry};
use crate::feed_bridge;
use crate::handlers::{self, AppState};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            max_send_queue: 256,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(handlers::health))
        .route(
            "/api/inquiries",
            get(handlers::list_inquiries).post(handlers::create_inquiry),
        )
        .route("/api/inquiries/counts", get(handlers::get_counts))
        .route("/api/inquiries/unseen", get(handlers::get_unseen))
        .route("/api/inquiries/{id}", delete(handlers::delete_inquiry))
        .route("/api/inquiries/{id}/status", patch(handlers::set_status))
        .route("/api/inquiries/{id}/seen", post(handlers::mark_seen))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to keep it alive.
pub async fn start(config: ServerConfig, store: InquiryStore) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    // Bridge the store's change feed onto the WebSocket clients
    let bridge_rx = store.feed_sender().subscribe();
    let bridge_handle = feed_bridge::create_bridge(Arc::clone(&registry), bridge_rx);

    // Dead-client cleanup (every 60s)
    let cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        std::time::Duration::from_secs(60),
    );

    let state = AppState {
        store,
        registry: Arc::clone(&registry),
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "leadbox server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _bridge: bridge_handle,
        _cleanup: cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket feed connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.registry.register();
    tracing::info!(client_id = %client_id, "feed client connected");

    client::handle_ws_connection(socket, client_id, rx, state.registry).await;
}

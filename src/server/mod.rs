//! HTTP server
//!
//! Routes:
//!
//! - `GET /health`
//! - `GET /models`
//! - `POST /chat`
//! - `POST /chat/stream` (server-sent events)
//! - `GET /conversations`
//! - `GET /conversations/:id`
//! - `POST /conversations/:id/title`

pub mod error;
pub mod handlers;

pub use error::ApiError;

use crate::chat::ChatService;
use crate::config::Config;
use crate::error::{LexaiError, Result};
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
}

/// Build the application router
pub fn router(chat: ChatService) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::models))
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/conversations", get(handlers::list_conversations))
        .route("/conversations/:id", get(handlers::get_conversation))
        .route("/conversations/:id/title", post(handlers::rename_conversation))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { chat })
}

/// Run the server until Ctrl-C
///
/// Engines are warmed up first when `chat.warm_up` is set.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or the address
/// cannot be bound
pub async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let warm_up = config.chat.warm_up;
    let chat = ChatService::from_config(config)?;

    if warm_up {
        let total = chat.config().variants.len();
        let ready = chat.registry().warm_up().await;
        tracing::info!("Warm-up finished: {}/{} engines reachable", ready, total);
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LexaiError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!("LexAI listening on http://{}", addr);

    axum::serve(listener, router(chat))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

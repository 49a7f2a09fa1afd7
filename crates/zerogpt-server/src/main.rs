//! zerogpt HTTP Server
//!
//! Axum-based server exposing the chat agent over a small REST API.
//! Requests carrying a `user_id` read and extend that user's stored history.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zerogpt_core::{DateTimeTool, LlmProvider, Settings, ToolRegistry};
use zerogpt_runtime::OpenAiProvider;
use zerogpt_store::SqliteHistoryStore;

use crate::handlers::{audio_chat_handler, chat_handler, health_check};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_env()?);

    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {}", provider.config().base_url),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not reachable - chats will fail", provider.config().base_url);
            tracing::warn!("  Check OPENAI_API_KEY and OPENAI_BASE_URL");
        }
    }

    // History store
    let store = Arc::new(SqliteHistoryStore::from_settings(&settings)?);
    tracing::info!(
        "✓ History at {} (last {} messages per user)",
        settings.db_path.display(),
        settings.message_history_limit
    );

    // Initialize tools
    let mut tools = ToolRegistry::new();
    tools.register_typed(DateTimeTool);

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let state = AppState {
        provider,
        tools: Arc::new(tools),
        store,
        settings: Arc::new(settings),
    };

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 zerogpt server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  POST /api/chat        - Send message (text or structured)");
    tracing::info!("  POST /api/chat/audio  - Send message, reply spoken");
    tracing::info!("");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the application router
fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/audio", post(audio_chat_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

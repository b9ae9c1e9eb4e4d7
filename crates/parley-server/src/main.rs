use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::middleware::require_auth;
use parley_api::{attachments, conversations, messages, participants, users};
use parley_chat::{ChatService, DEFAULT_MAX_ATTACHMENT_BYTES};
use parley_gateway::registry::ChannelRegistry;
use parley_gateway::session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let max_attachment_bytes: u64 = std::env::var("PARLEY_MAX_ATTACHMENT_BYTES")
        .unwrap_or_else(|_| DEFAULT_MAX_ATTACHMENT_BYTES.to_string())
        .parse()?;

    // Init database
    let db = Arc::new(parley_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let chat = Arc::new(ChatService::new(db.clone(), max_attachment_bytes));
    let registry = ChannelRegistry::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        chat,
        registry,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/users/register", post(auth::register))
        .route("/users/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users", get(users::search_users))
        .route("/users/me", get(users::me))
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_conversation)
                .put(conversations::rename_conversation)
                .delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/{conversation_id}/participants",
            post(participants::add_participant).get(participants::list_participants),
        )
        .route(
            "/conversations/{conversation_id}/participants/{user_id}",
            axum::routing::delete(participants::remove_participant),
        )
        .route("/messages", post(messages::send_message))
        .route(
            "/messages/{id}",
            get(messages::list_messages)
                .put(messages::update_message)
                .delete(messages::delete_message),
        )
        .route("/attachments", post(attachments::upload_attachment))
        .layer(middleware::from_fn(require_auth))
        .with_state(state.clone());

    // The realtime channel authenticates via its token query parameter inside
    // the session, not via the bearer middleware.
    let ws_route = Router::new()
        .route("/conversations/{conversation_id}/ws", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let chat = state.chat.clone();
    let registry = state.registry.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| {
        session::handle_socket(socket, chat, registry, conversation_id, query.token, jwt_secret)
    })
}

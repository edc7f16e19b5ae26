use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use hearth_api::auth::{self, AppState, AppStateInner};
use hearth_api::membership;
use hearth_api::messages;
use hearth_api::middleware::require_auth;
use hearth_api::receipts;
use hearth_api::threads;
use hearth_api::typing;
use hearth_api::unread;
use hearth_gateway::connection;
use hearth_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    app: AppState,
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("HEARTH_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("HEARTH_DB_PATH").unwrap_or_else(|_| "hearth.db".into());
    let host = std::env::var("HEARTH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HEARTH_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(hearth_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    let state = ServerState {
        app: app_state.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/families", post(membership::create_family))
        .route("/families/{family_id}/members", post(membership::add_member))
        .route("/families/{family_id}/membership", get(membership::get_membership))
        .route("/families/{family_id}/threads", get(threads::list_threads))
        .route("/families/{family_id}/threads/direct", post(threads::open_direct_thread))
        .route("/families/{family_id}/threads/family-channel", post(threads::open_family_channel))
        .route("/families/{family_id}/threads/group", post(threads::create_group_chat))
        .route("/families/{family_id}/unread", get(unread::compute_unread))
        .route("/threads/{thread_id}/messages", get(messages::get_history))
        .route("/threads/{thread_id}/messages", post(messages::send_message))
        .route("/threads/{thread_id}/receipts", get(receipts::thread_receipts))
        .route("/threads/{thread_id}/typing", get(typing::list_typing))
        .route("/threads/{thread_id}/typing", post(typing::set_typing))
        .route("/threads/{thread_id}/typing", delete(typing::clear_typing))
        .route("/messages/{message_id}/read", post(receipts::mark_read))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Hearth server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let db = state.app.db.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, db, state.jwt_secret)
    })
}

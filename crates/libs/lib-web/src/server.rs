//! # Server Setup
//!
//! Server initialization, route registration, and HTTP server startup.
//!
//! [`start_server`] wires the configuration, the SQLite store, the message
//! cipher and the moderator into one [`ChatService`], starts the request
//! sweeper, and serves the router built by [`create_router`].

// region: --- Imports
use crate::chat::{
    spawn_sweeper, ChatAppState, ChatService, ChatSettings, HttpModerator, MessageModerator, NoopModerator,
    SystemClock,
};
use crate::handlers;
use crate::middleware::{require_auth, stamp_req, RequestStamp};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use lib_auth::{JwtVerifier, MessageCipher};
use lib_core::config::init_config;
use lib_core::create_pool;
use lib_core::model::store::{migrate, SqliteStore};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
// endregion: --- Imports

// region: --- Server Configuration
/// Listener and CORS settings. Everything else comes from the environment
/// through [`lib_core::Config`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:3001")
    pub bind_address: String,
    /// Allowed CORS origins
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3001".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}
// endregion: --- Server Configuration

// region: --- Server Setup
/// Initialize and start the chat server.
///
/// # Errors
///
/// This function will return an error if:
/// - Configuration loading or validation fails
/// - The database cannot be opened or migrated
/// - `MESSAGE_KEY` is not a valid AES-256 key
/// - The moderator client cannot be built
/// - Server binding fails
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global tracing subscriber: {}", e))?;

    info!(" PAIRCHAT SERVER STARTING");
    info!(" Log level: {}", log_level);

    info!("Loading configuration...");
    let app_config = init_config().map_err(anyhow::Error::msg)?;

    info!("Database URL: {}", app_config.database_url);
    ensure_sqlite_dir(&app_config.database_url)?;

    info!("Connecting to database...");
    let pool = create_pool(&app_config.database_url).await?;
    migrate(&pool).await?;
    info!(" Migrations complete");

    let store = Arc::new(SqliteStore::new(pool));
    let cipher = MessageCipher::from_base64(&app_config.message_key)?;

    let moderator: Arc<dyn MessageModerator> = match &app_config.moderator_url {
        Some(url) => {
            info!(" Moderation service: {} (timeout {}ms)", url, app_config.moderator_timeout_ms);
            Arc::new(HttpModerator::new(url.clone(), app_config.moderator_timeout())?)
        }
        None => {
            info!(" Moderation disabled (MODERATOR_URL not set)");
            Arc::new(NoopModerator)
        }
    };

    let clock = Arc::new(SystemClock);
    let service = Arc::new(ChatService::new(
        ChatSettings::from_config(app_config),
        store.clone(),
        store,
        moderator,
        cipher,
        clock.clone(),
    ));

    let _sweeper = spawn_sweeper(service.broker().clone(), clock, app_config.sweep_interval());
    info!(
        " Request sweeper started (every {}s, ttl {}s)",
        app_config.sweep_interval_secs,
        app_config.chat_request_ttl_secs
    );

    let state = ChatAppState::new(service, Arc::new(JwtVerifier::new(app_config.jwt_secret.clone())));
    let app = create_router(state, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    info!(" SERVER READY: http://{}", config.bind_address);
    log_server_info();

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the parent directory of a file-backed SQLite URL.
fn ensure_sqlite_dir(database_url: &str) -> anyhow::Result<()> {
    let Some(rest) = database_url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let db_path = rest.trim_start_matches("//");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    if db_path.is_empty() || db_path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created database directory: {:?}", parent);
        }
    }
    info!("Database file will be at: {}", db_path);
    Ok(())
}

/// Create the application router.
pub fn create_router(state: ChatAppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let protected = Router::new()
        .route("/api/users", get(handlers::users::list_users))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    info!("[ROUTE SETUP] Registering HTTP routes...");
    Router::new()
        .route("/api/ws/chat", get(handlers::websocket::chat_websocket))
        .route("/health", get(|| async { "OK" }))
        .merge(protected)
        .fallback(|| async { (StatusCode::NOT_FOUND, "Route not found") })
        .with_state(state)
        .layer(
            // The query string is left out of spans: the chat route carries a token there.
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .extensions()
                    .get::<RequestStamp>()
                    .map(|s| s.id.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(axum::middleware::from_fn(stamp_req))
        .layer(cors)
}

fn log_server_info() {
    info!(" CHAT:");
    info!("   • GET  /api/ws/chat?token={{jwt}}  (WebSocket)");
    info!(" USERS:");
    info!("   • GET  /api/users  (Authorization: Bearer {{jwt}})");
    info!(" HEALTH:");
    info!("   • GET  /health");
}
// endregion: --- Server Setup

// region: --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ConnectionHandle, ManualClock};
    use axum::body::Body;
    use lib_auth::encode_jwt;
    use lib_core::dto::UsersResponse;
    use lib_core::model::store::memory_pool;
    use lib_core::UserStatus;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret-key-must-be-at-least-32-characters-long!";

    async fn test_state() -> ChatAppState {
        let pool = memory_pool().await.expect("Failed to create test database");
        let store = Arc::new(SqliteStore::new(pool));
        let service = Arc::new(ChatService::new(
            ChatSettings::default(),
            store.clone(),
            store,
            Arc::new(NoopModerator),
            MessageCipher::new(&[7u8; 32]).expect("valid test key"),
            Arc::new(ManualClock::default()),
        ));
        ChatAppState::new(service, Arc::new(JwtVerifier::new(SECRET)))
    }

    fn test_app(state: ChatAppState) -> Router {
        create_router(state, &ServerConfig::default().allowed_origins)
    }

    fn token_for(username: &str) -> String {
        encode_jwt(username, SECRET, 1).expect("token")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(crate::middleware::REQUEST_ID_HEADER));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_users_requires_token() {
        // Arrange
        let app = test_app(test_state().await);

        // Act
        let response = app
            .oneshot(Request::builder().uri("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["code"], "Unauthenticated");
    }

    #[tokio::test]
    async fn test_users_rejects_bad_token() {
        let app = test_app(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header("authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_users_lists_others_with_live_status() {
        // Arrange
        let state = test_state().await;
        let service = state.service.clone();
        let (bob, _bob_rx) = ConnectionHandle::new();
        service.connect("bob", bob).await;
        let (alice, _alice_rx) = ConnectionHandle::new();
        service.connect("alice", alice).await;
        service.update_status("bob", "busy").await.unwrap();
        let app = test_app(state);

        // Act
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header("authorization", format!("Bearer {}", token_for("alice")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let users: UsersResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(users.users.len(), 1);
        assert_eq!(users.users[0].username, "bob");
        assert_eq!(users.users[0].status, UserStatus::Busy);
    }

    #[tokio::test]
    async fn test_users_includes_offline_directory_entries() {
        let state = test_state().await;
        let (carol, _carol_rx) = ConnectionHandle::new();
        state.service.connect("carol", carol.clone()).await;
        state.service.disconnect("carol", carol.id()).await;

        let response = test_app(state)
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header("authorization", format!("Bearer {}", token_for("dave")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["users"][0]["username"], "carol");
        assert_eq!(json["users"][0]["status"], "offline");
    }

    #[tokio::test]
    async fn test_chat_socket_rejects_missing_token() {
        let app = test_app(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/api/ws/chat").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_socket_rejects_bad_token() {
        let app = test_app(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/ws/chat?token=garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_socket_valid_token_still_needs_upgrade() {
        let app = test_app(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/ws/chat?token={}", token_for("alice")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = test_app(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_sqlite_dir_skips_memory_urls() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://localhost/db").is_ok());
    }
}
// endregion: --- Tests

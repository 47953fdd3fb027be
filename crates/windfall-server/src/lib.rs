//! Windfall Web Server
//!
//! Axum-based REST API for the Windfall reconciliation pipeline.
//!
//! Surfaces:
//! - `/webhook/board` - inbound status-change events from the approval board
//!   (unauthenticated: the board cannot hold credentials, and every event is
//!   audit-logged and idempotent)
//! - `/api/*` - operator surface behind API-key auth: pending items, rules,
//!   poller settings, scan trigger, audit log, health
//!
//! The background poller (see `poller`) runs alongside the request handlers
//! on the same runtime.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use windfall_core::ai::{ExtractorBackend, ExtractorClient};
use windfall_core::approval::ApprovalEngine;
use windfall_core::board::BoardClient;
use windfall_core::db::Database;
use windfall_core::mailbox::MailboxClient;
use windfall_core::pipeline::{IngestPipeline, PipelineConfig};
use windfall_core::wallet::WalletClient;

mod handlers;
mod poller;

pub use poller::{Poller, CYCLE_TIMEOUT};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header carrying the acting operator's identity on admin requests
const OPERATOR_HEADER: &str = "x-operator-email";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys for operator authentication
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

impl ServerConfig {
    /// Read API keys from WINDFALL_API_KEYS (comma separated)
    pub fn from_env() -> Self {
        let api_keys = std::env::var("WINDFALL_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            api_keys,
            ..Default::default()
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Full ingestion pipeline; None when no extractor backend is configured
    pub pipeline: Option<IngestPipeline>,
    /// Approval engine shared by the webhook and the admin surface
    pub approval: ApprovalEngine,
    pub extractor: Option<ExtractorClient>,
    pub mailbox: Option<MailboxClient>,
}

/// Authentication middleware - validates API keys with constant-time comparison
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Constant-time API key comparison to prevent timing attacks
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided = provided.as_bytes();
    let mut valid = false;
    for key in valid_keys {
        let key = key.as_bytes();
        if key.len() == provided.len() && bool::from(key.ct_eq(provided)) {
            valid = true;
        }
    }
    valid
}

/// Acting operator identity for audit/actor fields
pub(crate) fn operator_identity(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("admin")
        .to_string()
}

/// Create the application router with clients from the environment
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    let extractor = ExtractorClient::from_env();
    match extractor {
        Some(ref client) => info!(
            "Extractor backend configured: {} (model: {})",
            client.host(),
            client.model()
        ),
        None => info!("Extractor backend not configured (set OLLAMA_HOST to enable scanning)"),
    }

    let mailbox = MailboxClient::from_env();
    if mailbox.is_none() {
        info!("Mailbox not configured (set GMAIL_API_TOKEN to enable scanning)");
    }

    let board = BoardClient::from_env();
    if board.is_none() {
        info!("Approval board not configured (set MONDAY_API_TOKEN and MONDAY_BOARD_ID)");
    }

    let wallet = WalletClient::from_env();
    if wallet.is_none() {
        warn!("Wallet ledger not configured (set WALLET_API_URL) - approvals will not credit");
    }

    create_router_with_clients(db, config, extractor, mailbox, board, wallet)
}

/// Create the application router with injected clients (for testing)
pub fn create_router_with_clients(
    db: Database,
    config: ServerConfig,
    extractor: Option<ExtractorClient>,
    mailbox: Option<MailboxClient>,
    board: Option<BoardClient>,
    wallet: Option<WalletClient>,
) -> Router {
    let approval = ApprovalEngine::new(db.clone(), wallet.clone(), board.clone());
    let pipeline = extractor.clone().map(|extractor| {
        IngestPipeline::new(
            db.clone(),
            extractor,
            board.clone(),
            wallet.clone(),
            PipelineConfig::default(),
        )
    });

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        pipeline,
        approval,
        extractor,
        mailbox,
    });

    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::get_health))
        // Pending topups
        .route(
            "/pending",
            get(handlers::list_pending).post(handlers::create_pending),
        )
        .route("/pending/:id", get(handlers::get_pending))
        .route("/pending/:id/approve", post(handlers::approve_pending))
        .route("/pending/:id/reject", post(handlers::reject_pending))
        .route("/pending/:id/retry-credit", post(handlers::retry_credit))
        // Rules
        .route(
            "/rules",
            get(handlers::get_rules).put(handlers::update_rules),
        )
        // Poller
        .route(
            "/poller",
            get(handlers::get_poller_settings).put(handlers::update_poller_settings),
        )
        .route("/poller/scan", post(handlers::trigger_scan))
        // Audit log
        .route("/audit", get(handlers::list_audit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        // The board cannot authenticate; this route is exempt from auth and
        // every event is audit-logged
        .route("/webhook/board", post(handlers::board_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server and, when configured, the background poller
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    }

    // Clients are built twice (router + poller) from the same env on purpose:
    // both ends stay independently constructible in tests
    let poller = match (ExtractorClient::from_env(), MailboxClient::from_env()) {
        (Some(extractor), Some(mailbox)) => {
            let pipeline = IngestPipeline::new(
                db.clone(),
                extractor,
                BoardClient::from_env(),
                WalletClient::from_env(),
                PipelineConfig::default(),
            );
            Some(Poller::start(db.clone(), pipeline, mailbox))
        }
        _ => {
            info!("Poller not started (extractor or mailbox not configured)");
            None
        }
    };

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(poller) = poller {
        info!("Shutting down poller...");
        poller.stop().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

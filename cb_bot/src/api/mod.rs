//! Admin HTTP API for the Blackjack bot.
//!
//! # Modules
//!
//! - [`admin`]: balance rating and top-ups
//! - [`middleware`]: admin token check for protected endpoints
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                         - Health check (public)
//! GET  /api/v1/money_rating            - Players by balance (admin)
//! PUT  /api/v1/give_money              - Top up a balance (admin)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use cb_bot::api::{AppState, create_router};
//! use chat_blackjack::db::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(Arc::new(MemoryStore::default()), None, 3);
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod middleware;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
};
use chat_blackjack::db::GameStore;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// State shared by every handler
pub struct AppState<S: GameStore> {
    pub store: Arc<S>,
    /// Hex SHA-256 digest of the admin token
    pub admin_token_sha256: Option<String>,
    pub num_workers: usize,
}

impl<S: GameStore> AppState<S> {
    pub fn new(store: Arc<S>, admin_token_sha256: Option<String>, num_workers: usize) -> Self {
        Self {
            store,
            admin_token_sha256,
            num_workers,
        }
    }
}

impl<S: GameStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            admin_token_sha256: self.admin_token_sha256.clone(),
            num_workers: self.num_workers,
        }
    }
}

/// Create the API router with all endpoints and middleware.
pub fn create_router<S: GameStore>(state: AppState<S>) -> Router {
    let v1_routes = Router::new()
        .route("/money_rating", get(admin::money_rating::<S>))
        .route("/give_money", put(admin::give_money::<S>))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth::<S>,
        ));

    Router::new()
        .route("/health", get(health_check::<S>))
        .nest("/api/v1", v1_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Health check endpoint for monitoring.
///
/// Returns `200 OK` when the store answers a query, `503 Service Unavailable`
/// otherwise.
async fn health_check<S: GameStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let store_healthy = state.store.money_rating(None, Some(1)).await.is_ok();

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "workers": state.num_workers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

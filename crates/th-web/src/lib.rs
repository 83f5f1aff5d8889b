//! th-web: HTTP boundary for wallet transaction analysis
//!
//! `POST /api/transactions` fetches a page of an address's transactions and
//! returns each with its classification and metadata-resolved token changes.

pub mod api;
pub mod error;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use trade_history::{Analyzer, TransactionSource};

pub use error::ApiError;

/// Shared handler state. The analyzer owns the process-wide metadata cache.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn TransactionSource>,
    pub analyzer: Arc<Analyzer>,
}

impl AppState {
    pub fn new(source: Arc<dyn TransactionSource>, analyzer: Arc<Analyzer>) -> Self {
        Self { source, analyzer }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/transactions",
            post(api::transactions).fallback(api::method_not_allowed),
        )
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

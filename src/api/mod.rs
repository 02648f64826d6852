//! HTTP API for the points service
//!
//! This module provides a RESTful API for:
//! - User registration, login, and LINE auto-login
//! - Recording payments and reading point balances
//! - Seller receipt submission
//! - The admin console (pending receipts, manual and bulk reconciliation,
//!   seller earnings, paginated ledger listings)

use crate::{PointsApp, PointsError};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

mod admin;
mod health;
mod payments;
mod receipts;
mod users;

pub use admin::*;
pub use health::*;
pub use payments::*;
pub use receipts::*;
pub use users::*;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// The points application
    pub app: PointsApp,
}

/// Build the API router
fn build_router(app: PointsApp) -> Router {
    let state = ApiState { app };

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Account endpoints
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/line/auto-login", post(line_auto_login))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/paypay-id", post(set_paypay_id))
        .route("/api/users/:id/line-id", post(set_line_id))
        // Points endpoints
        .route("/api/users/:id/points", get(get_points))
        .route(
            "/api/users/:id/payments",
            get(payment_history).post(record_payment),
        )
        // Payment deep-link endpoints
        .route("/api/payments/link", post(create_payment_link))
        .route(
            "/api/payments/:merchant_payment_id",
            get(payment_link_status),
        )
        .route(
            "/api/payments/:merchant_payment_id/complete",
            post(complete_payment),
        )
        // Seller endpoints
        .route("/api/seller/receipts", post(submit_receipt))
        // Admin endpoints
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/pending-receipts", get(pending_receipts))
        .route("/api/admin/receipts/:id/process", post(process_receipt))
        .route("/api/admin/receipts/bulk-process", post(bulk_process))
        .route("/api/admin/sellers/:id/earnings", get(seller_earnings))
        .route(
            "/api/admin/sellers/:id/transactions",
            get(seller_transactions),
        )
        .route("/api/admin/payments", get(list_payments))
        .route("/api/admin/receipts", get(list_receipts))
        // Add state
        .with_state(state)
}

/// Start the HTTP API server
pub async fn serve(app: PointsApp) -> anyhow::Result<()> {
    serve_with_shutdown(app, tokio::sync::oneshot::channel().1).await
}

/// Start the HTTP API server with graceful shutdown
pub async fn serve_with_shutdown(
    app: PointsApp,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let config = app.config.clone();

    // Build the router
    let router = build_router(app);

    // Add CORS if enabled
    let router = if config.server.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    // Parse bind address
    let addr: std::net::SocketAddr = config
        .server
        .bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    info!("Starting HTTP API server on {}", addr);

    // Start the server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
            info!("Received shutdown signal, stopping API server...");
        })
        .await?;

    info!("API server stopped gracefully");
    Ok(())
}

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (only present if success is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (only present if success is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Convert PointsError to HTTP status code
pub fn error_to_status_code(err: &PointsError) -> StatusCode {
    match err {
        PointsError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        PointsError::DuplicateName(_)
        | PointsError::AlreadyProcessed(_)
        | PointsError::AlreadyCompleted(_) => StatusCode::CONFLICT,
        PointsError::BuyerNotFound(_)
        | PointsError::ReceiptNotFound(_)
        | PointsError::UserNotFound(_)
        | PointsError::CorrelationNotFound(_) => StatusCode::NOT_FOUND,
        PointsError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        PointsError::Database(_) | PointsError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    /// Page number (1-based)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// Paginated response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items for this page
    pub items: Vec<T>,
    /// Total number of items
    pub total: u64,
    /// Current page
    pub page: u32,
    /// Items per page
    pub per_page: u32,
    /// Total pages
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    /// Create a paginated response
    pub fn new(items: Vec<T>, total: u64, page: u32, per_page: u32) -> Self {
        let total_pages = ((total as f64) / (per_page as f64)).ceil() as u32;
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

//! Payment deep-link endpoints
//!
//! Link creation persists a correlation row before the deep link is handed
//! out; completion credits the ledger through that row, exactly once.

use super::{error_to_status_code, ApiResponse, ApiState};
use crate::db::{ExternalPaymentQueries, UserQueries};
use crate::paypay::PayPayService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::info;

/// Payment-link creation request
#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    /// Paying user
    pub user_id: i64,
    /// Amount in yen, must be positive
    pub amount: i64,
}

/// Create a payment deep link
pub async fn create_payment_link(
    State(state): State<ApiState>,
    Json(req): Json<CreateLinkRequest>,
) -> impl IntoResponse {
    info!(
        "API: Create payment link: user_id={}, amount={}",
        req.user_id, req.amount
    );

    let service = PayPayService::new(state.app.config.clone(), state.app.db.clone());
    match service.create_payment_link(req.user_id, req.amount).await {
        Ok(link) => (StatusCode::OK, Json(ApiResponse::success(link))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Get the status of a payment link
pub async fn payment_link_status(
    State(state): State<ApiState>,
    Path(merchant_payment_id): Path<String>,
) -> impl IntoResponse {
    match ExternalPaymentQueries::new(&state.app.db)
        .get(&merchant_payment_id)
        .await
    {
        Ok(Some(correlation)) => (StatusCode::OK, Json(ApiResponse::success(correlation))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!(
                "Payment correlation not found: {merchant_payment_id}"
            ))),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Confirm a payment link and credit the buyer's points
pub async fn complete_payment(
    State(state): State<ApiState>,
    Path(merchant_payment_id): Path<String>,
) -> impl IntoResponse {
    info!(
        "API: Complete payment: merchant_payment_id={}",
        merchant_payment_id
    );

    let service = PayPayService::new(state.app.config.clone(), state.app.db.clone());
    match service.complete_payment(&merchant_payment_id).await {
        Ok(payment) => {
            // Balance-update push is best-effort; a missing user row only
            // skips the notification.
            if let Ok(Some(user)) = UserQueries::new(&state.app.db).get(payment.buyer_id).await {
                state.app.notifier.payment_recorded(&user, &payment);
            }
            (StatusCode::OK, Json(ApiResponse::success(payment)))
        }
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

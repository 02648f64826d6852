//! Seller receipt endpoints

use super::{error_to_status_code, ApiResponse, ApiState};
use crate::db::ReceiptModel;
use crate::points::{BuyerRef, SubmissionResult};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Receipt submission request
///
/// The buyer may be named (`buyer_name`, resolved here) or referenced
/// directly (`buyer_id`, already resolved by the identity collaborator);
/// both absent means the receipt goes straight to the admin queue.
#[derive(Debug, Deserialize)]
pub struct SubmitReceiptRequest {
    /// Seller reporting the received payment
    pub seller_id: i64,
    /// Amount in yen, must be positive
    pub amount: i64,
    /// Buyer display name, if the seller typed one
    pub buyer_name: Option<String>,
    /// Resolved buyer ID, if the caller already knows it
    pub buyer_id: Option<i64>,
    /// Free-form memo
    pub memo: Option<String>,
}

/// Receipt submission response
#[derive(Debug, Serialize)]
pub struct SubmitReceiptResponse {
    /// The receipt as stored, PROCESSED when auto-matched
    pub receipt: ReceiptModel,
    /// Whether the receipt was reconciled during submission
    pub auto_matched: bool,
}

/// Submit a seller receipt
pub async fn submit_receipt(
    State(state): State<ApiState>,
    Json(req): Json<SubmitReceiptRequest>,
) -> impl IntoResponse {
    info!(
        "API: Receipt submission from seller_id={}: amount={}, buyer_name={:?}, buyer_id={:?}",
        req.seller_id, req.amount, req.buyer_name, req.buyer_id
    );

    let buyer = match (req.buyer_id, req.buyer_name.as_deref()) {
        (Some(id), _) => Some(BuyerRef::Id(id)),
        (None, Some(name)) if !name.trim().is_empty() => {
            Some(BuyerRef::Name(name.trim().to_string()))
        }
        _ => None,
    };

    match state
        .app
        .points
        .matcher
        .submit_receipt(req.seller_id, req.amount, buyer, req.memo.as_deref())
        .await
    {
        Ok(result) => {
            let auto_matched = matches!(result, SubmissionResult::Processed { .. });
            let receipt = result.receipt().clone();
            (
                StatusCode::OK,
                Json(ApiResponse::success(SubmitReceiptResponse {
                    receipt,
                    auto_matched,
                })),
            )
        }
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

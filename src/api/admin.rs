//! Admin console endpoints
//!
//! The admin console lists the reconciliation backlog, resolves pending
//! receipts to buyers, and reviews the full ledger. Authentication is left
//! to the deployment perimeter.

use super::{error_to_status_code, ApiResponse, ApiState, PaginatedResponse, PaginationParams};
use crate::analysis::{match_candidates, CandidateTransaction};
use crate::db::{
    PaymentModel, PaymentQueries, ReceiptModel, ReceiptQueries, UserModel, UserQueries,
};
use crate::points::BatchSummary;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// List all users, for the buyer-selection dropdown
pub async fn list_users(State(state): State<ApiState>) -> impl IntoResponse {
    match UserQueries::new(&state.app.db).list_all().await {
        Ok(users) => (StatusCode::OK, Json(ApiResponse::success(users))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (
                status,
                Json(ApiResponse::<Vec<UserModel>>::error(e.to_string())),
            )
        }
    }
}

/// List receipts awaiting manual reconciliation, oldest first
pub async fn pending_receipts(State(state): State<ApiState>) -> impl IntoResponse {
    match ReceiptQueries::new(&state.app.db).list_pending().await {
        Ok(receipts) => (StatusCode::OK, Json(ApiResponse::success(receipts))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Manual reconciliation request
#[derive(Debug, Deserialize)]
pub struct ProcessReceiptRequest {
    /// Buyer chosen from the user list
    pub buyer_id: i64,
}

/// Reconcile one pending receipt to a buyer
pub async fn process_receipt(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(req): Json<ProcessReceiptRequest>,
) -> impl IntoResponse {
    info!(
        "API: Process receipt: receipt_id={}, buyer_id={}",
        id, req.buyer_id
    );

    match state.app.points.reconcile.process(id, req.buyer_id).await {
        Ok(payment) => {
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

/// Bulk reconciliation request: candidates from screenshot analysis
#[derive(Debug, Deserialize)]
pub struct BulkProcessRequest {
    /// Candidate transactions extracted from an uploaded screenshot
    pub candidates: Vec<CandidateTransaction>,
}

/// Bulk reconciliation response
#[derive(Debug, Serialize)]
pub struct BulkProcessResponse {
    /// Number of candidates that credited points
    pub success_count: usize,
    /// Number of candidates that failed, each tagged in the summary
    pub failure_count: usize,
    /// Per-item outcomes
    pub summary: BatchSummary,
}

/// Reconcile a batch of screenshot candidates
///
/// Candidates are matched to users by sender name and to pending receipts
/// by amount; per-item failures are reported, never escalated to a batch
/// abort.
pub async fn bulk_process(
    State(state): State<ApiState>,
    Json(req): Json<BulkProcessRequest>,
) -> impl IntoResponse {
    info!(
        "API: Bulk reconciliation of {} candidate(s)",
        req.candidates.len()
    );

    let items = match match_candidates(&state.app.db, &req.candidates).await {
        Ok(items) => items,
        Err(e) => {
            let status = error_to_status_code(&e);
            return (status, Json(ApiResponse::error(e.to_string())));
        }
    };

    let summary = state.app.points.reconcile.process_batch(items).await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(BulkProcessResponse {
            success_count: summary.succeeded.len(),
            failure_count: summary.failed.len(),
            summary,
        })),
    )
}

/// Seller earnings response
#[derive(Debug, Serialize)]
pub struct SellerEarningsResponse {
    /// Sum of all payments received by the seller, in yen
    pub total_earnings: i64,
    /// Number of payments received
    pub transaction_count: i64,
}

/// Get a seller's cumulative earnings
pub async fn seller_earnings(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match PaymentQueries::new(&state.app.db).seller_earnings(id).await {
        Ok((total_earnings, transaction_count)) => (
            StatusCode::OK,
            Json(ApiResponse::success(SellerEarningsResponse {
                total_earnings,
                transaction_count,
            })),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Transaction-list query parameters
#[derive(Debug, Deserialize)]
pub struct TransactionParams {
    /// Maximum number of entries to return
    #[serde(default = "default_transaction_limit")]
    pub limit: u32,
}

fn default_transaction_limit() -> u32 {
    50
}

/// Get a seller's received payments with buyer names, most recent first
pub async fn seller_transactions(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<TransactionParams>,
) -> impl IntoResponse {
    match PaymentQueries::new(&state.app.db)
        .seller_transactions(id, params.limit)
        .await
    {
        Ok(transactions) => (StatusCode::OK, Json(ApiResponse::success(transactions))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Paginated ledger listing
pub async fn list_payments(
    State(state): State<ApiState>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let queries = PaymentQueries::new(&state.app.db);
    let result = async {
        let items = queries.list_page(params.page, params.per_page).await?;
        let total = queries.count().await?;
        Ok::<_, crate::PointsError>(PaginatedResponse::new(
            items,
            total,
            params.page,
            params.per_page,
        ))
    }
    .await;

    match result {
        Ok(page) => (StatusCode::OK, Json(ApiResponse::success(page))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (
                status,
                Json(ApiResponse::<PaginatedResponse<PaymentModel>>::error(
                    e.to_string(),
                )),
            )
        }
    }
}

/// Paginated receipt listing
pub async fn list_receipts(
    State(state): State<ApiState>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let queries = ReceiptQueries::new(&state.app.db);
    let result = async {
        let items = queries.list_page(params.page, params.per_page).await?;
        let total = queries.count().await?;
        Ok::<_, crate::PointsError>(PaginatedResponse::new(
            items,
            total,
            params.page,
            params.per_page,
        ))
    }
    .await;

    match result {
        Ok(page) => (StatusCode::OK, Json(ApiResponse::success(page))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (
                status,
                Json(ApiResponse::<PaginatedResponse<ReceiptModel>>::error(
                    e.to_string(),
                )),
            )
        }
    }
}

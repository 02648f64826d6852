//! Account and points endpoints

use super::{error_to_status_code, ApiResponse, ApiState};
use crate::db::{PaymentModel, UserQueries};
use crate::paypay::{seller_payment_url, transfer_deep_link};
use crate::points::PointsBalance;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Desired unique display name
    pub username: String,
    /// Plaintext password, hashed here at the edge
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Display name
    pub username: String,
    /// Plaintext password
    pub password: String,
}

/// LINE auto-login request
#[derive(Debug, Deserialize)]
pub struct AutoLoginRequest {
    /// LINE user ID supplied by the messaging platform
    pub line_user_id: String,
}

/// Account response
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID
    pub user_id: i64,
    /// Display name
    pub username: String,
}

/// User info response
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// User ID
    pub id: i64,
    /// Display name
    pub username: String,
    /// PayPay handle, if the admin console stored one
    pub paypay_id: Option<String>,
    /// Creation time (ISO 8601)
    pub created_at: String,
}

/// Register a new user
pub async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    info!("API: Register request for username={}", req.username);

    if req.username.trim().is_empty() || req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Username and password are required")),
        );
    }

    let password_hash = match bcrypt::hash(&req.password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to hash password: {e}"))),
            );
        }
    };

    let username = req.username.trim();
    match UserQueries::new(&state.app.db)
        .create(username, Some(&password_hash))
        .await
    {
        Ok(user_id) => (
            StatusCode::OK,
            Json(ApiResponse::success(AccountResponse {
                user_id,
                username: username.to_string(),
            })),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Log in with username and password
pub async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    info!("API: Login request for username={}", req.username);

    let material = match UserQueries::new(&state.app.db)
        .get_login_material(&req.username)
        .await
    {
        Ok(material) => material,
        Err(e) => {
            let status = error_to_status_code(&e);
            return (status, Json(ApiResponse::error(e.to_string())));
        }
    };

    match material {
        Some((user, Some(hash))) if bcrypt::verify(&req.password, &hash).unwrap_or(false) => (
            StatusCode::OK,
            Json(ApiResponse::success(AccountResponse {
                user_id: user.id,
                username: user.username,
            })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid username or password")),
        ),
    }
}

/// Log in (or register on first contact) with a LINE identity
pub async fn line_auto_login(
    State(state): State<ApiState>,
    Json(req): Json<AutoLoginRequest>,
) -> impl IntoResponse {
    info!(
        "API: LINE auto-login request for line_user_id={}",
        req.line_user_id
    );

    if req.line_user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("LINE user ID is required")),
        );
    }

    match UserQueries::new(&state.app.db)
        .get_or_create_by_line_id(req.line_user_id.trim())
        .await
    {
        Ok(user) => (
            StatusCode::OK,
            Json(ApiResponse::success(AccountResponse {
                user_id: user.id,
                username: user.username,
            })),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Get user info
pub async fn get_user(State(state): State<ApiState>, Path(id): Path<i64>) -> impl IntoResponse {
    match UserQueries::new(&state.app.db).get(id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(ApiResponse::success(UserResponse {
                id: user.id,
                username: user.username,
                paypay_id: user.paypay_id,
                created_at: user.created_at.to_rfc3339(),
            })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("User not found: id={id}"))),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Set-PayPay-handle request
#[derive(Debug, Deserialize)]
pub struct SetPayPayIdRequest {
    /// Phone number or PayPay ID
    pub paypay_id: String,
}

/// PayPay handle response
#[derive(Debug, Serialize)]
pub struct PayPayIdResponse {
    /// User ID
    pub user_id: i64,
    /// Stored handle
    pub paypay_id: String,
    /// Personal-transfer deep link for this handle
    pub transfer_link: String,
    /// Payment-page URL to encode in the seller's printed QR code
    pub payment_url: String,
}

/// Store a user's PayPay handle
pub async fn set_paypay_id(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(req): Json<SetPayPayIdRequest>,
) -> impl IntoResponse {
    info!("API: Set PayPay handle for user_id={}", id);

    let handle = req.paypay_id.trim();
    if handle.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("PayPay handle is required")),
        );
    }

    match UserQueries::new(&state.app.db).set_paypay_id(id, handle).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(PayPayIdResponse {
                user_id: id,
                paypay_id: handle.to_string(),
                transfer_link: transfer_deep_link(handle),
                payment_url: seller_payment_url(&state.app.config.paypay.app_url, id),
            })),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Link-LINE-identity request
#[derive(Debug, Deserialize)]
pub struct SetLineIdRequest {
    /// LINE user ID to link to this account
    pub line_user_id: String,
}

/// Link a LINE identity to an existing user
pub async fn set_line_id(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(req): Json<SetLineIdRequest>,
) -> impl IntoResponse {
    info!("API: Link LINE identity for user_id={}", id);

    let line_user_id = req.line_user_id.trim();
    if line_user_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("LINE user ID is required")),
        );
    }

    let users = UserQueries::new(&state.app.db);
    let result = async {
        users.set_line_user_id(id, line_user_id).await?;
        users.get(id).await
    }
    .await;

    match result {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(ApiResponse::success(AccountResponse {
                user_id: user.id,
                username: user.username,
            })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("User not found: id={id}"))),
        ),
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Get a buyer's point balance
pub async fn get_points(State(state): State<ApiState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.app.points.get_balance(id).await {
        Ok(balance) => (StatusCode::OK, Json(ApiResponse::success(balance))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (
                status,
                Json(ApiResponse::<PointsBalance>::error(e.to_string())),
            )
        }
    }
}

/// History query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Maximum number of entries to return
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

/// Get a buyer's payment history, most recent first
pub async fn payment_history(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    match state.app.points.get_history(id, params.limit).await {
        Ok(payments) => (StatusCode::OK, Json(ApiResponse::success(payments))),
        Err(e) => {
            let status = error_to_status_code(&e);
            (
                status,
                Json(ApiResponse::<Vec<PaymentModel>>::error(e.to_string())),
            )
        }
    }
}

/// Record-payment request
#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    /// Amount in yen, must be positive
    pub amount: i64,
    /// Seller who received the money, if paid through a seller QR code
    pub seller_id: Option<i64>,
}

/// Record a payment for a buyer
pub async fn record_payment(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(req): Json<RecordPaymentRequest>,
) -> impl IntoResponse {
    info!(
        "API: Record payment for user_id={}: amount={}, seller_id={:?}",
        id, req.amount, req.seller_id
    );

    let user = match UserQueries::new(&state.app.db).get(id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(format!("User not found: id={id}"))),
            );
        }
        Err(e) => {
            let status = error_to_status_code(&e);
            return (status, Json(ApiResponse::error(e.to_string())));
        }
    };

    match state
        .app
        .points
        .record_payment(user.id, req.amount, req.seller_id)
        .await
    {
        Ok(payment) => {
            state.app.notifier.payment_recorded(&user, &payment);
            (StatusCode::OK, Json(ApiResponse::success(payment)))
        }
        Err(e) => {
            let status = error_to_status_code(&e);
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserModel {
    /// User ID
    pub id: i64,
    /// Unique display name
    pub username: String,
    /// PayPay handle (phone number or PayPay ID), set by the admin console
    pub paypay_id: Option<String>,
    /// Linked LINE user ID, set at first messaging contact
    pub line_user_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Payment ledger entry
///
/// Immutable once inserted; point balances are always recomputed from these
/// rows, never stored separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentModel {
    /// Payment ID
    pub id: i64,
    /// Buyer credited with the points
    pub buyer_id: i64,
    /// Seller who received the money, if any
    pub seller_id: Option<i64>,
    /// Amount in yen
    pub amount: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Receipt lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    /// Awaiting buyer attribution
    Pending,
    /// Reconciled; terminal
    Processed,
}

impl ReceiptStatus {
    /// Database TEXT representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "PENDING",
            ReceiptStatus::Processed => "PROCESSED",
        }
    }

    /// Parse the database TEXT representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReceiptStatus::Pending),
            "PROCESSED" => Some(ReceiptStatus::Processed),
            _ => None,
        }
    }
}

/// Receipt database model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptModel {
    /// Receipt ID
    pub id: i64,
    /// Seller reporting the received payment
    pub seller_id: i64,
    /// Buyer, once attributed
    pub buyer_id: Option<i64>,
    /// Amount in yen
    pub amount: i64,
    /// Free-form seller memo
    pub memo: Option<String>,
    /// Lifecycle state
    pub status: ReceiptStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Reconciliation time, once processed
    pub processed_at: Option<DateTime<Utc>>,
}

/// External payment correlation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalPaymentStatus {
    /// Link handed out, confirmation not yet received
    Pending,
    /// Confirmed and credited to the ledger; terminal
    Completed,
}

impl ExternalPaymentStatus {
    /// Database TEXT representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalPaymentStatus::Pending => "PENDING",
            ExternalPaymentStatus::Completed => "COMPLETED",
        }
    }

    /// Parse the database TEXT representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ExternalPaymentStatus::Pending),
            "COMPLETED" => Some(ExternalPaymentStatus::Completed),
            _ => None,
        }
    }
}

/// External payment correlation
///
/// Persisted so that an in-flight PayPay deep-link payment survives a server
/// restart between link creation and confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPaymentModel {
    /// Merchant payment ID handed to the payment provider
    pub merchant_payment_id: String,
    /// Paying user
    pub user_id: i64,
    /// Amount in yen
    pub amount: i64,
    /// Correlation state
    pub status: ExternalPaymentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Confirmation time, once completed
    pub completed_at: Option<DateTime<Utc>>,
}

/// A pending receipt joined with its seller's name, for the admin console
#[derive(Debug, Clone, Serialize)]
pub struct PendingReceiptView {
    /// Receipt ID
    pub id: i64,
    /// Seller ID
    pub seller_id: i64,
    /// Seller display name
    pub seller_name: String,
    /// Amount in yen
    pub amount: i64,
    /// Free-form seller memo
    pub memo: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A seller-side ledger entry joined with the buyer's name
#[derive(Debug, Clone, Serialize)]
pub struct SellerTransactionView {
    /// Payment ID
    pub id: i64,
    /// Buyer display name
    pub buyer_name: String,
    /// Amount in yen
    pub amount: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_status_round_trip() {
        for status in [ReceiptStatus::Pending, ReceiptStatus::Processed] {
            assert_eq!(ReceiptStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReceiptStatus::parse("CANCELLED"), None);
    }
}

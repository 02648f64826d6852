//! Reconciliation: the PENDING → PROCESSED transition
//!
//! `process` is the only way a receipt reaches its terminal state, and the
//! underlying store call performs the status check and the ledger insert in
//! one transaction. Callers must treat `AlreadyProcessed` as "already done",
//! not as a retryable failure.

use crate::{
    db::{Database, PaymentModel, ReceiptQueries},
    PointsResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Manual and bulk reconciliation service
#[derive(Clone)]
pub struct ReconcileService {
    db: Arc<Database>,
}

/// One matched candidate handed to the bulk variant
///
/// `receipt_id` and `buyer_id` are `None` when the upstream matching step
/// could not pair the candidate; such items are reported as failures rather
/// than silently dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    /// The pending receipt this candidate settles, if one was found
    pub receipt_id: Option<i64>,
    /// The buyer to credit, if one was matched
    pub buyer_id: Option<i64>,
    /// Candidate amount in yen
    pub amount: i64,
}

/// A successfully reconciled batch item
#[derive(Debug, Clone, Serialize)]
pub struct BatchSuccess {
    /// Processed receipt
    pub receipt_id: i64,
    /// Credited buyer
    pub buyer_id: i64,
    /// Ledger entry created by the transition
    pub payment_id: i64,
    /// Amount in yen
    pub amount: i64,
}

/// A batch item that could not be reconciled, tagged with its cause
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// Receipt the item targeted, if any
    pub receipt_id: Option<i64>,
    /// Amount in yen
    pub amount: i64,
    /// Why the item failed
    pub cause: String,
}

/// Per-item outcome report for a bulk reconciliation
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Items that transitioned a receipt and credited points
    pub succeeded: Vec<BatchSuccess>,
    /// Items that failed, each with its cause
    pub failed: Vec<BatchFailure>,
}

impl ReconcileService {
    /// Create a new reconciliation service
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Transition a receipt PENDING → PROCESSED, crediting the buyer
    ///
    /// Fails with `ReceiptNotFound` for unknown receipts and
    /// `AlreadyProcessed` for terminal ones; exactly one ledger entry is
    /// created on success.
    pub async fn process(&self, receipt_id: i64, buyer_id: i64) -> PointsResult<PaymentModel> {
        let payment = ReceiptQueries::new(&self.db)
            .mark_processed(receipt_id, buyer_id)
            .await?;
        info!(
            "Reconciled receipt {}: buyer_id={}, payment_id={}, amount={}",
            receipt_id, buyer_id, payment.id, payment.amount
        );
        Ok(payment)
    }

    /// Reconcile a batch of matched candidates, isolating per-item failures
    ///
    /// One bad item never aborts the batch; the summary reports every item
    /// either under `succeeded` or under `failed` with a cause.
    pub async fn process_batch(&self, items: Vec<BatchItem>) -> BatchSummary {
        let total = items.len();
        let mut summary = BatchSummary::default();

        for item in items {
            let Some(buyer_id) = item.buyer_id else {
                summary.failed.push(BatchFailure {
                    receipt_id: item.receipt_id,
                    amount: item.amount,
                    cause: "no matched buyer".to_string(),
                });
                continue;
            };

            let Some(receipt_id) = item.receipt_id else {
                summary.failed.push(BatchFailure {
                    receipt_id: None,
                    amount: item.amount,
                    cause: "no matching pending receipt".to_string(),
                });
                continue;
            };

            match self.process(receipt_id, buyer_id).await {
                Ok(payment) => summary.succeeded.push(BatchSuccess {
                    receipt_id,
                    buyer_id,
                    payment_id: payment.id,
                    amount: payment.amount,
                }),
                Err(e) => summary.failed.push(BatchFailure {
                    receipt_id: Some(receipt_id),
                    amount: item.amount,
                    cause: e.to_string(),
                }),
            }
        }

        info!(
            "Bulk reconciliation completed: {} item(s), {} succeeded, {} failed",
            total,
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }
}

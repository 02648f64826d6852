//! Receipt submission and auto-matching
//!
//! A seller's receipt is always created PENDING first. When the submission
//! names a buyer that can be resolved, reconciliation is attempted in the
//! same call; a failed auto-match never rolls the submission back — the
//! receipt simply stays in the admin queue.

use super::ReconcileService;
use crate::{
    db::{Database, PaymentModel, ReceiptModel, ReceiptQueries, UserQueries},
    PointsError, PointsResult,
};
use std::sync::Arc;
use tracing::{info, warn};

/// How the submission identified the buyer, if at all
#[derive(Debug, Clone)]
pub enum BuyerRef {
    /// A resolved user ID, supplied by the identity collaborator
    Id(i64),
    /// A display name typed by the seller, resolved here
    Name(String),
}

/// Outcome of a receipt submission
#[derive(Debug, Clone)]
pub enum SubmissionResult {
    /// The buyer was resolved and the receipt reconciled immediately
    Processed {
        /// The receipt in its terminal state
        receipt: ReceiptModel,
        /// The ledger entry the reconciliation created
        payment: PaymentModel,
    },
    /// The receipt awaits manual reconciliation by an administrator
    Pending(ReceiptModel),
}

impl SubmissionResult {
    /// The receipt in either outcome
    pub fn receipt(&self) -> &ReceiptModel {
        match self {
            SubmissionResult::Processed { receipt, .. } => receipt,
            SubmissionResult::Pending(receipt) => receipt,
        }
    }
}

/// Receipt submission service
#[derive(Clone)]
pub struct MatcherService {
    db: Arc<Database>,
    reconcile: ReconcileService,
}

impl MatcherService {
    /// Create a new matcher
    pub fn new(db: Arc<Database>, reconcile: ReconcileService) -> Self {
        Self { db, reconcile }
    }

    /// Submit a seller receipt, auto-matching when a buyer is identified
    ///
    /// A buyer name that resolves to no user fails the whole submission with
    /// `BuyerNotFound` before anything is written. A resolved buyer whose
    /// reconciliation then fails for any reason leaves the receipt PENDING.
    pub async fn submit_receipt(
        &self,
        seller_id: i64,
        amount: i64,
        buyer: Option<BuyerRef>,
        memo: Option<&str>,
    ) -> PointsResult<SubmissionResult> {
        if amount <= 0 {
            return Err(PointsError::InvalidAmount(amount));
        }

        let buyer_id = match buyer {
            None => None,
            Some(BuyerRef::Id(id)) => Some(id),
            Some(BuyerRef::Name(name)) => {
                let user = UserQueries::new(&self.db).find_by_name(&name).await?;
                match user {
                    Some(user) => Some(user.id),
                    None => return Err(PointsError::BuyerNotFound(name)),
                }
            }
        };

        let receipt = ReceiptQueries::new(&self.db)
            .insert(seller_id, amount, buyer_id, memo)
            .await?;

        let Some(buyer_id) = buyer_id else {
            info!(
                "Receipt {} submitted without a buyer, queued for manual reconciliation",
                receipt.id
            );
            return Ok(SubmissionResult::Pending(receipt));
        };

        match self.reconcile.process(receipt.id, buyer_id).await {
            Ok(payment) => {
                let receipt = ReceiptQueries::new(&self.db)
                    .get_by_id(receipt.id)
                    .await?
                    .ok_or(PointsError::ReceiptNotFound(receipt.id))?;
                Ok(SubmissionResult::Processed { receipt, payment })
            }
            Err(e) => {
                warn!(
                    "Auto-match failed for receipt {} (left pending): {}",
                    receipt.id, e
                );
                Ok(SubmissionResult::Pending(receipt))
            }
        }
    }
}

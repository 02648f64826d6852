//! Points ledger core
//!
//! This module implements the heart of the service:
//! - Balance and history reads over the append-only payment ledger
//! - Receipt submission with auto-matching (`matcher`)
//! - The PENDING → PROCESSED reconciliation state machine (`reconcile`)

use crate::{
    config::Config,
    db::{Database, ExternalPaymentQueries, PaymentModel, PaymentQueries, ReceiptQueries},
    PointsError, PointsResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

mod matcher;
mod reconcile;

pub use matcher::{BuyerRef, MatcherService, SubmissionResult};
pub use reconcile::{BatchFailure, BatchItem, BatchSuccess, BatchSummary, ReconcileService};

/// A buyer's current point standing
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PointsBalance {
    /// Sum of all ledger amounts for the buyer
    pub total_points: i64,
    /// Number of ledger entries for the buyer
    pub payment_count: i64,
}

/// The main points service
pub struct PointsService {
    /// Configuration
    config: Arc<Config>,
    /// Database connection
    db: Arc<Database>,
    /// Receipt submission and auto-matching
    pub matcher: MatcherService,
    /// Manual and bulk reconciliation
    pub reconcile: ReconcileService,
}

impl PointsService {
    /// Create a new points service
    pub fn new(config: Arc<Config>, db: Arc<Database>) -> Self {
        let reconcile = ReconcileService::new(db.clone());
        let matcher = MatcherService::new(db.clone(), reconcile.clone());

        Self {
            config,
            db,
            matcher,
            reconcile,
        }
    }

    /// Startup pass: report the reconciliation backlog and purge stale
    /// external-payment correlations left behind by a previous run
    pub async fn init(&self) -> PointsResult<()> {
        info!("Initializing points service...");

        let pending = ReceiptQueries::new(&self.db).list_pending().await?;
        if pending.is_empty() {
            info!("No pending receipts awaiting reconciliation");
        } else {
            info!(
                "{} pending receipt(s) awaiting manual reconciliation",
                pending.len()
            );
        }

        let expiry = chrono::Duration::minutes(self.config.paypay.link_expiry_minutes as i64);
        let cutoff = chrono::Utc::now() - expiry;
        let purged = ExternalPaymentQueries::new(&self.db)
            .delete_stale(cutoff)
            .await?;
        if purged > 0 {
            info!("Purged {} expired payment link(s) on startup", purged);
        }

        info!("Points service initialized");
        Ok(())
    }

    /// Record a payment directly to the ledger
    ///
    /// Used for buyer-reported payments; receipts go through `matcher` and
    /// `reconcile` instead.
    pub async fn record_payment(
        &self,
        buyer_id: i64,
        amount: i64,
        seller_id: Option<i64>,
    ) -> PointsResult<PaymentModel> {
        if amount <= 0 {
            return Err(PointsError::InvalidAmount(amount));
        }
        PaymentQueries::new(&self.db)
            .insert(buyer_id, amount, seller_id)
            .await
    }

    /// A buyer's current total points and payment count
    ///
    /// Always recomputed from the ledger; zero for buyers with no payments.
    pub async fn get_balance(&self, buyer_id: i64) -> PointsResult<PointsBalance> {
        let (total_points, payment_count) = PaymentQueries::new(&self.db)
            .points_summary(buyer_id)
            .await?;
        Ok(PointsBalance {
            total_points,
            payment_count,
        })
    }

    /// A buyer's payment history, most recent first
    pub async fn get_history(&self, buyer_id: i64, limit: u32) -> PointsResult<Vec<PaymentModel>> {
        PaymentQueries::new(&self.db).history(buyer_id, limit).await
    }
}

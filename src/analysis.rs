//! Screenshot-analysis boundary
//!
//! An external image-understanding service turns a payment-app screenshot
//! into candidate transactions. The matching step here is deliberately
//! simple: resolve the sender name to a user, pair the amount with the
//! oldest equal-amount pending receipt, and hand the result to the bulk
//! reconciliation variant. Anything that cannot be paired is passed through
//! unmatched so the batch report can tag it as a failure.

use crate::{
    db::{Database, ReceiptQueries, UserQueries},
    points::BatchItem,
    PointsResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One transaction extracted from a payment screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTransaction {
    /// Amount in yen
    pub amount: i64,
    /// Sender display name as it appeared in the screenshot
    pub sender_name: Option<String>,
    /// Transaction date text, if the analysis could read one
    pub date: Option<String>,
    /// Free-form memo text
    pub memo: Option<String>,
}

/// Pair screenshot candidates with users and pending receipts
///
/// Each candidate gets at most one receipt, and a receipt already claimed by
/// an earlier candidate in the same batch is not offered again, so two
/// equal-amount candidates settle two distinct receipts.
pub async fn match_candidates(
    db: &Database,
    candidates: &[CandidateTransaction],
) -> PointsResult<Vec<BatchItem>> {
    let users = UserQueries::new(db);
    let receipts = ReceiptQueries::new(db);

    let mut claimed: HashSet<i64> = HashSet::new();
    let mut items = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let buyer_id = match &candidate.sender_name {
            Some(name) => users.find_by_name(name).await?.map(|u| u.id),
            None => None,
        };

        let receipt_id = receipts
            .list_pending_by_amount(candidate.amount)
            .await?
            .into_iter()
            .map(|r| r.id)
            .find(|id| !claimed.contains(id));

        if let Some(id) = receipt_id {
            claimed.insert(id);
        }

        debug!(
            "Matched candidate: amount={}, sender={:?} -> buyer_id={:?}, receipt_id={:?}",
            candidate.amount, candidate.sender_name, buyer_id, receipt_id
        );

        items.push(BatchItem {
            receipt_id,
            buyer_id,
            amount: candidate.amount,
        });
    }

    Ok(items)
}

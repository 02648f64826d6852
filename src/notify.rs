//! Notification collaborator seam
//!
//! After a payment lands in the ledger the messaging bot may push a balance
//! update to the buyer. The ledger path never depends on this succeeding;
//! implementations must swallow their own failures.

use crate::db::{PaymentModel, UserModel};
use tracing::info;

/// Out-of-band notification sink
pub trait Notifier: Send + Sync {
    /// Called after a payment has been committed to the ledger
    fn payment_recorded(&self, user: &UserModel, payment: &PaymentModel);
}

/// Default notifier: logs instead of pushing messages
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn payment_recorded(&self, user: &UserModel, payment: &PaymentModel) {
        info!(
            "Notify: payment recorded for {} (user_id={}): +{} yen",
            user.username, user.id, payment.amount
        );
    }
}

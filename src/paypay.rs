//! PayPay deep-link integration
//!
//! The service never talks to the payment provider's API; it hands out
//! `paypay://` deep links and remembers each one in the persisted
//! `external_payments` table. The buyer confirms completion through the app,
//! which credits the ledger via the correlation — so a restart between link
//! creation and confirmation loses nothing.

use crate::{
    config::Config,
    db::{Database, ExternalPaymentQueries, PaymentModel, UserQueries},
    PointsError, PointsResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Build a personal-transfer deep link for a seller's PayPay handle
///
/// Handles of the form `0` + 9-10 digits are treated as phone numbers; the
/// format is otherwise not interpreted.
pub fn transfer_deep_link(paypay_handle: &str) -> String {
    let is_phone = paypay_handle.len() >= 10
        && paypay_handle.len() <= 11
        && paypay_handle.starts_with('0')
        && paypay_handle.chars().all(|c| c.is_ascii_digit());

    if is_phone {
        format!("paypay://send?phone={paypay_handle}")
    } else {
        format!("paypay://send?id={paypay_handle}")
    }
}

/// Build the payment-page URL embedded in a seller's printed QR code
pub fn seller_payment_url(app_url: &str, seller_id: i64) -> String {
    format!("{}/pay?sellerId={}", app_url.trim_end_matches('/'), seller_id)
}

/// A freshly created payment link
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLink {
    /// Correlation ID to confirm the payment with later
    pub merchant_payment_id: String,
    /// Deep link to open the payment app
    pub link: String,
    /// Amount in yen
    pub amount: i64,
}

/// Payment-link lifecycle over the persisted correlation table
pub struct PayPayService {
    config: Arc<Config>,
    db: Arc<Database>,
}

impl PayPayService {
    /// Create a new PayPay service
    pub fn new(config: Arc<Config>, db: Arc<Database>) -> Self {
        Self { config, db }
    }

    /// Create a payment link for a user and persist its correlation
    pub async fn create_payment_link(&self, user_id: i64, amount: i64) -> PointsResult<PaymentLink> {
        if !self.config.paypay.enabled {
            return Err(PointsError::ExternalService(
                "PayPay integration is not configured".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(PointsError::InvalidAmount(amount));
        }

        let user = UserQueries::new(&self.db)
            .get(user_id)
            .await?
            .ok_or(PointsError::UserNotFound(user_id))?;

        let merchant_payment_id = uuid::Uuid::new_v4().to_string();
        ExternalPaymentQueries::new(&self.db)
            .insert(&merchant_payment_id, user.id, amount)
            .await?;

        info!(
            "Created payment link: merchant_payment_id={}, user_id={}, amount={}",
            merchant_payment_id, user.id, amount
        );

        Ok(PaymentLink {
            merchant_payment_id,
            link: "paypay://payment".to_string(),
            amount,
        })
    }

    /// Confirm a payment link and credit the ledger exactly once
    pub async fn complete_payment(&self, merchant_payment_id: &str) -> PointsResult<PaymentModel> {
        let payment = ExternalPaymentQueries::new(&self.db)
            .complete(merchant_payment_id)
            .await?;
        info!(
            "Completed payment link: merchant_payment_id={}, payment_id={}",
            merchant_payment_id, payment.id
        );
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_deep_link_phone() {
        assert_eq!(
            transfer_deep_link("09012345678"),
            "paypay://send?phone=09012345678"
        );
        assert_eq!(
            transfer_deep_link("0312345678"),
            "paypay://send?phone=0312345678"
        );
    }

    #[test]
    fn test_transfer_deep_link_id() {
        assert_eq!(
            transfer_deep_link("suiren-taro"),
            "paypay://send?id=suiren-taro"
        );
        // Too short to be a phone number
        assert_eq!(transfer_deep_link("012345"), "paypay://send?id=012345");
    }

    #[test]
    fn test_seller_payment_url() {
        assert_eq!(
            seller_payment_url("https://suiren.example.com/", 7),
            "https://suiren.example.com/pay?sellerId=7"
        );
    }
}

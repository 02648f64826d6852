//! Database queries
//!
//! One query struct per table. All mutation of ledger state happens here;
//! `ReceiptQueries::mark_processed` and `ExternalPaymentQueries::complete`
//! are the only read-check-write sections and each runs inside a single
//! transaction while the connection mutex is held.

use super::{
    Database, ExternalPaymentModel, ExternalPaymentStatus, PaymentModel, PendingReceiptView,
    ReceiptModel, ReceiptStatus, SellerTransactionView, UserModel,
};
use crate::{PointsError, PointsResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserModel> {
    Ok(UserModel {
        id: row.get(0)?,
        username: row.get(1)?,
        paypay_id: row.get(2)?,
        line_user_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_payment_row(row: &Row<'_>) -> rusqlite::Result<PaymentModel> {
    Ok(PaymentModel {
        id: row.get(0)?,
        buyer_id: row.get(1)?,
        seller_id: row.get(2)?,
        amount: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn parse_status<T>(
    idx: usize,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown status: {raw}").into(),
        )
    })
}

fn map_receipt_row(row: &Row<'_>) -> rusqlite::Result<ReceiptModel> {
    let raw: String = row.get(5)?;
    Ok(ReceiptModel {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        buyer_id: row.get(2)?,
        amount: row.get(3)?,
        memo: row.get(4)?,
        status: parse_status(5, &raw, ReceiptStatus::parse)?,
        created_at: row.get(6)?,
        processed_at: row.get(7)?,
    })
}

const RECEIPT_COLUMNS: &str =
    "id, seller_id, buyer_id, amount, memo, status, created_at, processed_at";

const USER_COLUMNS: &str = "id, username, paypay_id, line_user_id, created_at";

const PAYMENT_COLUMNS: &str = "id, buyer_id, seller_id, amount, created_at";

/// User queries
pub struct UserQueries<'a> {
    db: &'a Database,
}

impl<'a> UserQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a user with a unique display name
    pub async fn create(&self, username: &str, password_hash: Option<&str>) -> PointsResult<i64> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let result = conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![username, password_hash],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                info!("DB: Created user: id={}, username={}", id, username);
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.contains("UNIQUE constraint failed: users.username") =>
            {
                Err(PointsError::DuplicateName(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by ID
    pub async fn get(&self, id: i64) -> PointsResult<Option<UserModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                map_user_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Find a user by display name
    pub async fn find_by_name(&self, username: &str) -> PointsResult<Option<UserModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                map_user_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Get a user and the stored credential hash for the login edge to check
    pub async fn get_login_material(
        &self,
        username: &str,
    ) -> PointsResult<Option<(UserModel, Option<String>)>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let result = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"),
                params![username],
                |row| {
                    let user = map_user_row(row)?;
                    let hash: Option<String> = row.get(5)?;
                    Ok((user, hash))
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Get the user linked to a LINE identity, creating one on first contact
    pub async fn get_or_create_by_line_id(&self, line_user_id: &str) -> PointsResult<UserModel> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let existing = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE line_user_id = ?1"),
                params![line_user_id],
                map_user_row,
            )
            .optional()?;

        if let Some(user) = existing {
            return Ok(user);
        }

        // First contact from this messaging identity; the generated display
        // name stays unique because line_user_id is unique.
        let username = format!("line_{line_user_id}");
        conn.execute(
            "INSERT INTO users (username, line_user_id) VALUES (?1, ?2)",
            params![username, line_user_id],
        )?;
        let id = conn.last_insert_rowid();
        info!(
            "DB: Created user from LINE identity: id={}, line_user_id={}",
            id, line_user_id
        );

        let user = conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user_row,
        )?;
        Ok(user)
    }

    /// Store the user's PayPay handle
    pub async fn set_paypay_id(&self, id: i64, paypay_id: &str) -> PointsResult<()> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let updated = conn.execute(
            "UPDATE users SET paypay_id = ?1 WHERE id = ?2",
            params![paypay_id, id],
        )?;
        if updated == 0 {
            return Err(PointsError::UserNotFound(id));
        }
        info!("DB: Updated PayPay handle: user_id={}", id);
        Ok(())
    }

    /// Link a LINE identity to an existing user
    pub async fn set_line_user_id(&self, id: i64, line_user_id: &str) -> PointsResult<()> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let updated = conn.execute(
            "UPDATE users SET line_user_id = ?1 WHERE id = ?2",
            params![line_user_id, id],
        )?;
        if updated == 0 {
            return Err(PointsError::UserNotFound(id));
        }
        info!("DB: Linked LINE identity: user_id={}", id);
        Ok(())
    }

    /// List all users, for the admin console's buyer selection
    pub async fn list_all(&self) -> PointsResult<Vec<UserModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
        let rows = stmt.query_map([], map_user_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

/// Payment ledger queries
pub struct PaymentQueries<'a> {
    db: &'a Database,
}

impl<'a> PaymentQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a ledger entry
    ///
    /// Pure insert; amount validation happens in the service layer before
    /// this call is reached.
    pub async fn insert(
        &self,
        buyer_id: i64,
        amount: i64,
        seller_id: Option<i64>,
    ) -> PointsResult<PaymentModel> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        conn.execute(
            "INSERT INTO payments (buyer_id, seller_id, amount) VALUES (?1, ?2, ?3)",
            params![buyer_id, seller_id, amount],
        )?;
        let id = conn.last_insert_rowid();
        info!(
            "DB: Inserted payment: id={}, buyer_id={}, seller_id={:?}, amount={}",
            id, buyer_id, seller_id, amount
        );

        let payment = conn.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id],
            map_payment_row,
        )?;
        Ok(payment)
    }

    /// Sum and count of a buyer's ledger entries
    pub async fn points_summary(&self, buyer_id: i64) -> PointsResult<(i64, i64)> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let summary = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM payments WHERE buyer_id = ?1",
            params![buyer_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(summary)
    }

    /// A buyer's ledger entries, most recent first
    pub async fn history(&self, buyer_id: i64, limit: u32) -> PointsResult<Vec<PaymentModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE buyer_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![buyer_id, limit], map_payment_row)?;

        let mut payments = Vec::new();
        for row in rows {
            payments.push(row?);
        }
        Ok(payments)
    }

    /// Sum and count of a seller's received payments
    pub async fn seller_earnings(&self, seller_id: i64) -> PointsResult<(i64, i64)> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let summary = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM payments WHERE seller_id = ?1",
            params![seller_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(summary)
    }

    /// A seller's received payments joined with buyer names, most recent first
    pub async fn seller_transactions(
        &self,
        seller_id: i64,
        limit: u32,
    ) -> PointsResult<Vec<SellerTransactionView>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT p.id, u.username, p.amount, p.created_at
             FROM payments p JOIN users u ON u.id = p.buyer_id
             WHERE p.seller_id = ?1
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![seller_id, limit], |row| {
            Ok(SellerTransactionView {
                id: row.get(0)?,
                buyer_name: row.get(1)?,
                amount: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?);
        }
        Ok(transactions)
    }

    /// One page of the full ledger, most recent first
    pub async fn list_page(&self, page: u32, per_page: u32) -> PointsResult<Vec<PaymentModel>> {
        let offset = (page.saturating_sub(1)) * per_page;
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![per_page, offset], map_payment_row)?;

        let mut payments = Vec::new();
        for row in rows {
            payments.push(row?);
        }
        Ok(payments)
    }

    /// Total number of ledger entries
    pub async fn count(&self) -> PointsResult<u64> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Receipt queries
pub struct ReceiptQueries<'a> {
    db: &'a Database,
}

impl<'a> ReceiptQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a receipt in its initial PENDING state
    pub async fn insert(
        &self,
        seller_id: i64,
        amount: i64,
        buyer_id: Option<i64>,
        memo: Option<&str>,
    ) -> PointsResult<ReceiptModel> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        conn.execute(
            "INSERT INTO receipts (seller_id, buyer_id, amount, memo, status)
             VALUES (?1, ?2, ?3, ?4, 'PENDING')",
            params![seller_id, buyer_id, amount, memo],
        )?;
        let id = conn.last_insert_rowid();
        info!(
            "DB: Inserted receipt: id={}, seller_id={}, buyer_id={:?}, amount={}",
            id, seller_id, buyer_id, amount
        );

        let receipt = conn.query_row(
            &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1"),
            params![id],
            map_receipt_row,
        )?;
        Ok(receipt)
    }

    /// Get a receipt by ID
    pub async fn get_by_id(&self, id: i64) -> PointsResult<Option<ReceiptModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let receipt = conn
            .query_row(
                &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1"),
                params![id],
                map_receipt_row,
            )
            .optional()?;
        Ok(receipt)
    }

    /// Pending receipts joined with seller names, oldest first
    pub async fn list_pending(&self) -> PointsResult<Vec<PendingReceiptView>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.seller_id, u.username, r.amount, r.memo, r.created_at
             FROM receipts r JOIN users u ON u.id = r.seller_id
             WHERE r.status = 'PENDING'
             ORDER BY r.created_at, r.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingReceiptView {
                id: row.get(0)?,
                seller_id: row.get(1)?,
                seller_name: row.get(2)?,
                amount: row.get(3)?,
                memo: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut receipts = Vec::new();
        for row in rows {
            receipts.push(row?);
        }
        Ok(receipts)
    }

    /// Pending receipts with the given amount, oldest first
    ///
    /// Used by the screenshot-candidate matching step to pair a candidate
    /// transaction with the receipt it most plausibly settles.
    pub async fn list_pending_by_amount(&self, amount: i64) -> PointsResult<Vec<ReceiptModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts
             WHERE status = 'PENDING' AND amount = ?1
             ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params![amount], map_receipt_row)?;

        let mut receipts = Vec::new();
        for row in rows {
            receipts.push(row?);
        }
        Ok(receipts)
    }

    /// One page of all receipts, most recent first
    pub async fn list_page(&self, page: u32, per_page: u32) -> PointsResult<Vec<ReceiptModel>> {
        let offset = (page.saturating_sub(1)) * per_page;
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![per_page, offset], map_receipt_row)?;

        let mut receipts = Vec::new();
        for row in rows {
            receipts.push(row?);
        }
        Ok(receipts)
    }

    /// Total number of receipts
    pub async fn count(&self) -> PointsResult<u64> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Atomically transition a receipt PENDING → PROCESSED and credit the buyer
    ///
    /// The status re-read, the payment insert, and the receipt stamp are one
    /// transaction: of two concurrent calls for the same receipt, exactly one
    /// observes PENDING and commits; the other gets `AlreadyProcessed`. An
    /// early return drops the transaction and rolls everything back.
    pub async fn mark_processed(&self, id: i64, buyer_id: i64) -> PointsResult<PaymentModel> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let receipt = tx
            .query_row(
                "SELECT seller_id, amount, status FROM receipts WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((seller_id, amount, status)) = receipt else {
            return Err(PointsError::ReceiptNotFound(id));
        };

        if ReceiptStatus::parse(&status) != Some(ReceiptStatus::Pending) {
            return Err(PointsError::AlreadyProcessed(id));
        }

        let buyer_exists = tx
            .query_row(
                "SELECT id FROM users WHERE id = ?1",
                params![buyer_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if buyer_exists.is_none() {
            return Err(PointsError::UserNotFound(buyer_id));
        }

        tx.execute(
            "INSERT INTO payments (buyer_id, seller_id, amount) VALUES (?1, ?2, ?3)",
            params![buyer_id, seller_id, amount],
        )?;
        let payment_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE receipts
             SET status = 'PROCESSED', buyer_id = ?1, processed_at = CURRENT_TIMESTAMP
             WHERE id = ?2",
            params![buyer_id, id],
        )?;

        let payment = tx.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![payment_id],
            map_payment_row,
        )?;

        tx.commit()?;
        info!(
            "DB: Processed receipt: id={}, buyer_id={}, payment_id={}, amount={}",
            id, buyer_id, payment.id, amount
        );
        Ok(payment)
    }
}

/// External payment correlation queries
pub struct ExternalPaymentQueries<'a> {
    db: &'a Database,
}

impl<'a> ExternalPaymentQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ExternalPaymentModel> {
        let raw: String = row.get(3)?;
        Ok(ExternalPaymentModel {
            merchant_payment_id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            status: parse_status(3, &raw, ExternalPaymentStatus::parse)?,
            created_at: row.get(4)?,
            completed_at: row.get(5)?,
        })
    }

    /// Insert a pending correlation for a newly created payment link
    pub async fn insert(
        &self,
        merchant_payment_id: &str,
        user_id: i64,
        amount: i64,
    ) -> PointsResult<()> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        conn.execute(
            "INSERT INTO external_payments (merchant_payment_id, user_id, amount, status)
             VALUES (?1, ?2, ?3, 'PENDING')",
            params![merchant_payment_id, user_id, amount],
        )?;
        info!(
            "DB: Inserted external payment: merchant_payment_id={}, user_id={}, amount={}",
            merchant_payment_id, user_id, amount
        );
        Ok(())
    }

    /// Get a correlation by merchant payment ID
    pub async fn get(&self, merchant_payment_id: &str) -> PointsResult<Option<ExternalPaymentModel>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let row = conn
            .query_row(
                "SELECT merchant_payment_id, user_id, amount, status, created_at, completed_at
                 FROM external_payments WHERE merchant_payment_id = ?1",
                params![merchant_payment_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Atomically confirm a correlation and credit the ledger
    ///
    /// Same discipline as `ReceiptQueries::mark_processed`: the status check
    /// and the payment insert share one transaction, so confirming the same
    /// link twice credits points exactly once.
    pub async fn complete(&self, merchant_payment_id: &str) -> PointsResult<PaymentModel> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                "SELECT user_id, amount, status FROM external_payments
                 WHERE merchant_payment_id = ?1",
                params![merchant_payment_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, amount, status)) = row else {
            return Err(PointsError::CorrelationNotFound(
                merchant_payment_id.to_string(),
            ));
        };

        if ExternalPaymentStatus::parse(&status) != Some(ExternalPaymentStatus::Pending) {
            return Err(PointsError::AlreadyCompleted(
                merchant_payment_id.to_string(),
            ));
        }

        tx.execute(
            "INSERT INTO payments (buyer_id, seller_id, amount) VALUES (?1, NULL, ?2)",
            params![user_id, amount],
        )?;
        let payment_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE external_payments
             SET status = 'COMPLETED', completed_at = CURRENT_TIMESTAMP
             WHERE merchant_payment_id = ?1",
            params![merchant_payment_id],
        )?;

        let payment = tx.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![payment_id],
            map_payment_row,
        )?;

        tx.commit()?;
        info!(
            "DB: Completed external payment: merchant_payment_id={}, payment_id={}",
            merchant_payment_id, payment.id
        );
        Ok(payment)
    }

    /// Delete pending correlations created before the cutoff
    pub async fn delete_stale(&self, cutoff: DateTime<Utc>) -> PointsResult<usize> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM external_payments WHERE status = 'PENDING' AND created_at < ?1",
            params![cutoff.format("%Y-%m-%d %H:%M:%S").to_string()],
        )?;
        if deleted > 0 {
            info!("DB: Purged {} stale external payment(s)", deleted);
        }
        Ok(deleted)
    }
}

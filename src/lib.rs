//! Suiren: a merchant loyalty-points service
//!
//! Buyers collect points by recording payments to sellers; sellers submit
//! receipts for money they have received, and each receipt is reconciled
//! against a buyer account — automatically when the buyer can be resolved at
//! submission time, otherwise later by an administrator:
//!
//! - **Points ledger**: append-only payment records, the sole source of truth
//!   for point balances
//! - **Receipt reconciliation**: a PENDING → PROCESSED state machine that
//!   credits the buyer exactly once per receipt
//! - **HTTP API**: RESTful API for buyers, sellers, and the admin console
//! - **PayPay deep links**: payment-link creation with a persisted
//!   correlation table so restarts do not lose in-flight payments
//!
//! # Architecture
//!
//! 1. `db` owns all durable state (users, payments, receipts, external
//!    payment correlations) behind a single SQLite connection
//! 2. `points` implements the reconciliation state machine and balance reads
//! 3. `api` exposes the HTTP surface and maps domain errors to status codes
//! 4. `paypay`, `analysis`, and `notify` are thin boundaries to external
//!    collaborators
//!
#![warn(missing_docs)]

pub mod analysis;
pub mod api;
pub mod config;
pub mod db;
pub mod notify;
pub mod paypay;
pub mod points;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub use config::Config;
use db::Database;
use notify::{LogNotifier, Notifier};
use points::PointsService;

/// The main application state
#[derive(Clone)]
pub struct PointsApp {
    /// Application configuration
    pub config: Arc<Config>,
    /// Database connection
    pub db: Arc<Database>,
    /// Points and reconciliation services
    pub points: Arc<PointsService>,
    /// Notification collaborator (messaging bot push)
    pub notifier: Arc<dyn Notifier>,
}

impl PointsApp {
    /// Create a new application instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing suiren application...");

        let config = Arc::new(config);

        let db_path = config.resolve_database_path();
        info!("Connecting to database at: {}", db_path);
        let db = Arc::new(Database::connect(&db_path).await?);

        let points = Arc::new(PointsService::new(config.clone(), db.clone()));

        info!("suiren application initialized successfully");

        Ok(Self {
            config,
            db,
            points,
            notifier: Arc::new(LogNotifier),
        })
    }

    /// Replace the notification collaborator
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Start the application
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(tokio::sync::oneshot::channel().1).await
    }

    /// Start the application with a shutdown signal
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        info!("Starting suiren application...");

        // Run the startup pass: report the pending-receipt backlog and purge
        // stale external-payment correlations.
        self.points.init().await?;

        info!(
            "suiren application running. API available at http://{}",
            self.config.bind_address()
        );

        api::serve_with_shutdown(self.clone(), shutdown_rx).await?;

        Ok(())
    }

    /// Shutdown the application gracefully
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down suiren application...");
        self.db.close().await;
        info!("suiren application shutdown complete");
        Ok(())
    }
}

/// Error types for the points service
#[derive(thiserror::Error, Debug)]
pub enum PointsError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Non-positive payment or receipt amount
    #[error("Amount must be a positive number of yen, got {0}")]
    InvalidAmount(i64),

    /// Registration conflict on the unique display name
    #[error("The username \"{0}\" is already taken")]
    DuplicateName(String),

    /// A supplied buyer name matched no existing user
    #[error("No user found with the name \"{0}\"")]
    BuyerNotFound(String),

    /// Unknown receipt id
    #[error("Receipt not found: id={0}")]
    ReceiptNotFound(i64),

    /// Unknown user id
    #[error("User not found: id={0}")]
    UserNotFound(i64),

    /// Unknown external payment correlation
    #[error("Payment correlation not found: {0}")]
    CorrelationNotFound(String),

    /// Re-processing a receipt that already reached its terminal state
    #[error("Receipt {0} has already been processed")]
    AlreadyProcessed(i64),

    /// Re-confirming an external payment that already credited the ledger
    #[error("Payment {0} has already been confirmed")]
    AlreadyCompleted(String),

    /// External collaborator failure (payment provider, screenshot analysis)
    #[error("External service error: {0}")]
    ExternalService(String),
}

/// Result type alias for points operations
pub type PointsResult<T> = std::result::Result<T, PointsError>;

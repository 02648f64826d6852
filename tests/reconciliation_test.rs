//! End-to-end tests for the receipt reconciliation core
//!
//! Every scenario runs against a fresh in-memory store through the same
//! services the HTTP handlers use.

use suiren::config::Config;
use suiren::db::{ExternalPaymentQueries, PaymentQueries, ReceiptQueries, ReceiptStatus, UserQueries};
use suiren::paypay::PayPayService;
use suiren::points::{BatchItem, BuyerRef, SubmissionResult};
use suiren::{PointsApp, PointsError};

async fn test_app() -> PointsApp {
    let mut config = Config::default();
    config.database.path = ":memory:".to_string();
    config.paypay.enabled = true;
    PointsApp::new(config).await.unwrap()
}

async fn create_user(app: &PointsApp, name: &str) -> i64 {
    UserQueries::new(&app.db).create(name, None).await.unwrap()
}

#[tokio::test]
async fn balance_equals_sum_of_ledger_entries() {
    let app = test_app().await;
    let alice = create_user(&app, "alice").await;
    let seller = create_user(&app, "seller").await;

    app.points.record_payment(alice, 300, None).await.unwrap();
    app.points
        .record_payment(alice, 700, Some(seller))
        .await
        .unwrap();

    // A reconciled receipt also lands in the ledger
    let result = app
        .points
        .matcher
        .submit_receipt(seller, 500, Some(BuyerRef::Id(alice)), None)
        .await
        .unwrap();
    assert!(matches!(result, SubmissionResult::Processed { .. }));

    let balance = app.points.get_balance(alice).await.unwrap();
    assert_eq!(balance.total_points, 1500);
    assert_eq!(balance.payment_count, 3);

    let history = app.points.get_history(alice, 10).await.unwrap();
    let from_history: i64 = history.iter().map(|p| p.amount).sum();
    assert_eq!(from_history, balance.total_points);

    // Unknown buyers read as zero, not as an error
    let empty = app.points.get_balance(9999).await.unwrap();
    assert_eq!(empty.total_points, 0);
    assert_eq!(empty.payment_count, 0);
}

#[tokio::test]
async fn processing_a_receipt_twice_fails_the_second_time() {
    let app = test_app().await;
    let buyer = create_user(&app, "buyer").await;
    let seller = create_user(&app, "seller").await;

    let result = app
        .points
        .matcher
        .submit_receipt(seller, 800, None, None)
        .await
        .unwrap();
    let receipt_id = result.receipt().id;

    app.points.reconcile.process(receipt_id, buyer).await.unwrap();

    let second = app.points.reconcile.process(receipt_id, buyer).await;
    assert!(matches!(second, Err(PointsError::AlreadyProcessed(id)) if id == receipt_id));

    // Exactly one ledger entry came out of the receipt
    assert_eq!(PaymentQueries::new(&app.db).count().await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_processing_credits_exactly_once() {
    let app = test_app().await;
    let buyer_a = create_user(&app, "buyer-a").await;
    let buyer_b = create_user(&app, "buyer-b").await;
    let seller = create_user(&app, "seller").await;

    let result = app
        .points
        .matcher
        .submit_receipt(seller, 1000, None, None)
        .await
        .unwrap();
    let receipt_id = result.receipt().id;

    let reconcile_a = app.points.reconcile.clone();
    let reconcile_b = app.points.reconcile.clone();
    let first = tokio::spawn(async move { reconcile_a.process(receipt_id, buyer_a).await });
    let second = tokio::spawn(async move { reconcile_b.process(receipt_id, buyer_b).await });

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(PointsError::AlreadyProcessed(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(PaymentQueries::new(&app.db).count().await.unwrap(), 1);

    // The receipt is terminal and attributed to whichever call won
    let receipt = ReceiptQueries::new(&app.db)
        .get_by_id(receipt_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Processed);
    assert!(receipt.processed_at.is_some());
    assert!(receipt.buyer_id == Some(buyer_a) || receipt.buyer_id == Some(buyer_b));
}

#[tokio::test]
async fn submission_with_known_buyer_name_auto_matches() {
    let app = test_app().await;
    let alice = create_user(&app, "alice").await;
    let seller = create_user(&app, "seller").await;

    let result = app
        .points
        .matcher
        .submit_receipt(seller, 500, Some(BuyerRef::Name("alice".to_string())), None)
        .await
        .unwrap();

    match result {
        SubmissionResult::Processed { receipt, payment } => {
            assert_eq!(receipt.status, ReceiptStatus::Processed);
            assert_eq!(receipt.buyer_id, Some(alice));
            assert!(receipt.processed_at.is_some());
            assert_eq!(payment.amount, 500);
            assert_eq!(payment.buyer_id, alice);
            assert_eq!(payment.seller_id, Some(seller));
        }
        SubmissionResult::Pending(receipt) => {
            panic!("expected auto-match, receipt {} stayed pending", receipt.id)
        }
    }
}

#[tokio::test]
async fn submission_without_buyer_stays_pending_until_processed() {
    let app = test_app().await;
    let seller = create_user(&app, "seller").await;
    let buyer = create_user(&app, "buyer").await;

    let result = app
        .points
        .matcher
        .submit_receipt(seller, 1200, None, Some("table 4"))
        .await
        .unwrap();

    let receipt = match result {
        SubmissionResult::Pending(receipt) => receipt,
        SubmissionResult::Processed { .. } => panic!("receipt with no buyer cannot auto-match"),
    };
    assert_eq!(receipt.status, ReceiptStatus::Pending);
    assert_eq!(receipt.buyer_id, None);
    assert_eq!(receipt.memo.as_deref(), Some("table 4"));
    assert_eq!(PaymentQueries::new(&app.db).count().await.unwrap(), 0);

    let pending = ReceiptQueries::new(&app.db).list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].seller_name, "seller");

    let payment = app.points.reconcile.process(receipt.id, buyer).await.unwrap();
    assert_eq!(payment.amount, 1200);
    assert_eq!(payment.buyer_id, buyer);

    let receipt = ReceiptQueries::new(&app.db)
        .get_by_id(receipt.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Processed);
    assert_eq!(receipt.buyer_id, Some(buyer));
}

#[tokio::test]
async fn non_positive_amounts_are_rejected_before_anything_is_written() {
    let app = test_app().await;
    let seller = create_user(&app, "seller").await;

    for amount in [0, -5] {
        let result = app
            .points
            .matcher
            .submit_receipt(seller, amount, None, None)
            .await;
        assert!(matches!(result, Err(PointsError::InvalidAmount(a)) if a == amount));
    }

    let direct = app.points.record_payment(seller, 0, None).await;
    assert!(matches!(direct, Err(PointsError::InvalidAmount(0))));

    assert_eq!(ReceiptQueries::new(&app.db).count().await.unwrap(), 0);
    assert_eq!(PaymentQueries::new(&app.db).count().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_buyer_name_fails_submission_entirely() {
    let app = test_app().await;
    let seller = create_user(&app, "seller").await;

    let result = app
        .points
        .matcher
        .submit_receipt(seller, 400, Some(BuyerRef::Name("nobody".to_string())), None)
        .await;
    assert!(matches!(result, Err(PointsError::BuyerNotFound(name)) if name == "nobody"));
    assert_eq!(ReceiptQueries::new(&app.db).count().await.unwrap(), 0);
}

#[tokio::test]
async fn auto_match_failure_leaves_the_receipt_pending() {
    let app = test_app().await;
    let seller = create_user(&app, "seller").await;

    // Buyer id supplied by the caller but unknown to the store: the
    // submission survives, the auto-match does not.
    let result = app
        .points
        .matcher
        .submit_receipt(seller, 900, Some(BuyerRef::Id(424242)), None)
        .await
        .unwrap();

    match result {
        SubmissionResult::Pending(receipt) => {
            assert_eq!(receipt.status, ReceiptStatus::Pending);
        }
        SubmissionResult::Processed { .. } => panic!("unknown buyer id cannot auto-match"),
    }
    assert_eq!(PaymentQueries::new(&app.db).count().await.unwrap(), 0);
}

#[tokio::test]
async fn bulk_reconciliation_isolates_per_item_failures() {
    let app = test_app().await;
    let alice = create_user(&app, "alice").await;
    let bob = create_user(&app, "bob").await;
    let seller = create_user(&app, "seller").await;

    let receipts = ReceiptQueries::new(&app.db);
    let open = receipts.insert(seller, 300, None, None).await.unwrap();
    let settled = receipts.insert(seller, 450, None, None).await.unwrap();
    app.points.reconcile.process(settled.id, bob).await.unwrap();

    let items = vec![
        // Matched candidate: credits alice
        BatchItem {
            receipt_id: Some(open.id),
            buyer_id: Some(alice),
            amount: 300,
        },
        // Analysis produced no sender match
        BatchItem {
            receipt_id: Some(open.id),
            buyer_id: None,
            amount: 300,
        },
        // Targets a receipt that is already terminal
        BatchItem {
            receipt_id: Some(settled.id),
            buyer_id: Some(bob),
            amount: 450,
        },
    ];

    let summary = app.points.reconcile.process_batch(items).await;

    assert_eq!(summary.succeeded.len(), 1);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.succeeded[0].receipt_id, open.id);
    assert_eq!(summary.succeeded[0].buyer_id, alice);

    assert!(summary.failed[0].cause.contains("no matched buyer"));
    assert!(summary.failed[1].cause.contains("already been processed"));

    // One new ledger entry from the batch, one from the setup
    assert_eq!(PaymentQueries::new(&app.db).count().await.unwrap(), 2);
}

#[tokio::test]
async fn screenshot_candidates_match_by_name_and_amount() {
    use suiren::analysis::{match_candidates, CandidateTransaction};

    let app = test_app().await;
    let alice = create_user(&app, "alice").await;
    let seller = create_user(&app, "seller").await;

    let receipts = ReceiptQueries::new(&app.db);
    let first = receipts.insert(seller, 600, None, None).await.unwrap();
    let second = receipts.insert(seller, 600, None, None).await.unwrap();

    let candidates = vec![
        CandidateTransaction {
            amount: 600,
            sender_name: Some("alice".to_string()),
            date: None,
            memo: None,
        },
        CandidateTransaction {
            amount: 600,
            sender_name: Some("unknown-sender".to_string()),
            date: None,
            memo: None,
        },
        CandidateTransaction {
            amount: 999,
            sender_name: Some("alice".to_string()),
            date: None,
            memo: None,
        },
    ];

    let items = match_candidates(&app.db, &candidates).await.unwrap();
    assert_eq!(items.len(), 3);

    // Equal-amount candidates consume distinct receipts, oldest first
    assert_eq!(items[0].receipt_id, Some(first.id));
    assert_eq!(items[0].buyer_id, Some(alice));
    assert_eq!(items[1].receipt_id, Some(second.id));
    assert_eq!(items[1].buyer_id, None);
    // No pending receipt carries that amount
    assert_eq!(items[2].receipt_id, None);
}

#[tokio::test]
async fn payment_link_completion_credits_exactly_once() {
    let app = test_app().await;
    let buyer = create_user(&app, "buyer").await;

    let service = PayPayService::new(app.config.clone(), app.db.clone());
    let link = service.create_payment_link(buyer, 2500).await.unwrap();

    let payment = service.complete_payment(&link.merchant_payment_id).await.unwrap();
    assert_eq!(payment.buyer_id, buyer);
    assert_eq!(payment.amount, 2500);
    assert_eq!(payment.seller_id, None);

    let replay = service.complete_payment(&link.merchant_payment_id).await;
    assert!(matches!(replay, Err(PointsError::AlreadyCompleted(_))));

    let balance = app.points.get_balance(buyer).await.unwrap();
    assert_eq!(balance.total_points, 2500);
}

#[tokio::test]
async fn stale_payment_links_are_purged() {
    let app = test_app().await;
    let buyer = create_user(&app, "buyer").await;

    let service = PayPayService::new(app.config.clone(), app.db.clone());
    let link = service.create_payment_link(buyer, 100).await.unwrap();

    // Everything before a future cutoff counts as stale
    let cutoff = chrono::Utc::now() + chrono::Duration::hours(1);
    let purged = ExternalPaymentQueries::new(&app.db)
        .delete_stale(cutoff)
        .await
        .unwrap();
    assert_eq!(purged, 1);

    let replay = service.complete_payment(&link.merchant_payment_id).await;
    assert!(matches!(replay, Err(PointsError::CorrelationNotFound(_))));
}

#[tokio::test]
async fn duplicate_usernames_are_rejected() {
    let app = test_app().await;
    create_user(&app, "alice").await;

    let result = UserQueries::new(&app.db).create("alice", None).await;
    assert!(matches!(result, Err(PointsError::DuplicateName(name)) if name == "alice"));
}

#[tokio::test]
async fn line_identity_creates_a_user_once() {
    let app = test_app().await;

    let users = UserQueries::new(&app.db);
    let first = users.get_or_create_by_line_id("U4af4980629").await.unwrap();
    let second = users.get_or_create_by_line_id("U4af4980629").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.line_user_id.as_deref(), Some("U4af4980629"));
}

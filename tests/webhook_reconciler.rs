mod common;

use common::{harness, harness_with_secret, stored_transaction};
use payment_orchestrator::connectors::hmac_sha256_hex;
use payment_orchestrator::domain::transaction::{PaymentStatus, PspProvider};
use payment_orchestrator::error::CoreError;
use payment_orchestrator::repo::store::TransactionStore;
use payment_orchestrator::service::reconciler::WebhookAck;
use rust_decimal_macros::dec;

fn paid_event(psp_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": "payment_paid",
        "data": {"id": psp_id, "status": "PAID"}
    }))
    .unwrap()
}

fn refund_event(psp_id: &str, refunded_minor: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": "payment_refunded",
        "data": {"id": psp_id, "status": "REFUNDED", "refunded": refunded_minor}
    }))
    .unwrap()
}

#[tokio::test]
async fn tampered_signature_is_rejected_without_ledger_mutation() {
    let h = harness_with_secret("ALWAYS_PAID", Some("whsec_1"));
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Pending, dec!(30), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    let body = paid_event("pay_1");
    let signature = hmac_sha256_hex(&body, "wrong_secret");

    let err = h
        .reconciler
        .handle(PspProvider::Mock, &body, Some(&signature))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SignatureInvalid));

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn missing_signature_with_configured_secret_is_rejected() {
    let h = harness_with_secret("ALWAYS_PAID", Some("whsec_1"));
    let body = paid_event("pay_1");

    let err = h
        .reconciler
        .handle(PspProvider::Mock, &body, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SignatureInvalid));
}

#[tokio::test]
async fn valid_signature_applies_the_transition() {
    let h = harness_with_secret("ALWAYS_PAID", Some("whsec_1"));
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Pending, dec!(30), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    let body = paid_event("pay_1");
    let signature = hmac_sha256_hex(&body, "whsec_1");

    let ack = h
        .reconciler
        .handle(PspProvider::Mock, &body, Some(&signature))
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Processed);

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn no_configured_secret_processes_unverified() {
    let h = harness("ALWAYS_PAID");
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Pending, dec!(30), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    let ack = h
        .reconciler
        .handle(PspProvider::Mock, &paid_event("pay_1"), None)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Processed);

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn unknown_psp_transaction_is_acknowledged_without_creating_rows() {
    let h = harness("ALWAYS_PAID");

    let ack = h
        .reconciler
        .handle(PspProvider::Mock, &paid_event("pay_untracked"), None)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::NoLocalRecord);

    let rows = h
        .transactions
        .list_by_merchant(h.merchant.id, None, 50, 0)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn duplicate_paid_events_do_not_mutate_the_ledger_twice() {
    let h = harness("ALWAYS_PAID");
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Pending, dec!(30), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    let body = paid_event("pay_1");
    h.reconciler
        .handle(PspProvider::Mock, &body, None)
        .await
        .unwrap();
    let ack = h
        .reconciler
        .handle(PspProvider::Mock, &body, None)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Processed);

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Paid);
    // One applied transition: the duplicate resolved to a no-op.
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn refund_events_classify_partial_then_full() {
    let h = harness("ALWAYS_PAID");
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Paid, dec!(100.50), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    h.reconciler
        .handle(PspProvider::Mock, &refund_event("pay_1", 5025), None)
        .await
        .unwrap();
    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(stored.refunded_amount, dec!(50.25));

    h.reconciler
        .handle(PspProvider::Mock, &refund_event("pay_1", 10050), None)
        .await
        .unwrap();
    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert_eq!(stored.refunded_amount, dec!(100.50));
}

#[tokio::test]
async fn terminal_states_ignore_contradicting_events() {
    let h = harness("ALWAYS_PAID");
    let mut txn = stored_transaction(h.merchant.id, PaymentStatus::Refunded, dec!(30), "pay_1");
    txn.refunded_amount = dec!(30);
    h.transactions.insert(&txn).await.unwrap();

    let ack = h
        .reconciler
        .handle(PspProvider::Mock, &paid_event("pay_1"), None)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Processed);

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn unrecognized_event_types_are_acknowledged_and_skipped() {
    let h = harness("ALWAYS_PAID");
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Pending, dec!(30), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "type": "balance_updated",
        "data": {"id": "pay_1"}
    }))
    .unwrap();

    let ack = h
        .reconciler
        .handle(PspProvider::Mock, &body, None)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Ignored);

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn malformed_webhook_bodies_are_client_errors() {
    let h = harness("ALWAYS_PAID");

    let err = h
        .reconciler
        .handle(PspProvider::Mock, b"not json at all", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn failed_event_records_provider_message() {
    let h = harness("ALWAYS_PAID");
    let txn = stored_transaction(h.merchant.id, PaymentStatus::Pending, dec!(30), "pay_1");
    h.transactions.insert(&txn).await.unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "type": "payment_failed",
        "data": {"id": "pay_1", "status": "FAILED", "message": "INSUFFICIENT_FUNDS"}
    }))
    .unwrap();

    h.reconciler
        .handle(PspProvider::Mock, &body, None)
        .await
        .unwrap();

    let stored = h.transactions.find(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("INSUFFICIENT_FUNDS"));
}

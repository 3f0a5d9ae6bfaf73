#![allow(dead_code)]

use chrono::Utc;
use payment_orchestrator::connectors::mock::MockConnector;
use payment_orchestrator::connectors::ConnectorRegistry;
use payment_orchestrator::domain::merchant::Merchant;
use payment_orchestrator::domain::transaction::{
    CreatePaymentRequest, Currency, PaymentMethod, PaymentStatus, PspProvider, Transaction,
};
use payment_orchestrator::repo::memory::{
    InMemoryMerchantStore, InMemoryRoutingRuleStore, InMemoryTransactionStore,
};
use payment_orchestrator::router::rules::RoutingEngine;
use payment_orchestrator::service::merchant_notifier::MerchantNotifier;
use payment_orchestrator::service::orchestrator::PaymentOrchestrator;
use payment_orchestrator::service::reconciler::WebhookReconciler;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct TestHarness {
    pub orchestrator: PaymentOrchestrator,
    pub reconciler: WebhookReconciler,
    pub transactions: Arc<InMemoryTransactionStore>,
    pub merchants: Arc<InMemoryMerchantStore>,
    pub rules: Arc<InMemoryRoutingRuleStore>,
    pub mock: Arc<MockConnector>,
    pub merchant: Merchant,
}

pub fn harness(behavior: &str) -> TestHarness {
    harness_with_secret(behavior, None)
}

pub fn harness_with_secret(behavior: &str, webhook_secret: Option<&str>) -> TestHarness {
    let transactions = Arc::new(InMemoryTransactionStore::new());
    let merchants = Arc::new(InMemoryMerchantStore::new());
    let rules = Arc::new(InMemoryRoutingRuleStore::new());

    let mock = Arc::new(MockConnector::new(behavior));
    let mut registry = ConnectorRegistry::new();
    registry.register(mock.clone());
    let registry = Arc::new(registry);

    let notifier = MerchantNotifier::new(reqwest::Client::new());

    let router = RoutingEngine {
        rules: rules.clone(),
        registry: registry.clone(),
        default_provider: PspProvider::Mock,
        success_rates: HashMap::new(),
    };

    let orchestrator = PaymentOrchestrator {
        transactions: transactions.clone(),
        router,
        registry: registry.clone(),
        notifier: notifier.clone(),
    };

    let mut webhook_secrets = HashMap::new();
    if let Some(secret) = webhook_secret {
        webhook_secrets.insert(PspProvider::Mock, secret.to_string());
    }
    let reconciler = WebhookReconciler {
        transactions: transactions.clone(),
        merchants: merchants.clone(),
        registry,
        notifier,
        webhook_secrets,
    };

    let merchant = merchant_named("acme");
    merchants.insert(merchant.clone());

    TestHarness {
        orchestrator,
        reconciler,
        transactions,
        merchants,
        rules,
        mock,
        merchant,
    }
}

pub fn merchant_named(name: &str) -> Merchant {
    let now = Utc::now();
    Merchant {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{name}@example.com"),
        api_key: format!("sk_test_{name}"),
        webhook_url: None,
        webhook_secret: None,
        is_active: true,
        settings: serde_json::Map::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn payment_request(amount: Decimal) -> CreatePaymentRequest {
    CreatePaymentRequest {
        amount,
        currency: Currency::Sar,
        payment_method: Some(PaymentMethod::CreditCard),
        description: Some("test order".to_string()),
        source: None,
        callback_url: None,
        metadata: None,
    }
}

pub fn stored_transaction(
    merchant_id: Uuid,
    status: PaymentStatus,
    amount: Decimal,
    psp_transaction_id: &str,
) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: Uuid::new_v4(),
        merchant_id,
        psp_provider: PspProvider::Mock,
        psp_transaction_id: Some(psp_transaction_id.to_string()),
        amount,
        refunded_amount: Decimal::ZERO,
        fee: None,
        currency: Currency::Sar,
        status,
        payment_method: PaymentMethod::CreditCard,
        card: None,
        metadata: serde_json::Map::new(),
        callback_url: None,
        error_message: None,
        psp_reference: None,
        idempotency_key: None,
        request_hash: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

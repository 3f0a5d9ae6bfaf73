use crate::connectors::{ConnectorPaymentRequest, ConnectorRefundRequest, ConnectorRegistry};
use crate::domain::merchant::Merchant;
use crate::domain::transaction::{
    CreatePaymentRequest, PaymentMethod, PaymentStatus, RefundRequest, Transaction,
    TransactionView,
};
use crate::error::CoreError;
use crate::repo::store::TransactionStore;
use crate::router::rules::{RoutingContext, RoutingEngine};
use crate::service::merchant_notifier::{MerchantEventEnvelope, MerchantNotifier};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Coordinates router, connector and ledger for the synchronous merchant
/// paths. The ledger row is only written after the provider accepted the
/// call; a failed provider call leaves no trace.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    pub transactions: Arc<dyn TransactionStore>,
    pub router: RoutingEngine,
    pub registry: Arc<ConnectorRegistry>,
    pub notifier: MerchantNotifier,
}

impl PaymentOrchestrator {
    pub async fn create(
        &self,
        merchant: &Merchant,
        req: CreatePaymentRequest,
        idempotency_key: Option<String>,
    ) -> Result<TransactionView, CoreError> {
        validate_amount(req.amount)?;

        let request_hash = hash_request(&req);
        if let Some(key) = &idempotency_key {
            if let Some(existing) = self
                .transactions
                .find_by_idempotency_key(merchant.id, key)
                .await?
            {
                if existing.request_hash.as_deref() != Some(request_hash.as_str()) {
                    return Err(CoreError::Validation(
                        "idempotency key was already used with a different payload".to_string(),
                    ));
                }
                return Ok(TransactionView::from(&existing));
            }
        }

        let payment_method = req.payment_method.unwrap_or(PaymentMethod::CreditCard);
        let ctx = RoutingContext {
            amount: req.amount,
            currency: req.currency,
            payment_method,
        };
        let provider = self.router.select_provider(merchant.id, &ctx).await?;
        let connector = self.registry.get(provider)?;

        let connector_request = ConnectorPaymentRequest {
            amount: req.amount,
            currency: req.currency,
            description: req.description.clone(),
            source: req.source.clone(),
            callback_url: req.callback_url.clone(),
            metadata: req.metadata.clone().unwrap_or_default(),
        };
        let response = connector.create_payment(&connector_request).await?;

        let now = Utc::now();
        let txn = Transaction {
            id: Uuid::new_v4(),
            merchant_id: merchant.id,
            psp_provider: provider,
            psp_transaction_id: Some(response.psp_transaction_id),
            amount: req.amount,
            refunded_amount: Decimal::ZERO,
            fee: response.fee,
            currency: req.currency,
            status: response.status,
            payment_method,
            card: response.card,
            metadata: req.metadata.unwrap_or_default(),
            callback_url: req.callback_url,
            error_message: response.error_message,
            psp_reference: response.psp_reference,
            idempotency_key,
            request_hash: Some(request_hash),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(&txn).await.map_err(CoreError::Storage)?;

        if txn.status == PaymentStatus::Paid {
            let notifier = self.notifier.clone();
            let merchant = merchant.clone();
            let envelope = MerchantEventEnvelope::for_transaction("payment_paid", &txn, None);
            tokio::spawn(async move {
                notifier.forward(&merchant, &envelope).await;
            });
        }

        Ok(TransactionView::from(&txn))
    }

    /// Dual-source read: the ledger row is authoritative for identity, the
    /// provider for live status. Webhook delivery is not guaranteed, so this
    /// polling path must converge on its own.
    pub async fn get(&self, merchant: &Merchant, id: Uuid) -> Result<TransactionView, CoreError> {
        let txn = self
            .transactions
            .find_for_merchant(id, merchant.id)
            .await?
            .ok_or(CoreError::NotFound("transaction"))?;

        let Some(psp_transaction_id) = txn.psp_transaction_id.clone() else {
            return Ok(TransactionView::from(&txn));
        };
        if txn.status.is_terminal() {
            return Ok(TransactionView::from(&txn));
        }

        let connector = self.registry.get(txn.psp_provider)?;
        let fresh = match connector.get_payment(&psp_transaction_id).await {
            Ok(fresh) => fresh,
            Err(CoreError::NotFound(_)) => {
                tracing::warn!(
                    "provider {} no longer knows payment {}; serving ledger state",
                    txn.psp_provider,
                    psp_transaction_id
                );
                return Ok(TransactionView::from(&txn));
            }
            Err(e) => return Err(e),
        };

        if fresh.status == txn.status {
            return Ok(TransactionView::from(&txn));
        }

        let updated = self
            .persist_update(txn, |t| {
                if !t.status.can_transition_to(fresh.status) {
                    return false;
                }
                t.status = fresh.status;
                t.fee = fresh.fee.or(t.fee);
                t.psp_reference = fresh.psp_reference.clone().or_else(|| t.psp_reference.clone());
                t.error_message = fresh.error_message.clone().or_else(|| t.error_message.clone());
                true
            })
            .await?;
        Ok(TransactionView::from(&updated))
    }

    pub async fn refund(
        &self,
        merchant: &Merchant,
        id: Uuid,
        req: RefundRequest,
    ) -> Result<TransactionView, CoreError> {
        let txn = self
            .transactions
            .find_for_merchant(id, merchant.id)
            .await?
            .ok_or(CoreError::NotFound("transaction"))?;

        if !matches!(
            txn.status,
            PaymentStatus::Paid | PaymentStatus::PartiallyRefunded
        ) {
            return Err(CoreError::InvalidState(format!(
                "refund requires a PAID transaction, current status is {}",
                txn.status.as_str()
            )));
        }

        let psp_transaction_id = txn
            .psp_transaction_id
            .clone()
            .ok_or_else(|| CoreError::InvalidState("transaction has no provider id".to_string()))?;

        let remaining = txn.amount - txn.refunded_amount;
        let amount = req.amount.unwrap_or(remaining);
        validate_amount(amount)?;
        if amount > remaining {
            return Err(CoreError::Validation(format!(
                "refund amount {amount} exceeds refundable remainder {remaining}"
            )));
        }

        let connector = self.registry.get(txn.psp_provider)?;
        let refund = connector
            .refund_payment(
                &psp_transaction_id,
                &ConnectorRefundRequest {
                    amount: Some(amount),
                    reason: req.reason,
                },
            )
            .await?;

        let total_refunded = txn.refunded_amount + refund.refunded_amount;
        let original_amount = txn.amount;
        let updated = self
            .persist_update(txn, |t| {
                t.refunded_amount = t.refunded_amount.max(total_refunded);
                t.status = if t.refunded_amount >= original_amount {
                    PaymentStatus::Refunded
                } else {
                    PaymentStatus::PartiallyRefunded
                };
                t.psp_reference = refund.psp_reference.clone().or_else(|| t.psp_reference.clone());
                true
            })
            .await?;
        Ok(TransactionView::from(&updated))
    }

    pub async fn list(
        &self,
        merchant: &Merchant,
        status: Option<PaymentStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<TransactionView>, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let offset = offset.unwrap_or(0).max(0);
        let rows = self
            .transactions
            .list_by_merchant(merchant.id, status, limit, offset)
            .await?;
        Ok(rows.iter().map(TransactionView::from).collect())
    }

    /// Optimistic-concurrency write loop shared by the synchronous writers.
    /// `apply` re-evaluates against the freshest row each attempt and may
    /// declare the update no longer needed.
    async fn persist_update<F>(
        &self,
        mut current: Transaction,
        apply: F,
    ) -> Result<Transaction, CoreError>
    where
        F: Fn(&mut Transaction) -> bool,
    {
        for _ in 0..3 {
            let mut updated = current.clone();
            if !apply(&mut updated) {
                return Ok(current);
            }
            if self.transactions.update_with_version(&updated).await? {
                return self
                    .transactions
                    .find(updated.id)
                    .await?
                    .ok_or(CoreError::NotFound("transaction"));
            }
            current = self
                .transactions
                .find(current.id)
                .await?
                .ok_or(CoreError::NotFound("transaction"))?;
        }
        Err(CoreError::Storage(anyhow::anyhow!(
            "gave up after repeated version conflicts on transaction {}",
            current.id
        )))
    }
}

fn hash_request(req: &CreatePaymentRequest) -> String {
    let serialized = serde_json::to_string(req).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn validate_amount(amount: Decimal) -> Result<(), CoreError> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation("amount must be positive".to_string()));
    }
    if amount.round_dp(2) != amount {
        return Err(CoreError::Validation(
            "amount supports at most two decimal places".to_string(),
        ));
    }
    Ok(())
}

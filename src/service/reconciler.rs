use crate::connectors::{ConnectorRegistry, ProviderEvent, WebhookEventKind};
use crate::domain::transaction::{PaymentStatus, PspProvider, Transaction};
use crate::error::CoreError;
use crate::repo::store::{MerchantStore, TransactionStore};
use crate::service::merchant_notifier::{MerchantEventEnvelope, MerchantNotifier};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Processed,
    Ignored,
    NoLocalRecord,
}

/// Ingests provider webhooks: authenticates, maps the provider event onto a
/// ledger transition, and forwards a canonical envelope to the merchant.
/// Everything past signature verification is acknowledged to the provider;
/// persistence and forwarding failures are this side's problem, not theirs.
#[derive(Clone)]
pub struct WebhookReconciler {
    pub transactions: Arc<dyn TransactionStore>,
    pub merchants: Arc<dyn MerchantStore>,
    pub registry: Arc<ConnectorRegistry>,
    pub notifier: MerchantNotifier,
    pub webhook_secrets: HashMap<PspProvider, String>,
}

impl WebhookReconciler {
    pub async fn handle(
        &self,
        provider: PspProvider,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, CoreError> {
        let connector = self.registry.get(provider)?;

        // No configured secret means the operator chose unverified ingestion.
        if let Some(secret) = self.webhook_secrets.get(&provider) {
            let Some(signature) = signature else {
                return Err(CoreError::SignatureInvalid);
            };
            if !connector.verify_webhook_signature(raw_body, signature, secret) {
                return Err(CoreError::SignatureInvalid);
            }
        }

        let event = connector.parse_webhook(raw_body)?;
        if let WebhookEventKind::Unknown(kind) = &event.kind {
            tracing::info!("acknowledging unrecognized {} webhook type {}", provider, kind);
            return Ok(WebhookAck::Ignored);
        }

        // Past this point the provider always gets a success ack; persistence
        // and forwarding failures are logged, never returned.
        let txn = match self
            .transactions
            .find_by_psp_id(provider, &event.psp_transaction_id)
            .await
        {
            Ok(Some(txn)) => txn,
            Ok(None) => {
                // The event may predate the create path's ledger write, or
                // belong to a transaction this system never initiated.
                tracing::info!(
                    "no ledger row for {} webhook {}; acknowledged without processing",
                    provider,
                    event.psp_transaction_id
                );
                return Ok(WebhookAck::NoLocalRecord);
            }
            Err(e) => {
                tracing::error!("ledger lookup failed for {} webhook: {}", provider, e);
                return Ok(WebhookAck::Processed);
            }
        };

        match self.apply_event(txn, &event).await {
            Ok(Some(updated)) => self.forward_to_merchant(&updated, &event).await,
            Ok(None) => {}
            Err(e) => {
                tracing::error!("failed to persist {} webhook transition: {}", provider, e);
            }
        }
        Ok(WebhookAck::Processed)
    }

    /// Maps the event onto the state machine and persists through the CAS
    /// store. Duplicate and out-of-order deliveries resolve to no-ops here,
    /// which is what makes webhook ingestion idempotent.
    async fn apply_event(
        &self,
        txn: Transaction,
        event: &ProviderEvent,
    ) -> Result<Option<Transaction>, CoreError> {
        let (target, total_refunded) = match event.kind {
            WebhookEventKind::PaymentPaid => (PaymentStatus::Paid, txn.refunded_amount),
            WebhookEventKind::PaymentFailed => (PaymentStatus::Failed, txn.refunded_amount),
            WebhookEventKind::PaymentRefunded => {
                let cumulative = event.refunded_amount.unwrap_or(txn.amount);
                let total = txn.refunded_amount.max(cumulative);
                let status = if total >= txn.amount {
                    PaymentStatus::Refunded
                } else {
                    PaymentStatus::PartiallyRefunded
                };
                (status, total)
            }
            WebhookEventKind::Unknown(_) => return Ok(None),
        };

        let refund_progress = total_refunded > txn.refunded_amount;
        if txn.status == target && !refund_progress {
            return Ok(None);
        }
        if txn.status != target && !txn.status.can_transition_to(target) {
            tracing::warn!(
                "dropping {} webhook for {}: transition {} -> {} not permitted",
                txn.psp_provider,
                txn.id,
                txn.status.as_str(),
                target.as_str()
            );
            return Ok(None);
        }

        let mut current = txn;
        for _ in 0..3 {
            let mut updated = current.clone();
            updated.status = target;
            updated.refunded_amount = updated.refunded_amount.max(total_refunded);
            if let Some(message) = &event.error_message {
                updated.error_message = Some(message.clone());
            }
            if self.transactions.update_with_version(&updated).await? {
                let persisted = self
                    .transactions
                    .find(updated.id)
                    .await?
                    .ok_or(CoreError::NotFound("transaction"))?;
                return Ok(Some(persisted));
            }

            current = self
                .transactions
                .find(current.id)
                .await?
                .ok_or(CoreError::NotFound("transaction"))?;
            let refund_progress = total_refunded > current.refunded_amount;
            if current.status == target && !refund_progress {
                return Ok(None);
            }
            if current.status != target && !current.status.can_transition_to(target) {
                return Ok(None);
            }
        }
        Err(CoreError::Storage(anyhow::anyhow!(
            "gave up after repeated version conflicts applying webhook to {}",
            current.id
        )))
    }

    async fn forward_to_merchant(&self, txn: &Transaction, event: &ProviderEvent) {
        let merchant = match self.merchants.find(txn.merchant_id).await {
            Ok(Some(merchant)) => merchant,
            Ok(None) => {
                tracing::warn!("transaction {} references unknown merchant", txn.id);
                return;
            }
            Err(e) => {
                tracing::warn!("merchant lookup failed for webhook forward: {}", e);
                return;
            }
        };
        if merchant.webhook_url.is_none() {
            return;
        }

        let envelope = MerchantEventEnvelope::for_transaction(
            event.kind.as_str(),
            txn,
            Some(event.raw.clone()),
        );
        self.notifier.forward(&merchant, &envelope).await;
    }
}

use crate::connectors::hmac_sha256_hex;
use crate::domain::merchant::Merchant;
use crate::domain::transaction::{Currency, PaymentStatus, PspProvider, Transaction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Canonical event envelope delivered to a merchant's registered webhook
/// endpoint, signed with the merchant's own webhook secret.
#[derive(Debug, Clone, Serialize)]
pub struct MerchantEventEnvelope {
    pub event: String,
    pub transaction_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub psp_provider: PspProvider,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub original_provider_payload: Option<serde_json::Value>,
}

impl MerchantEventEnvelope {
    pub fn for_transaction(
        event: &str,
        txn: &Transaction,
        original_provider_payload: Option<serde_json::Value>,
    ) -> Self {
        MerchantEventEnvelope {
            event: event.to_string(),
            transaction_id: txn.id,
            status: txn.status,
            amount: txn.amount,
            currency: txn.currency,
            created_at: txn.created_at,
            psp_provider: txn.psp_provider,
            metadata: txn.metadata.clone(),
            original_provider_payload,
        }
    }
}

/// Best-effort delivery to merchant endpoints. Failures are logged and
/// swallowed; a merchant outage never propagates into the caller's flow.
#[derive(Clone)]
pub struct MerchantNotifier {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl MerchantNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        MerchantNotifier {
            client,
            timeout: Duration::from_secs(10),
        }
    }

    pub async fn forward(&self, merchant: &Merchant, envelope: &MerchantEventEnvelope) {
        let Some(url) = merchant.webhook_url.as_deref() else {
            return;
        };

        let body = match serde_json::to_vec(envelope) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("failed to serialize merchant webhook envelope: {}", e);
                return;
            }
        };

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout);
        if let Some(secret) = merchant.webhook_secret.as_deref() {
            request = request.header("X-Webhook-Signature", hmac_sha256_hex(&body, secret));
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    "merchant webhook delivery to {} returned {}",
                    url,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!("merchant webhook delivery to {} failed: {}", url, e);
            }
        }
    }
}

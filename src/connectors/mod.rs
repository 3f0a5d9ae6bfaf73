use crate::domain::transaction::{
    CardMetadata, Currency, PaymentSource, PaymentStatus, PspProvider,
};
use crate::error::CoreError;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

pub mod mock;
pub mod moyasar;

type HmacSha256 = Hmac<Sha256>;

/// All supported currencies use a 1/100 minor unit (halalas, cents, fils).
const MINOR_UNIT_FACTOR: i64 = 100;

pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::from(MINOR_UNIT_FACTOR))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

pub fn to_major_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex-encoded HMAC-SHA256 signature over the exact
/// raw payload bytes.
pub fn verify_hmac_sha256(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Clone)]
pub struct ConnectorPaymentRequest {
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
    pub source: Option<PaymentSource>,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ConnectorPaymentResponse {
    pub psp_transaction_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub card: Option<CardMetadata>,
    pub psp_reference: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConnectorRefundRequest {
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConnectorRefundResponse {
    pub refunded_amount: Decimal,
    pub status: PaymentStatus,
    pub psp_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentPaid,
    PaymentFailed,
    PaymentRefunded,
    Unknown(String),
}

impl WebhookEventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "payment_paid" => WebhookEventKind::PaymentPaid,
            "payment_failed" => WebhookEventKind::PaymentFailed,
            "payment_refunded" => WebhookEventKind::PaymentRefunded,
            other => WebhookEventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventKind::PaymentPaid => "payment_paid",
            WebhookEventKind::PaymentFailed => "payment_failed",
            WebhookEventKind::PaymentRefunded => "payment_refunded",
            WebhookEventKind::Unknown(s) => s.as_str(),
        }
    }
}

/// A provider webhook already normalized by the owning connector: canonical
/// event kind, the provider's transaction id, and amounts converted to major
/// units. `refunded_amount` is the cumulative refunded total when the
/// provider reports one.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub kind: WebhookEventKind,
    pub psp_transaction_id: String,
    pub status: Option<PaymentStatus>,
    pub refunded_amount: Option<Decimal>,
    pub error_message: Option<String>,
    pub raw: serde_json::Value,
}

#[async_trait::async_trait]
pub trait PspConnector: Send + Sync + std::fmt::Debug {
    fn provider(&self) -> PspProvider;

    async fn create_payment(
        &self,
        request: &ConnectorPaymentRequest,
    ) -> Result<ConnectorPaymentResponse, CoreError>;

    async fn get_payment(
        &self,
        psp_transaction_id: &str,
    ) -> Result<ConnectorPaymentResponse, CoreError>;

    async fn refund_payment(
        &self,
        psp_transaction_id: &str,
        refund: &ConnectorRefundRequest,
    ) -> Result<ConnectorRefundResponse, CoreError>;

    async fn void_payment(&self, psp_transaction_id: &str) -> Result<(), CoreError>;

    /// Interpret the provider's raw webhook body into a canonical event.
    fn parse_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, CoreError>;

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str, secret: &str) -> bool {
        verify_hmac_sha256(raw_body, signature, secret)
    }
}

pub struct ConnectorRegistry {
    connectors: HashMap<PspProvider, Arc<dyn PspConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        ConnectorRegistry {
            connectors: HashMap::new(),
        }
    }

    pub fn register(&mut self, connector: Arc<dyn PspConnector>) {
        self.connectors.insert(connector.provider(), connector);
    }

    pub fn contains(&self, provider: PspProvider) -> bool {
        self.connectors.contains_key(&provider)
    }

    pub fn get(&self, provider: PspProvider) -> Result<Arc<dyn PspConnector>, CoreError> {
        self.connectors
            .get(&provider)
            .cloned()
            .ok_or(CoreError::UnsupportedProvider(provider))
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

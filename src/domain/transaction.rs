use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PspProvider {
    Moyasar,
    Mock,
}

impl PspProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PspProvider::Moyasar => "moyasar",
            PspProvider::Mock => "mock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "moyasar" => Some(PspProvider::Moyasar),
            "mock" => Some(PspProvider::Mock),
            _ => None,
        }
    }
}

impl std::fmt::Display for PspProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Sar,
    Usd,
    Aed,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Sar => "SAR",
            Currency::Usd => "USD",
            Currency::Aed => "AED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SAR" => Some(Currency::Sar),
            "USD" => Some(Currency::Usd),
            "AED" => Some(Currency::Aed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    Mada,
    ApplePay,
    StcPay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::Mada => "MADA",
            PaymentMethod::ApplePay => "APPLE_PAY",
            PaymentMethod::StcPay => "STC_PAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREDIT_CARD" => Some(PaymentMethod::CreditCard),
            "MADA" => Some(PaymentMethod::Mada),
            "APPLE_PAY" => Some(PaymentMethod::ApplePay),
            "STC_PAY" => Some(PaymentMethod::StcPay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Authorized,
    Paid,
    PartiallyRefunded,
    Refunded,
    Failed,
    Voided,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Voided => "VOIDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "AUTHORIZED" => Some(PaymentStatus::Authorized),
            "PAID" => Some(PaymentStatus::Paid),
            "PARTIALLY_REFUNDED" => Some(PaymentStatus::PartiallyRefunded),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "FAILED" => Some(PaymentStatus::Failed),
            "VOIDED" => Some(PaymentStatus::Voided),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Refunded | PaymentStatus::Failed | PaymentStatus::Voided
        )
    }

    /// Forward-only lifecycle: PENDING -> PROCESSING -> AUTHORIZED -> PAID
    /// -> {PARTIALLY_REFUNDED, REFUNDED}, with FAILED and VOIDED reachable
    /// from any non-terminal state. Nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        match (self, next) {
            (_, PaymentStatus::Failed) | (_, PaymentStatus::Voided) => true,
            (PaymentStatus::Pending, PaymentStatus::Processing)
            | (PaymentStatus::Pending, PaymentStatus::Authorized)
            | (PaymentStatus::Pending, PaymentStatus::Paid)
            | (PaymentStatus::Processing, PaymentStatus::Authorized)
            | (PaymentStatus::Processing, PaymentStatus::Paid)
            | (PaymentStatus::Authorized, PaymentStatus::Paid)
            | (PaymentStatus::Paid, PaymentStatus::PartiallyRefunded)
            | (PaymentStatus::Paid, PaymentStatus::Refunded)
            | (PaymentStatus::PartiallyRefunded, PaymentStatus::Refunded) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardMetadata {
    pub brand: Option<String>,
    pub last_four: Option<String>,
    pub token: Option<String>,
}

/// Payment source supplied on create. Raw card fields are forwarded to the
/// provider and never persisted; only a reusable token plus display metadata
/// come back into the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentSource {
    Token { token: String },
    Card(CardDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub name: String,
    pub month: u8,
    pub year: u16,
    pub cvc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<PaymentSource>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefundRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Canonical ledger row. Amounts are always major currency units; minor-unit
/// integers stop at the connector boundary.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub psp_provider: PspProvider,
    pub psp_transaction_id: Option<String>,
    pub amount: Decimal,
    pub refunded_amount: Decimal,
    pub fee: Option<Decimal>,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub card: Option<CardMetadata>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub callback_url: Option<String>,
    pub error_message: Option<String>,
    pub psp_reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub request_hash: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Merchant-facing view. The provider's own transaction id never leaves the
/// ledger; the system id is the only identity merchants see.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub refunded_amount: Decimal,
    pub fee: Option<Decimal>,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub psp_provider: PspProvider,
    pub card: Option<CardMetadata>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub callback_url: Option<String>,
    pub error_message: Option<String>,
    pub psp_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionView {
    fn from(txn: &Transaction) -> Self {
        TransactionView {
            id: txn.id,
            status: txn.status,
            amount: txn.amount,
            refunded_amount: txn.refunded_amount,
            fee: txn.fee,
            currency: txn.currency,
            payment_method: txn.payment_method,
            psp_provider: txn.psp_provider,
            card: txn.card.clone(),
            metadata: txn.metadata.clone(),
            callback_url: txn.callback_url.clone(),
            error_message: txn.error_message.clone(),
            psp_reference: txn.psp_reference.clone(),
            created_at: txn.created_at,
            updated_at: txn.updated_at,
        }
    }
}

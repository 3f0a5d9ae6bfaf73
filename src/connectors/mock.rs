use crate::connectors::{
    to_major_units, ConnectorPaymentRequest, ConnectorPaymentResponse, ConnectorRefundRequest,
    ConnectorRefundResponse, ProviderEvent, PspConnector, WebhookEventKind,
};
use crate::domain::transaction::{PaymentStatus, PspProvider};
use crate::error::CoreError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Deterministic in-process provider for local development and tests.
/// Behavior strings mirror the provider's synchronous answer on create;
/// stored payments can be advanced out of band with `set_status` to stand in
/// for provider-side progress between polls.
#[derive(Debug)]
pub struct MockConnector {
    pub behavior: String,
    payments: Mutex<HashMap<String, ConnectorPaymentResponse>>,
}

impl MockConnector {
    pub fn new(behavior: &str) -> Self {
        MockConnector {
            behavior: behavior.to_string(),
            payments: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_status(&self, psp_transaction_id: &str, status: PaymentStatus) {
        if let Some(payment) = self
            .payments
            .lock()
            .expect("mock connector state poisoned")
            .get_mut(psp_transaction_id)
        {
            payment.status = status;
        }
    }

    fn store(&self, response: ConnectorPaymentResponse) -> ConnectorPaymentResponse {
        self.payments
            .lock()
            .expect("mock connector state poisoned")
            .insert(response.psp_transaction_id.clone(), response.clone());
        response
    }
}

#[async_trait::async_trait]
impl PspConnector for MockConnector {
    fn provider(&self) -> PspProvider {
        PspProvider::Mock
    }

    async fn create_payment(
        &self,
        request: &ConnectorPaymentRequest,
    ) -> Result<ConnectorPaymentResponse, CoreError> {
        let status = match self.behavior.as_str() {
            "ALWAYS_ERROR" => {
                return Err(CoreError::Provider {
                    provider: PspProvider::Mock,
                    kind: Some("mock_declined".to_string()),
                    message: "mock provider rejected the call".to_string(),
                })
            }
            "ALWAYS_PENDING" => PaymentStatus::Pending,
            "ALWAYS_FAILED" => PaymentStatus::Failed,
            _ => PaymentStatus::Paid,
        };

        let response = ConnectorPaymentResponse {
            psp_transaction_id: format!("mock_{}", Uuid::new_v4()),
            status,
            amount: request.amount,
            fee: None,
            card: None,
            psp_reference: Some("MOCK_AUTH".to_string()),
            error_message: None,
        };
        Ok(self.store(response))
    }

    async fn get_payment(
        &self,
        psp_transaction_id: &str,
    ) -> Result<ConnectorPaymentResponse, CoreError> {
        self.payments
            .lock()
            .expect("mock connector state poisoned")
            .get(psp_transaction_id)
            .cloned()
            .ok_or(CoreError::NotFound("provider payment"))
    }

    async fn refund_payment(
        &self,
        psp_transaction_id: &str,
        refund: &ConnectorRefundRequest,
    ) -> Result<ConnectorRefundResponse, CoreError> {
        let mut payments = self.payments.lock().expect("mock connector state poisoned");
        let payment = payments
            .get_mut(psp_transaction_id)
            .ok_or(CoreError::NotFound("provider payment"))?;

        let refunded = refund.amount.unwrap_or(payment.amount);
        payment.status = if refunded >= payment.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };

        Ok(ConnectorRefundResponse {
            refunded_amount: refunded,
            status: payment.status,
            psp_reference: Some(format!("mock_refund_{}", Uuid::new_v4())),
        })
    }

    async fn void_payment(&self, psp_transaction_id: &str) -> Result<(), CoreError> {
        let mut payments = self.payments.lock().expect("mock connector state poisoned");
        let payment = payments
            .get_mut(psp_transaction_id)
            .ok_or(CoreError::NotFound("provider payment"))?;
        payment.status = PaymentStatus::Voided;
        Ok(())
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, CoreError> {
        let raw: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| CoreError::Validation(format!("malformed webhook body: {e}")))?;
        let envelope: MockWebhook = serde_json::from_value(raw.clone())
            .map_err(|e| CoreError::Validation(format!("malformed webhook body: {e}")))?;

        Ok(ProviderEvent {
            kind: WebhookEventKind::parse(&envelope.kind),
            psp_transaction_id: envelope.data.id,
            status: envelope.data.status.as_deref().and_then(PaymentStatus::parse),
            refunded_amount: envelope.data.refunded.map(to_major_units),
            error_message: envelope.data.message,
            raw,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MockWebhook {
    #[serde(rename = "type")]
    kind: String,
    data: MockWebhookData,
}

#[derive(Debug, Deserialize)]
struct MockWebhookData {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    refunded: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

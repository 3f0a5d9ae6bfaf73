use crate::connectors::{
    to_major_units, to_minor_units, ConnectorPaymentRequest, ConnectorPaymentResponse,
    ConnectorRefundRequest, ConnectorRefundResponse, ProviderEvent, PspConnector,
    WebhookEventKind,
};
use crate::domain::transaction::{CardMetadata, PaymentSource, PaymentStatus, PspProvider};
use crate::error::CoreError;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Moyasar REST connector. The wire protocol amounts are integer halalas;
/// conversion to and from canonical major units happens here and nowhere
/// else. Authentication is HTTP Basic with the API key as username and an
/// empty password.
#[derive(Debug)]
pub struct MoyasarConnector {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl MoyasarConnector {
    pub fn new(base_url: String, api_key: String, timeout: Duration, client: reqwest::Client) -> Self {
        MoyasarConnector {
            base_url,
            api_key,
            timeout,
            client,
        }
    }

    fn provider_error(&self, kind: Option<String>, message: String) -> CoreError {
        CoreError::Provider {
            provider: PspProvider::Moyasar,
            kind,
            message,
        }
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<MoyasarPayment, CoreError> {
        let response = request
            .basic_auth(&self.api_key, Some(""))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timeout" } else { "transport" };
                self.provider_error(Some(kind.to_string()), e.to_string())
            })?;

        let http_status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.provider_error(Some("transport".to_string()), e.to_string()))?;

        if http_status == reqwest::StatusCode::NOT_FOUND {
            return Err(CoreError::NotFound("provider payment"));
        }
        if !http_status.is_success() {
            let err: MoyasarError = serde_json::from_slice(&body).unwrap_or_default();
            return Err(self.provider_error(
                err.kind.or(Some(format!("http_{}", http_status.as_u16()))),
                err.message
                    .unwrap_or_else(|| String::from_utf8_lossy(&body).chars().take(200).collect()),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|e| self.provider_error(Some("malformed_response".to_string()), e.to_string()))
    }
}

#[async_trait::async_trait]
impl PspConnector for MoyasarConnector {
    fn provider(&self) -> PspProvider {
        PspProvider::Moyasar
    }

    async fn create_payment(
        &self,
        request: &ConnectorPaymentRequest,
    ) -> Result<ConnectorPaymentResponse, CoreError> {
        let mut body = json!({
            "amount": to_minor_units(request.amount),
            "currency": request.currency.as_str(),
        });
        if let Some(description) = &request.description {
            body["description"] = json!(description);
        }
        if let Some(callback_url) = &request.callback_url {
            body["callback_url"] = json!(callback_url);
        }
        if !request.metadata.is_empty() {
            body["metadata"] = serde_json::Value::Object(request.metadata.clone());
        }
        if let Some(source) = &request.source {
            body["source"] = wire_source(source);
        }

        let payment = self
            .execute(self.client.post(format!("{}/v1/payments", self.base_url)).json(&body))
            .await?;
        Ok(payment.into_response())
    }

    async fn get_payment(
        &self,
        psp_transaction_id: &str,
    ) -> Result<ConnectorPaymentResponse, CoreError> {
        let payment = self
            .execute(
                self.client
                    .get(format!("{}/v1/payments/{}", self.base_url, psp_transaction_id)),
            )
            .await?;
        Ok(payment.into_response())
    }

    async fn refund_payment(
        &self,
        psp_transaction_id: &str,
        refund: &ConnectorRefundRequest,
    ) -> Result<ConnectorRefundResponse, CoreError> {
        let mut body = json!({});
        if let Some(amount) = refund.amount {
            body["amount"] = json!(to_minor_units(amount));
        }

        let payment = self
            .execute(
                self.client
                    .post(format!(
                        "{}/v1/payments/{}/refund",
                        self.base_url, psp_transaction_id
                    ))
                    .json(&body),
            )
            .await?;

        let refunded = payment
            .refunded
            .map(to_major_units)
            .or(refund.amount)
            .unwrap_or_else(|| to_major_units(payment.amount));
        Ok(ConnectorRefundResponse {
            refunded_amount: refunded,
            status: map_status(&payment.status),
            psp_reference: payment.reference_number.clone(),
        })
    }

    async fn void_payment(&self, psp_transaction_id: &str) -> Result<(), CoreError> {
        self.execute(
            self.client
                .post(format!("{}/v1/payments/{}/void", self.base_url, psp_transaction_id)),
        )
        .await?;
        Ok(())
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, CoreError> {
        let raw: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| CoreError::Validation(format!("malformed webhook body: {e}")))?;
        let envelope: MoyasarWebhook = serde_json::from_value(raw.clone())
            .map_err(|e| CoreError::Validation(format!("malformed webhook body: {e}")))?;
        let data = envelope.data;

        Ok(ProviderEvent {
            kind: WebhookEventKind::parse(&envelope.kind),
            psp_transaction_id: data.id,
            status: Some(map_status(&data.status)),
            refunded_amount: data.refunded.map(to_major_units),
            error_message: data.message,
            raw,
        })
    }
}

fn wire_source(source: &PaymentSource) -> serde_json::Value {
    match source {
        PaymentSource::Token { token } => json!({ "type": "token", "token": token }),
        PaymentSource::Card(card) => json!({
            "type": "creditcard",
            "number": card.number,
            "name": card.name,
            "month": card.month,
            "year": card.year,
            "cvc": card.cvc,
        }),
    }
}

/// Fixed provider-status vocabulary. Anything Moyasar starts emitting that
/// is not in this table lands on FAILED, never on a success state.
fn map_status(provider_status: &str) -> PaymentStatus {
    match provider_status {
        "initiated" => PaymentStatus::Pending,
        "authorized" => PaymentStatus::Authorized,
        "paid" | "captured" => PaymentStatus::Paid,
        "refunded" => PaymentStatus::Refunded,
        "partially_refunded" => PaymentStatus::PartiallyRefunded,
        "voided" => PaymentStatus::Voided,
        "failed" => PaymentStatus::Failed,
        _ => PaymentStatus::Failed,
    }
}

#[derive(Debug, Deserialize)]
struct MoyasarPayment {
    id: String,
    status: String,
    amount: i64,
    #[serde(default)]
    fee: Option<i64>,
    #[serde(default)]
    refunded: Option<i64>,
    #[serde(default)]
    reference_number: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    source: Option<MoyasarSource>,
}

#[derive(Debug, Deserialize)]
struct MoyasarSource {
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    last_digits: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MoyasarError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoyasarWebhook {
    #[serde(rename = "type")]
    kind: String,
    data: MoyasarWebhookData,
}

#[derive(Debug, Deserialize)]
struct MoyasarWebhookData {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    refunded: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl MoyasarPayment {
    fn into_response(self) -> ConnectorPaymentResponse {
        let card = self.source.as_ref().and_then(|s| {
            if s.company.is_none() && s.last_digits.is_none() && s.token.is_none() {
                None
            } else {
                Some(CardMetadata {
                    brand: s.company.clone(),
                    last_four: s.last_digits.clone(),
                    token: s.token.clone(),
                })
            }
        });

        ConnectorPaymentResponse {
            psp_transaction_id: self.id,
            status: map_status(&self.status),
            amount: to_major_units(self.amount),
            fee: self.fee.map(to_major_units),
            card,
            psp_reference: self.reference_number,
            error_message: self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn maps_every_known_provider_status() {
        assert_eq!(map_status("initiated"), PaymentStatus::Pending);
        assert_eq!(map_status("authorized"), PaymentStatus::Authorized);
        assert_eq!(map_status("paid"), PaymentStatus::Paid);
        assert_eq!(map_status("captured"), PaymentStatus::Paid);
        assert_eq!(map_status("refunded"), PaymentStatus::Refunded);
        assert_eq!(map_status("voided"), PaymentStatus::Voided);
        assert_eq!(map_status("failed"), PaymentStatus::Failed);
    }

    #[test]
    fn unknown_provider_status_fails_safe() {
        for status in ["settled", "on_hold", "", "PAID"] {
            assert_eq!(map_status(status), PaymentStatus::Failed);
        }
    }

    #[test]
    fn wire_amounts_become_major_units() {
        let payment = MoyasarPayment {
            id: "pay_abc".to_string(),
            status: "paid".to_string(),
            amount: 10050,
            fee: Some(251),
            refunded: None,
            reference_number: Some("ref_1".to_string()),
            message: None,
            source: Some(MoyasarSource {
                company: Some("mada".to_string()),
                last_digits: Some("1111".to_string()),
                token: None,
            }),
        };

        let response = payment.into_response();
        assert_eq!(response.amount, dec!(100.50));
        assert_eq!(response.fee, Some(dec!(2.51)));
        assert_eq!(response.status, PaymentStatus::Paid);
        assert_eq!(response.card.unwrap().last_four.as_deref(), Some("1111"));
    }

    #[test]
    fn parses_refund_webhook_with_cumulative_refunded_amount() {
        let connector = MoyasarConnector::new(
            "https://api.moyasar.test".to_string(),
            "sk_test".to_string(),
            Duration::from_secs(5),
            reqwest::Client::new(),
        );
        let body = br#"{
            "type": "payment_refunded",
            "data": {"id": "pay_1", "status": "refunded", "amount": 10050, "refunded": 5025}
        }"#;

        let event = connector.parse_webhook(body).unwrap();
        assert_eq!(event.kind, WebhookEventKind::PaymentRefunded);
        assert_eq!(event.psp_transaction_id, "pay_1");
        assert_eq!(event.refunded_amount, Some(dec!(50.25)));
    }

    #[test]
    fn unrecognized_event_type_is_reported_not_dropped() {
        let connector = MoyasarConnector::new(
            "https://api.moyasar.test".to_string(),
            "sk_test".to_string(),
            Duration::from_secs(5),
            reqwest::Client::new(),
        );
        let body = br#"{"type": "balance_updated", "data": {"id": "pay_2", "status": "paid"}}"#;

        let event = connector.parse_webhook(body).unwrap();
        assert_eq!(event.kind, WebhookEventKind::Unknown("balance_updated".to_string()));
    }

    #[test]
    fn card_source_is_translated_to_the_provider_shape() {
        let source = PaymentSource::Card(crate::domain::transaction::CardDetails {
            number: "4111111111111111".to_string(),
            name: "A HOLDER".to_string(),
            month: 12,
            year: 2030,
            cvc: "123".to_string(),
        });
        let wire = wire_source(&source);
        assert_eq!(wire["type"], "creditcard");
        assert_eq!(wire["number"], "4111111111111111");

        let token = PaymentSource::Token {
            token: "tok_1".to_string(),
        };
        let wire = wire_source(&token);
        assert_eq!(wire["type"], "token");
    }
}

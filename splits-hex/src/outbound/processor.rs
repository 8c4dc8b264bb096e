//! Payment processor adapters.
//!
//! [`HttpPaymentProcessor`] talks to the processor's REST API with
//! form-encoded requests and a bearer secret key. [`DryRunProcessor`] is an
//! explicit opt-in for local runs: it moves no money and says so in the logs.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use splits_types::{
    CheckoutSession, CheckoutSessionRequest, PaymentProcessor, PayoutRequest, ProcessorError,
};

/// Connection settings for the processor API.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Base URL, e.g. `https://api.processor.example`
    pub api_url: String,
    pub secret_key: String,
    pub timeout: Duration,
}

/// Processor adapter backed by its HTTP API.
#[derive(Clone)]
pub struct HttpPaymentProcessor {
    config: ProcessorConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpPaymentProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;

        Ok(Self {
            config: ProcessorConfig {
                api_url: config.api_url.trim_end_matches('/').to_string(),
                ..config
            },
            http,
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, ProcessorError> {
        let mut request = self
            .http
            .post(format!("{}{}", self.config.api_url, path))
            .bearer_auth(&self.config.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProcessorError::Unavailable(format!("unreadable response: {}", e)));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(classify_failure(status, &body))
    }
}

/// 5xx and 429 are worth retrying later; any other refusal is final.
fn classify_failure(status: StatusCode, body: &str) -> ProcessorError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("status {}: {}", status.as_u16(), body));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProcessorError::Unavailable(message)
    } else {
        ProcessorError::Rejected(message)
    }
}

fn push_metadata(form: &mut Vec<(String, String)>, prefix: &str, metadata: &BTreeMap<String, String>) {
    for (key, value) in metadata {
        form.push((format!("{}[{}]", prefix, key), value.clone()));
    }
}

fn transfer_form(request: &PayoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount_minor.to_string()),
        ("currency".to_string(), request.currency.processor_code()),
        ("destination".to_string(), request.destination.clone()),
    ];
    push_metadata(&mut form, "metadata", &request.metadata);
    form
}

fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let item = "line_items[0]";
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            format!("{}[price_data][currency]", item),
            request.currency.processor_code(),
        ),
        (
            format!("{}[price_data][product_data][name]", item),
            request.product_name.clone(),
        ),
        (
            format!("{}[price_data][unit_amount]", item),
            request.unit_amount_minor.to_string(),
        ),
        (format!("{}[quantity]", item), request.quantity.to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    if !request.description.is_empty() {
        form.push((
            format!("{}[price_data][product_data][description]", item),
            request.description.clone(),
        ));
    }
    // The payment-intent copy lets confirmation events find the payment too.
    push_metadata(&mut form, "metadata", &request.metadata);
    push_metadata(&mut form, "payment_intent_data[metadata]", &request.metadata);
    form
}

#[async_trait::async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    #[tracing::instrument(skip_all, fields(destination = %request.destination, amount_minor = request.amount_minor))]
    async fn create_transfer(&self, request: PayoutRequest) -> Result<String, ProcessorError> {
        let response: TransferResponse = self
            .post_form(
                "/v1/transfers",
                &transfer_form(&request),
                Some(&request.idempotency_key),
            )
            .await?;
        Ok(response.id)
    }

    #[tracing::instrument(skip_all, fields(quantity = request.quantity))]
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let response: SessionResponse = self
            .post_form("/v1/checkout/sessions", &session_form(&request), None)
            .await?;
        Ok(CheckoutSession {
            id: response.id,
            url: response.url,
        })
    }
}

/// Processor stand-in that never contacts the network.
///
/// Transfers succeed with a `dry_tr_` id and checkout sessions point back at
/// the application itself.
#[derive(Debug, Clone)]
pub struct DryRunProcessor {
    app_url: String,
}

impl DryRunProcessor {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PaymentProcessor for DryRunProcessor {
    async fn create_transfer(&self, request: PayoutRequest) -> Result<String, ProcessorError> {
        let id = format!("dry_tr_{}", uuid::Uuid::new_v4().simple());
        tracing::warn!(
            external_id = %id,
            destination = %request.destination,
            amount_minor = request.amount_minor,
            "dry-run processor: no money moved"
        );
        Ok(id)
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let id = format!("cs_dry_{}", uuid::Uuid::new_v4().simple());
        tracing::warn!(session_id = %id, product = %request.product_name, "dry-run processor: checkout session simulated");
        Ok(CheckoutSession {
            url: format!("{}/checkout/dry-run/{}", self.app_url, id),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splits_types::Currency;

    fn metadata() -> BTreeMap<String, String> {
        BTreeMap::from([("payment_id".to_string(), "p1".to_string())])
    }

    fn has(form: &[(String, String)], key: &str, value: &str) -> bool {
        form.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn test_transfer_form_uses_minor_units_and_metadata() {
        let form = transfer_form(&PayoutRequest {
            amount_minor: 4500,
            currency: Currency::USD,
            destination: "acct_1".into(),
            idempotency_key: "t1".into(),
            metadata: metadata(),
        });
        assert!(has(&form, "amount", "4500"));
        assert!(has(&form, "currency", "usd"));
        assert!(has(&form, "destination", "acct_1"));
        assert!(has(&form, "metadata[payment_id]", "p1"));
    }

    #[test]
    fn test_session_form_copies_metadata_to_payment_intent() {
        let form = session_form(&CheckoutSessionRequest {
            product_name: "Kit".into(),
            description: String::new(),
            unit_amount_minor: 29999,
            quantity: 2,
            currency: Currency::USD,
            success_url: "http://localhost/success".into(),
            cancel_url: "http://localhost/cancel".into(),
            metadata: metadata(),
        });
        assert!(has(&form, "line_items[0][price_data][unit_amount]", "29999"));
        assert!(has(&form, "line_items[0][quantity]", "2"));
        assert!(has(&form, "metadata[payment_id]", "p1"));
        assert!(has(&form, "payment_intent_data[metadata][payment_id]", "p1"));
    }

    #[test]
    fn test_classify_failure() {
        let body = r#"{"error":{"message":"Insufficient platform balance"}}"#;
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, body),
            ProcessorError::Rejected("Insufficient platform balance".into())
        );
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "oops"),
            ProcessorError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            ProcessorError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_dry_run_processor_simulates() {
        let processor = DryRunProcessor::new("http://localhost:3000/");
        let id = processor
            .create_transfer(PayoutRequest {
                amount_minor: 100,
                currency: Currency::USD,
                destination: "acct".into(),
                idempotency_key: "k".into(),
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        assert!(id.starts_with("dry_tr_"));
    }
}

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::{config::PaymentConfig, error::AppError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Provider(String),
    #[error("payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err.to_string())
    }
}

/// Body of a transaction initialization call.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub amount: f64,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    pub callback_url: String,
    pub return_url: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    pub checkout_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Verification {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "amount_from_any")]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
}

impl Verification {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// The provider reports amounts either as numbers or as decimal strings.
fn amount_from_any<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => Ok(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        _ => Ok(0.0),
    }
}

fn message_text(message: &serde_json::Value) -> String {
    match message {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "no message".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, req: &CheckoutRequest) -> Result<Checkout, GatewayError>;
    async fn verify(&self, tx_ref: &str) -> Result<Verification, GatewayError>;
}

/// Chapa REST client.
#[derive(Clone)]
pub struct ChapaClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl ChapaClient {
    pub fn new(cfg: &PaymentConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build payment http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    async fn read<T: DeserializeOwned>(
        resp: reqwest::Response,
        action: &str,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.map_err(|e| {
            warn!(error = %e, %status, action, "unreadable provider response");
            GatewayError::Provider(format!("payment {action} failed: unreadable response"))
        })?;
        if !status.is_success() {
            warn!(%status, action, "provider rejected request");
        }
        parse_body(status.is_success(), body, action)
    }
}

/// Unwraps the provider's `{message, status, data}` envelope.
fn parse_body<T: DeserializeOwned>(
    ok: bool,
    mut body: serde_json::Value,
    action: &str,
) -> Result<T, GatewayError> {
    if !ok {
        let msg = message_text(body.get("message").unwrap_or(&serde_json::Value::Null));
        return Err(GatewayError::Provider(format!("payment {action} failed: {msg}")));
    }
    match body.get_mut("data").map(serde_json::Value::take) {
        Some(data) if !data.is_null() => serde_json::from_value(data).map_err(|e| {
            GatewayError::Provider(format!("payment {action} failed: unexpected data ({e})"))
        }),
        _ => Err(GatewayError::Provider(format!(
            "payment {action} failed: response has no data"
        ))),
    }
}

#[async_trait]
impl PaymentGateway for ChapaClient {
    async fn initialize(&self, req: &CheckoutRequest) -> Result<Checkout, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(req)
            .send()
            .await?;
        let checkout: Checkout = Self::read(resp, "initialization").await?;
        debug!(tx_ref = %req.tx_ref, "payment initialized");
        Ok(checkout)
    }

    async fn verify(&self, tx_ref: &str) -> Result<Verification, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, tx_ref))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let verification: Verification = Self::read(resp, "verification").await?;
        debug!(tx_ref, status = %verification.status, "payment verified");
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::testing::serve_stub;

    const SECRET: &str = "sk-test";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some(format!("Bearer {SECRET}").as_str())
    }

    fn rejected(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
        (
            status,
            Json(json!({"message": message, "status": "failed", "data": null})),
        )
    }

    /// Mimics the provider: bearer auth, one known paid transaction.
    fn provider() -> Router {
        Router::new()
            .route(
                "/transaction/initialize",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    if !authorized(&headers) {
                        return rejected(StatusCode::UNAUTHORIZED, "Invalid API Key");
                    }
                    let tx_ref = body["tx_ref"].as_str().unwrap_or_default().to_string();
                    (
                        StatusCode::OK,
                        Json(json!({
                            "message": "Hosted Link",
                            "status": "success",
                            "data": {"checkout_url": format!("https://checkout.test/{tx_ref}")}
                        })),
                    )
                }),
            )
            .route(
                "/transaction/verify/:tx_ref",
                get(|headers: HeaderMap, Path(tx_ref): Path<String>| async move {
                    if !authorized(&headers) {
                        return rejected(StatusCode::UNAUTHORIZED, "Invalid API Key");
                    }
                    if tx_ref != "recipe_paid_1" {
                        return rejected(StatusCode::NOT_FOUND, "Transaction not found");
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "message": "Payment details",
                            "status": "success",
                            "data": {"status": "success", "amount": "150.00", "currency": "ETB"}
                        })),
                    )
                }),
            )
    }

    async fn client(secret: &str) -> ChapaClient {
        let base_url = serve_stub(provider()).await;
        ChapaClient::new(&PaymentConfig {
            secret_key: secret.into(),
            base_url: format!("{base_url}/"),
            currency: "ETB".into(),
            callback_url: "http://localhost:8000/payment/webhook".into(),
            return_url: "http://localhost:3000/payment/success".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn checkout_request(tx_ref: &str) -> CheckoutRequest {
        CheckoutRequest {
            amount: 150.0,
            currency: "ETB".into(),
            email: "buyer@example.com".into(),
            first_name: "Abebe".into(),
            last_name: "Kebede".into(),
            tx_ref: tx_ref.into(),
            callback_url: "http://localhost:8000/payment/webhook".into(),
            return_url: "http://localhost:3000/payment/success".into(),
            description: "Purchase recipe".into(),
        }
    }

    #[tokio::test]
    async fn client_initializes_with_bearer_secret() {
        let chapa = client(SECRET).await;
        let checkout = chapa.initialize(&checkout_request("recipe_new_1")).await.unwrap();
        assert_eq!(checkout.checkout_url, "https://checkout.test/recipe_new_1");
    }

    #[tokio::test]
    async fn client_verifies_by_reference_path() {
        let chapa = client(SECRET).await;
        let v = chapa.verify("recipe_paid_1").await.unwrap();
        assert!(v.is_success());
        assert_eq!(v.amount, 150.0);
        assert_eq!(v.currency, "ETB");

        let err = chapa.verify("recipe_other_2").await.unwrap_err();
        assert_eq!(err.to_string(), "payment verification failed: Transaction not found");
    }

    #[tokio::test]
    async fn client_surfaces_rejected_secret() {
        let chapa = client("sk-wrong").await;
        let err = chapa.initialize(&checkout_request("recipe_new_1")).await.unwrap_err();
        assert!(matches!(&err, GatewayError::Provider(m) if m.ends_with("Invalid API Key")));
    }

    #[test]
    fn verification_accepts_string_or_number_amounts() {
        let v: Verification =
            serde_json::from_str(r#"{"status":"success","amount":"150.50","currency":"ETB"}"#).unwrap();
        assert!(v.is_success());
        assert_eq!(v.currency, "ETB");
        assert_eq!(v.amount, 150.5);

        let v: Verification =
            serde_json::from_str(r#"{"status":"failed","amount":99}"#).unwrap();
        assert!(!v.is_success());
        assert_eq!(v.amount, 99.0);
    }

    #[test]
    fn body_yields_checkout_url() {
        let body = serde_json::json!({
            "message": "Hosted Link",
            "status": "success",
            "data": {"checkout_url": "https://checkout.chapa.co/x"}
        });
        let checkout: Checkout = parse_body(true, body, "initialization").unwrap();
        assert_eq!(checkout.checkout_url, "https://checkout.chapa.co/x");
    }

    #[test]
    fn rejected_body_carries_provider_message() {
        let body = serde_json::json!({"message": "Invalid API Key", "status": "failed", "data": null});
        let err = parse_body::<Checkout>(false, body, "initialization").unwrap_err();
        assert_eq!(err.to_string(), "payment initialization failed: Invalid API Key");
    }

    #[test]
    fn success_without_data_is_an_error() {
        let body = serde_json::json!({"message": "ok", "status": "success", "data": null});
        assert!(parse_body::<Verification>(true, body, "verification").is_err());
    }

    #[test]
    fn provider_messages_are_flattened() {
        assert_eq!(message_text(&serde_json::json!("Invalid API Key")), "Invalid API Key");
        assert_eq!(
            message_text(&serde_json::json!({"email": ["invalid"]})),
            r#"{"email":["invalid"]}"#
        );
    }

    #[test]
    fn gateway_errors_surface_as_gateway() {
        let err: AppError = GatewayError::Provider("payment initialization failed: nope".into()).into();
        assert!(matches!(err, AppError::Gateway(m) if m.contains("nope")));
    }
}

use axum::{extract::State, middleware::from_fn_with_state, routing::post, Extension, Router};
use serde_json::Value;
use tracing::instrument;

use crate::{
    auth::middleware::{require_auth, Identity},
    error::{AppJson, AppResult},
    payments::dto::{InitializePaymentRequest, PaymentResponse, VerifyPaymentRequest, WebhookAck},
    state::AppState,
};

// --- routers ---

pub fn gated_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/payment/initialize", post(initialize))
        .route("/payment/verify", post(verify))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

/// The provider calls back without credentials.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payment/webhook", post(webhook))
}

// --- handlers ---

#[instrument(skip(state, payload))]
pub async fn initialize(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(payload): AppJson<InitializePaymentRequest>,
) -> AppResult<AppJson<PaymentResponse>> {
    let init = state
        .payments
        .initialize(identity.user_id, payload.recipe_id, payload.amount)
        .await?;
    Ok(AppJson(PaymentResponse {
        success: true,
        message: "Payment initialized successfully".into(),
        checkout_url: Some(init.checkout_url),
        tx_ref: Some(init.tx_ref),
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyPaymentRequest>,
) -> AppResult<AppJson<PaymentResponse>> {
    let out = state.payments.verify(&payload.tx_ref).await?;
    Ok(AppJson(PaymentResponse {
        success: out.verification.is_success(),
        message: format!("Payment {}", out.verification.status),
        checkout_url: None,
        tx_ref: Some(out.purchase.payment_reference),
    }))
}

#[instrument(skip(state, payload))]
pub async fn webhook(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Value>,
) -> AppResult<AppJson<WebhookAck>> {
    state.payments.handle_webhook(&payload).await?;
    Ok(AppJson(WebhookAck {
        status: "processed",
    }))
}

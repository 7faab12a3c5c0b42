use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::repo::UserStore,
    config::PaymentConfig,
    error::{AppError, AppResult},
    events::EventSink,
    payments::{
        gateway::{CheckoutRequest, PaymentGateway, Verification},
        repo::PurchaseStore,
        repo_types::{NewPurchase, PurchaseStatus, RecipePurchase, Settlement},
    },
};

pub const PAYMENT_METHOD: &str = "chapa";
pub const RECIPE_PURCHASED: &str = "recipe_purchased";

/// `recipe_<8 hex>_<unix seconds>`
pub(crate) fn generate_tx_ref() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("recipe_{}_{}", &id[..8], OffsetDateTime::now_utc().unix_timestamp())
}

/// A tx_ref ends up in the provider's URL path, so only a safe alphabet passes.
fn validate_tx_ref(tx_ref: &str) -> AppResult<&str> {
    let tx_ref = tx_ref.trim();
    if tx_ref.is_empty() {
        return Err(AppError::validation("Transaction reference required"));
    }
    let safe = tx_ref.len() <= 128
        && tx_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !safe {
        return Err(AppError::validation(
            "Invalid request data: malformed transaction reference",
        ));
    }
    Ok(tx_ref)
}

fn status_for(verification: &Verification) -> PurchaseStatus {
    if verification.is_success() {
        PurchaseStatus::Completed
    } else {
        PurchaseStatus::Failed
    }
}

#[derive(Debug, Clone)]
pub struct Initialized {
    pub checkout_url: String,
    pub tx_ref: String,
}

/// Result of reconciling a purchase against the provider.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub verification: Verification,
    pub purchase: RecipePurchase,
}

pub struct PaymentService {
    users: Arc<dyn UserStore>,
    purchases: Arc<dyn PurchaseStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventSink>,
    cfg: PaymentConfig,
}

impl PaymentService {
    pub fn new(
        users: Arc<dyn UserStore>,
        purchases: Arc<dyn PurchaseStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventSink>,
        cfg: PaymentConfig,
    ) -> Self {
        Self {
            users,
            purchases,
            gateway,
            events,
            cfg,
        }
    }

    pub async fn initialize(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        amount: f64,
    ) -> AppResult<Initialized> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::validation(
                "Invalid request data: amount must be greater than 0",
            ));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let tx_ref = generate_tx_ref();
        let checkout = self
            .gateway
            .initialize(&CheckoutRequest {
                amount,
                currency: self.cfg.currency.clone(),
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                tx_ref: tx_ref.clone(),
                callback_url: self.cfg.callback_url.clone(),
                return_url: self.cfg.return_url.clone(),
                description: format!("Purchase recipe - {recipe_id}"),
            })
            .await
            .map_err(|e| {
                warn!(error = %e, %tx_ref, "gateway refused initialization");
                AppError::from(e)
            })?;

        let purchase = self
            .purchases
            .create(NewPurchase {
                recipe_id,
                user_id,
                amount,
                payment_method: PAYMENT_METHOD.to_string(),
                payment_reference: tx_ref.clone(),
            })
            .await
            .map_err(|e| {
                error!(error = %e, %tx_ref, "purchase not recorded; provider transaction is orphaned");
                AppError::Persistence("Failed to create purchase record".into())
            })?;

        info!(purchase_id = %purchase.id, %tx_ref, %recipe_id, "payment initialized");
        Ok(Initialized {
            checkout_url: checkout.checkout_url,
            tx_ref,
        })
    }

    /// Client-initiated poll.
    pub async fn verify(&self, tx_ref: &str) -> AppResult<Reconciled> {
        let tx_ref = validate_tx_ref(tx_ref)?;
        self.reconcile(tx_ref).await
    }

    /// Provider-initiated notification; the payload only needs a `tx_ref`.
    pub async fn handle_webhook(&self, payload: &Value) -> AppResult<Reconciled> {
        let tx_ref = payload
            .get("tx_ref")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("Missing transaction reference"))?;
        let tx_ref = validate_tx_ref(tx_ref)?;
        self.reconcile(tx_ref).await
    }

    async fn reconcile(&self, tx_ref: &str) -> AppResult<Reconciled> {
        let verification = self.gateway.verify(tx_ref).await?;

        let purchase = self
            .purchases
            .find_by_reference(tx_ref)
            .await?
            .ok_or_else(|| AppError::not_found("Purchase record not found"))?;

        if (verification.amount - purchase.amount).abs() > 0.005
            || verification.currency != self.cfg.currency
        {
            warn!(
                purchase_id = %purchase.id,
                tx_ref,
                recorded_amount = purchase.amount,
                reported_amount = verification.amount,
                reported_currency = %verification.currency,
                "provider reports a different charge than recorded"
            );
        }

        let wanted = status_for(&verification);
        let purchase = match self.purchases.settle(purchase.id, wanted).await? {
            Settlement::Applied(purchase) => {
                info!(purchase_id = %purchase.id, tx_ref, status = %purchase.status, "purchase settled");
                if purchase.status == PurchaseStatus::Completed {
                    self.announce(&purchase).await;
                }
                purchase
            }
            Settlement::Unchanged(purchase) => {
                if purchase.status != wanted {
                    warn!(
                        purchase_id = %purchase.id,
                        tx_ref,
                        stored = %purchase.status,
                        reported = %wanted,
                        "provider disagrees with terminal purchase; keeping stored status"
                    );
                }
                purchase
            }
        };

        Ok(Reconciled {
            verification,
            purchase,
        })
    }

    async fn announce(&self, purchase: &RecipePurchase) {
        let data = json!({
            "user_id": purchase.user_id,
            "recipe_id": purchase.recipe_id,
            "amount": purchase.amount,
        });
        if let Err(e) = self
            .events
            .trigger(RECIPE_PURCHASED, data)
            .await
            .context("announce purchase")
        {
            error!(error = ?e, purchase_id = %purchase.id, "event not delivered");
        }
    }
}

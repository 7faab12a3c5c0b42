use std::{fmt, str::FromStr};

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            "failed" => Ok(PurchaseStatus::Failed),
            other => anyhow::bail!("unknown purchase status {other:?}"),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PurchaseRow {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub payment_reference: String,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipePurchase {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub payment_reference: String,
    pub status: PurchaseStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TryFrom<PurchaseRow> for RecipePurchase {
    type Error = anyhow::Error;

    fn try_from(r: PurchaseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            recipe_id: r.recipe_id,
            user_id: r.user_id,
            amount: r.amount,
            payment_method: r.payment_method,
            payment_reference: r.payment_reference,
            status: r.status.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub recipe_id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub payment_reference: String,
}

/// Outcome of moving a purchase out of `pending`.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// This call performed the `pending -> status` transition.
    Applied(RecipePurchase),
    /// The purchase was already terminal and was left as is.
    Unchanged(RecipePurchase),
}

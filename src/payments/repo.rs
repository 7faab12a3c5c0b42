use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo::StoreError,
    payments::repo_types::{NewPurchase, PurchaseRow, PurchaseStatus, RecipePurchase, Settlement},
};

const PURCHASE_COLUMNS: &str = "id, recipe_id, user_id, amount, payment_method, \
     payment_reference, status, created_at, updated_at";

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Inserts a purchase in `pending`.
    async fn create(&self, new_purchase: NewPurchase) -> Result<RecipePurchase, StoreError>;
    async fn find_by_reference(&self, tx_ref: &str)
        -> Result<Option<RecipePurchase>, StoreError>;
    /// Moves a pending purchase to `status`; terminal purchases are returned untouched.
    async fn settle(&self, id: Uuid, status: PurchaseStatus) -> Result<Settlement, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgPurchaseStore {
    pool: PgPool,
}

impl PgPurchaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_purchase(row: PurchaseRow) -> Result<RecipePurchase, StoreError> {
    RecipePurchase::try_from(row)
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))
}

#[async_trait]
impl PurchaseStore for PgPurchaseStore {
    async fn create(&self, p: NewPurchase) -> Result<RecipePurchase, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO recipe_purchases
                (recipe_id, user_id, amount, payment_method, payment_reference, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {PURCHASE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(p.recipe_id)
            .bind(p.user_id)
            .bind(p.amount)
            .bind(&p.payment_method)
            .bind(&p.payment_reference)
            .fetch_one(&self.pool)
            .await?;
        into_purchase(row)
    }

    async fn find_by_reference(
        &self,
        tx_ref: &str,
    ) -> Result<Option<RecipePurchase>, StoreError> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM recipe_purchases WHERE payment_reference = $1"
        );
        sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(tx_ref)
            .fetch_optional(&self.pool)
            .await?
            .map(into_purchase)
            .transpose()
    }

    async fn settle(&self, id: Uuid, status: PurchaseStatus) -> Result<Settlement, StoreError> {
        // Only one writer can win the pending row; everyone else reads the result.
        let sql = format!(
            r#"
            UPDATE recipe_purchases
               SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
            RETURNING {PURCHASE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = updated {
            return Ok(Settlement::Applied(into_purchase(row)?));
        }

        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM recipe_purchases WHERE id = $1");
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Settlement::Unchanged(into_purchase(row)?))
    }
}

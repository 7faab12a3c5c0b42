use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipeView {
    pub recipe_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: String,
}

#[async_trait]
pub trait RecipeViewStore: Send + Sync {
    async fn record(&self, view: NewRecipeView) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgRecipeViewStore {
    pool: PgPool,
}

impl PgRecipeViewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipeViewStore for PgRecipeViewStore {
    async fn record(&self, view: NewRecipeView) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO recipe_views (recipe_id, user_id, ip_address, user_agent)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(view.recipe_id)
        .bind(view.user_id)
        .bind(&view.ip_address)
        .bind(&view.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

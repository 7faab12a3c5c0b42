use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User},
    error::AppError,
};

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, password_hash, bio, \
     avatar, is_verified, is_active, email_verified_at, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the constraint name when known.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
                return StoreError::UniqueViolation(db.constraint().unwrap_or_default().to_string());
            }
        }
        StoreError::Database(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                AppError::Conflict(format!("Resource already exists ({constraint})"))
            }
            StoreError::Database(e) => e.into(),
        }
    }
}

/// Single-use grants tied to a user. Each kind lives in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantKind {
    PasswordReset,
    EmailVerification,
}

impl GrantKind {
    fn table(self) -> &'static str {
        match self {
            GrantKind::PasswordReset => "password_reset_tokens",
            GrantKind::EmailVerification => "email_verification_tokens",
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;
    /// Consumes an unexpired reset grant and sets the new hash in one
    /// transaction. Returns the owner, or `None` when the token is unknown or
    /// expired. On error the grant is left in place.
    async fn reset_password(
        &self,
        token: &str,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError>;
    async fn mark_email_verified(&self, id: Uuid) -> Result<(), StoreError>;

    /// Stores `token` for `user_id`, replacing any earlier grant of the same kind.
    async fn save_grant(
        &self,
        kind: GrantKind,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Deletes an unexpired grant and returns its owner. A second call with the
    /// same token finds nothing.
    async fn consume_grant(&self, kind: GrantKind, token: &str) -> Result<Option<Uuid>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash, bio, avatar)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.email)
            .bind(&new_user.username)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.password_hash)
            .bind(&new_user.bio)
            .bind(&new_user.avatar)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn reset_password(
        &self,
        token: &str,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            DELETE FROM {table}
             WHERE token = $1 AND expires_at > NOW()
            RETURNING user_id
            "#,
            table = GrantKind::PasswordReset.table()
        );
        let Some(user_id) = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(user_id))
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET is_verified = TRUE, email_verified_at = NOW(), updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_grant(
        &self,
        kind: GrantKind,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {table} (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET token = EXCLUDED.token,
                          expires_at = EXCLUDED.expires_at,
                          created_at = NOW()
            "#,
            table = kind.table()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_grant(&self, kind: GrantKind, token: &str) -> Result<Option<Uuid>, StoreError> {
        let sql = format!(
            r#"
            DELETE FROM {table}
             WHERE token = $1 AND expires_at > NOW()
            RETURNING user_id
            "#,
            table = kind.table()
        );
        let user_id = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user_id)
    }
}

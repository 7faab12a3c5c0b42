use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::Passwords,
        repo::{PgUserStore, UserStore},
        services::AuthService,
    },
    config::AppConfig,
    events::{EventSink, HasuraEvents},
    payments::{
        gateway::{ChapaClient, PaymentGateway},
        repo::{PgPurchaseStore, PurchaseStore},
        services::PaymentService,
    },
    recipes::repo::{PgRecipeViewStore, RecipeViewStore},
    storage::{LocalStorage, StorageClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub auth: Arc<AuthService>,
    pub payments: Arc<PaymentService>,
    pub storage: Arc<dyn StorageClient>,
    pub views: Arc<dyn RecipeViewStore>,
}

/// Store and outbound implementations the services are built on.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub purchases: Arc<dyn PurchaseStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: Arc<dyn EventSink>,
    pub storage: Arc<dyn StorageClient>,
    pub views: Arc<dyn RecipeViewStore>,
}

pub async fn connect_db(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

impl AppState {
    pub async fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let passwords = Passwords::new(&config.password).context("argon2 parameters")?;
        let backends = Backends {
            users: Arc::new(PgUserStore::new(db.clone())),
            purchases: Arc::new(PgPurchaseStore::new(db.clone())),
            gateway: Arc::new(ChapaClient::new(&config.payment)?),
            events: Arc::new(HasuraEvents::new(&config.hasura)?),
            storage: Arc::new(LocalStorage::new(&config.uploads).await?),
            views: Arc::new(PgRecipeViewStore::new(db)),
        };
        Ok(Self::from_parts(config, passwords, backends))
    }

    pub fn from_parts(config: AppConfig, passwords: Passwords, backends: Backends) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let auth = AuthService::new(
            backends.users.clone(),
            passwords,
            keys.clone(),
            config.tokens.clone(),
            config.jwt.refresh_requires_refresh_kind,
        );
        let payments = PaymentService::new(
            backends.users,
            backends.purchases,
            backends.gateway,
            backends.events,
            config.payment.clone(),
        );
        Self {
            config: Arc::new(config),
            keys,
            auth: Arc::new(auth),
            payments: Arc::new(payments),
            storage: backends.storage,
            views: backends.views,
        }
    }
}

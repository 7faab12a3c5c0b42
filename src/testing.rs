//! In-memory fakes for the store and outbound traits.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        password::fast_passwords,
        repo::{GrantKind, StoreError, UserStore},
        repo_types::{NewUser, User},
    },
    config::{
        AppConfig, HasuraConfig, JwtConfig, PasswordConfig, PaymentConfig, TokenTtlConfig,
        UploadConfig,
    },
    events::EventSink,
    payments::{
        gateway::{Checkout, CheckoutRequest, GatewayError, PaymentGateway, Verification},
        repo::PurchaseStore,
        repo_types::{NewPurchase, PurchaseStatus, RecipePurchase, Settlement},
    },
    recipes::repo::{NewRecipeView, RecipeViewStore},
    state::{AppState, Backends},
    storage::LocalStorage,
};

pub fn sample_user(email: &str, username: &str) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        email: email.into(),
        username: username.into(),
        first_name: "Test".into(),
        last_name: "User".into(),
        password_hash: "$argon2id$placeholder".into(),
        bio: String::new(),
        avatar: String::new(),
        is_verified: false,
        is_active: true,
        email_verified_at: None,
        created_at: now,
        updated_at: now,
    }
}

// --- users ---

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    grants: Mutex<HashMap<(GrantKind, Uuid), (String, OffsetDateTime)>>,
    hidden: AtomicBool,
    failing_password_updates: AtomicBool,
}

impl MemoryUserStore {
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn user(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    /// Makes lookups miss so writes hit the uniqueness check, as in a signup race.
    pub fn hide_existing_users(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }

    pub fn fail_password_updates(&self, failing: bool) {
        self.failing_password_updates.store(failing, Ordering::SeqCst);
    }

    pub fn set_active(&self, email: &str, active: bool) {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.email == email) {
            u.is_active = active;
        }
    }

    pub fn grant_for(&self, kind: GrantKind, user_id: Uuid) -> Option<String> {
        self.grants
            .lock()
            .unwrap()
            .get(&(kind, user_id))
            .map(|(token, _)| token.clone())
    }

    pub fn grant_count(&self, kind: GrantKind) -> usize {
        self.grants
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn insert_grant(
        &self,
        kind: GrantKind,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) {
        self.grants
            .lock()
            .unwrap()
            .insert((kind, user_id), (token.to_string(), expires_at));
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        if self.hidden.load(Ordering::SeqCst) {
            return None;
        }
        self.users.lock().unwrap().iter().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.id == id))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }
        if users.iter().any(|u| u.username == new_user.username) {
            return Err(StoreError::UniqueViolation("users_username_key".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            bio: new_user.bio,
            avatar: new_user.avatar,
            is_verified: false,
            is_active: true,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn reset_password(
        &self,
        token: &str,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut grants = self.grants.lock().unwrap();
        let key = grants
            .iter()
            .find(|((k, _), (t, expires_at))| {
                *k == GrantKind::PasswordReset
                    && t == token
                    && *expires_at > OffsetDateTime::now_utc()
            })
            .map(|(key, _)| *key);
        let Some(key) = key else {
            return Ok(None);
        };
        if self.failing_password_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == key.1) {
            u.password_hash = password_hash.to_string();
            u.updated_at = OffsetDateTime::now_utc();
        }
        grants.remove(&key);
        Ok(Some(key.1))
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            let now = OffsetDateTime::now_utc();
            u.is_verified = true;
            u.email_verified_at = Some(now);
            u.updated_at = now;
        }
        Ok(())
    }

    async fn save_grant(
        &self,
        kind: GrantKind,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.insert_grant(kind, user_id, token, expires_at);
        Ok(())
    }

    async fn consume_grant(&self, kind: GrantKind, token: &str) -> Result<Option<Uuid>, StoreError> {
        let mut grants = self.grants.lock().unwrap();
        let key = grants
            .iter()
            .find(|((k, _), (t, _))| *k == kind && t == token)
            .map(|(key, (_, expires_at))| (*key, *expires_at));
        match key {
            Some((key, expires_at)) if expires_at > OffsetDateTime::now_utc() => {
                grants.remove(&key);
                Ok(Some(key.1))
            }
            _ => Ok(None),
        }
    }
}

// --- purchases ---

#[derive(Default)]
pub struct MemoryPurchaseStore {
    rows: Mutex<Vec<RecipePurchase>>,
    failing_creates: AtomicBool,
}

impl MemoryPurchaseStore {
    pub fn fail_create(&self) {
        self.failing_creates.store(true, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn by_reference(&self, tx_ref: &str) -> Option<RecipePurchase> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.payment_reference == tx_ref)
            .cloned()
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn create(&self, p: NewPurchase) -> Result<RecipePurchase, StoreError> {
        if self.failing_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.payment_reference == p.payment_reference) {
            return Err(StoreError::UniqueViolation(
                "recipe_purchases_payment_reference_key".into(),
            ));
        }
        let now = OffsetDateTime::now_utc();
        let purchase = RecipePurchase {
            id: Uuid::new_v4(),
            recipe_id: p.recipe_id,
            user_id: p.user_id,
            amount: p.amount,
            payment_method: p.payment_method,
            payment_reference: p.payment_reference,
            status: PurchaseStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        rows.push(purchase.clone());
        Ok(purchase)
    }

    async fn find_by_reference(&self, tx_ref: &str) -> Result<Option<RecipePurchase>, StoreError> {
        Ok(self.by_reference(tx_ref))
    }

    async fn settle(&self, id: Uuid, status: PurchaseStatus) -> Result<Settlement, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        if row.status.is_terminal() {
            return Ok(Settlement::Unchanged(row.clone()));
        }
        row.status = status;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Settlement::Applied(row.clone()))
    }
}

// --- provider ---

/// Answers verification from a per-tx_ref status table.
#[derive(Default)]
pub struct StubGateway {
    statuses: Mutex<HashMap<String, String>>,
    initialized: Mutex<Vec<CheckoutRequest>>,
    refuse: AtomicBool,
}

impl StubGateway {
    pub fn set_status(&self, tx_ref: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(tx_ref.to_string(), status.to_string());
    }

    pub fn fail_initialize(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn initialized(&self) -> Vec<CheckoutRequest> {
        self.initialized.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(&self, req: &CheckoutRequest) -> Result<Checkout, GatewayError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(GatewayError::Provider(
                "payment initialization failed: Invalid API Key".into(),
            ));
        }
        self.initialized.lock().unwrap().push(req.clone());
        Ok(Checkout {
            checkout_url: format!("https://checkout.test/{}", req.tx_ref),
        })
    }

    async fn verify(&self, tx_ref: &str) -> Result<Verification, GatewayError> {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(tx_ref)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Provider(
                    "payment verification failed: Invalid transaction reference".into(),
                )
            })?;
        let amount = self
            .initialized
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.tx_ref == tx_ref)
            .map_or(0.0, |r| r.amount);
        Ok(Verification {
            status,
            amount,
            currency: "ETB".into(),
        })
    }
}

// --- events ---

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(String, Value)>>,
    failing: AtomicBool,
}

impl RecordingEvents {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn trigger(&self, event_type: &str, data: Value) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("failed to trigger event {event_type}: 503 Service Unavailable");
        }
        self.events
            .lock()
            .unwrap()
            .push((event_type.to_string(), data));
        Ok(())
    }
}

// --- views ---

#[derive(Default)]
pub struct MemoryViewStore {
    views: Mutex<Vec<NewRecipeView>>,
}

impl MemoryViewStore {
    pub fn recorded(&self) -> Vec<NewRecipeView> {
        self.views.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeViewStore for MemoryViewStore {
    async fn record(&self, view: NewRecipeView) -> Result<(), StoreError> {
        self.views.lock().unwrap().push(view);
        Ok(())
    }
}

// --- outbound http ---

/// Serves `router` on an ephemeral local port and returns its base url.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// --- whole app ---

pub fn test_config(upload_dir: &std::path::Path) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: "postgres://unused".into(),
        database_max_connections: 1,
        jwt: JwtConfig {
            secret: "router-secret".into(),
            issuer: "recipehub".into(),
            audience: "recipehub-users".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
            refresh_requires_refresh_kind: true,
        },
        password: PasswordConfig::default(),
        tokens: TokenTtlConfig {
            password_reset_minutes: 60,
            email_verification_hours: 24,
        },
        payment: PaymentConfig {
            secret_key: "sk".into(),
            base_url: "http://provider.test".into(),
            currency: "ETB".into(),
            callback_url: "http://localhost:8000/payment/webhook".into(),
            return_url: "http://localhost:3000/payment/success".into(),
            timeout_secs: 5,
        },
        hasura: HasuraConfig {
            endpoint: "http://hasura.test".into(),
            admin_secret: String::new(),
        },
        uploads: UploadConfig {
            dir: upload_dir.to_path_buf(),
            max_bytes: 1024,
        },
    }
}

/// App state over fakes; the temp dir lives as long as this value.
pub struct TestApp {
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub purchases: Arc<MemoryPurchaseStore>,
    pub gateway: Arc<StubGateway>,
    pub events: Arc<RecordingEvents>,
    pub views: Arc<MemoryViewStore>,
    pub upload_dir: tempfile::TempDir,
}

pub async fn test_app() -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let config = test_config(upload_dir.path());
    let users = Arc::new(MemoryUserStore::default());
    let purchases = Arc::new(MemoryPurchaseStore::default());
    let gateway = Arc::new(StubGateway::default());
    let events = Arc::new(RecordingEvents::default());
    let views = Arc::new(MemoryViewStore::default());
    let storage = Arc::new(LocalStorage::new(&config.uploads).await.unwrap());

    let state = AppState::from_parts(
        config,
        fast_passwords(),
        Backends {
            users: users.clone(),
            purchases: purchases.clone(),
            gateway: gateway.clone(),
            events: events.clone(),
            storage,
            views: views.clone(),
        },
    );
    TestApp {
        state,
        users,
        purchases,
        gateway,
        events,
        views,
        upload_dir,
    }
}

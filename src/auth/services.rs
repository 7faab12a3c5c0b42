use std::sync::Arc;

use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::SignupRequest,
        jwt::{JwtKeys, TokenPair},
        password::Passwords,
        repo::{GrantKind, StoreError, UserStore},
        repo_types::{NewUser, User},
    },
    config::TokenTtlConfig,
    error::{AppError, AppResult},
};

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with this email exists, a password reset link has been sent.";

const GRANT_TOKEN_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Random alphanumeric grant token from the OS entropy source.
pub(crate) fn generate_grant_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GRANT_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn validate_signup(req: &SignupRequest) -> AppResult<()> {
    if !is_valid_email(&req.email) {
        return Err(AppError::validation("Invalid request data: invalid email"));
    }
    let username_len = req.username.chars().count();
    if !(3..=50).contains(&username_len) {
        return Err(AppError::validation(
            "Invalid request data: username must be 3-50 characters",
        ));
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(AppError::validation(
            "Invalid request data: first_name and last_name are required",
        ));
    }
    validate_password(&req.password)
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "Invalid request data: password must be at least 8 characters",
        ));
    }
    Ok(())
}

fn conflict_for_constraint(err: StoreError) -> AppError {
    match err {
        StoreError::UniqueViolation(constraint) if constraint.contains("username") => {
            AppError::Conflict("Username is already taken".into())
        }
        StoreError::UniqueViolation(_) => {
            AppError::Conflict("User with this email already exists".into())
        }
        other => other.into(),
    }
}

/// Signup, login, refresh and the single-use grant flows.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    passwords: Passwords,
    keys: JwtKeys,
    ttl: TokenTtlConfig,
    refresh_requires_refresh_kind: bool,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        passwords: Passwords,
        keys: JwtKeys,
        ttl: TokenTtlConfig,
        refresh_requires_refresh_kind: bool,
    ) -> Self {
        Self {
            users,
            passwords,
            keys,
            ttl,
            refresh_requires_refresh_kind,
        }
    }

    pub async fn signup(&self, mut req: SignupRequest) -> AppResult<User> {
        req.email = normalize_email(&req.email);
        req.username = req.username.trim().to_string();
        validate_signup(&req)?;

        if self.users.find_by_email(&req.email).await?.is_some() {
            warn!(email = %req.email, "email already registered");
            return Err(AppError::Conflict("User with this email already exists".into()));
        }
        if self.users.find_by_username(&req.username).await?.is_some() {
            warn!(username = %req.username, "username already taken");
            return Err(AppError::Conflict("Username is already taken".into()));
        }

        let password_hash = self.passwords.hash(&req.password)?;

        // The checks above are advisory; the unique constraints decide races.
        let user = self
            .users
            .create(NewUser {
                email: req.email,
                username: req.username,
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                password_hash,
                bio: req.bio,
                avatar: req.avatar,
            })
            .await
            .map_err(conflict_for_constraint)?;

        if let Err(e) = self.issue_email_verification(user.id).await {
            warn!(error = %e, user_id = %user.id, "email verification token not issued");
        }

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn issue_email_verification(&self, user_id: Uuid) -> AppResult<()> {
        let token = generate_grant_token();
        let expires_at = OffsetDateTime::now_utc() + Duration::hours(self.ttl.email_verification_hours);
        self.users
            .save_grant(GrantKind::EmailVerification, user_id, &token, expires_at)
            .await?;
        info!(user_id = %user_id, "email verification token issued");
        Ok(())
    }

    /// Unknown email, wrong password and inactive account all yield the same
    /// error, and each costs one password verification.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(TokenPair, User)> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.passwords.verify_dummy(password);
            warn!("login unknown email");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };

        if !self.passwords.verify(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login on deactivated account");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        let tokens = self.keys.sign_pair(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok((tokens, user))
    }

    pub async fn refresh(&self, token: &str) -> AppResult<TokenPair> {
        let verified = if self.refresh_requires_refresh_kind {
            self.keys.verify_refresh(token)
        } else {
            self.keys.verify(token)
        };
        let claims = verified.map_err(|e| {
            warn!(error = %e, "refresh rejected");
            AppError::unauthorized("Invalid refresh token")
        })?;

        let user = match self.users.find_by_id(claims.sub).await? {
            Some(u) if u.is_active => u,
            Some(_) | None => {
                warn!(user_id = %claims.sub, "refresh for missing or inactive user");
                return Err(AppError::unauthorized("Invalid refresh token"));
            }
        };

        Ok(self.keys.sign_pair(&user)?)
    }

    /// Always succeeds once the email is well formed; failures past that point
    /// are logged only, so the response never depends on the account existing.
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email address"));
        }

        let user = match self.users.find_by_email(&email).await {
            Ok(Some(u)) => u,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(error = %e, "forgot_password lookup failed");
                return Ok(());
            }
        };

        let token = generate_grant_token();
        let expires_at =
            OffsetDateTime::now_utc() + Duration::minutes(self.ttl.password_reset_minutes);
        match self
            .users
            .save_grant(GrantKind::PasswordReset, user.id, &token, expires_at)
            .await
        {
            Ok(()) => info!(user_id = %user.id, "password reset token issued"),
            Err(e) => error!(error = %e, user_id = %user.id, "saving reset token failed"),
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()> {
        if token.trim().is_empty() {
            return Err(AppError::validation("Invalid request data"));
        }
        validate_password(new_password)?;

        let password_hash = self.passwords.hash(new_password)?;
        let user_id = self
            .users
            .reset_password(token, &password_hash)
            .await?
            .ok_or_else(|| AppError::InvalidOrExpiredToken("Invalid or expired reset token".into()))?;

        info!(user_id = %user_id, "password reset");
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> AppResult<()> {
        if token.trim().is_empty() {
            return Err(AppError::validation("Invalid verification token"));
        }
        let user_id = self
            .users
            .consume_grant(GrantKind::EmailVerification, token)
            .await?
            .ok_or_else(|| {
                AppError::InvalidOrExpiredToken("Invalid or expired verification token".into())
            })?;

        self.users.mark_email_verified(user_id).await?;
        info!(user_id = %user_id, "email verified");
        Ok(())
    }
}

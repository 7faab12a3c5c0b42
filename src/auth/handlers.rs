use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, FacebookLoginRequest, ForgotPasswordRequest, GoogleLoginRequest,
            LoginRequest, ResetPasswordRequest, SignupRequest, VerifyEmailRequest,
        },
        middleware::bearer_token,
        services::FORGOT_PASSWORD_MESSAGE,
    },
    error::{AppError, AppJson, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/google-login", post(google_login))
        .route("/auth/facebook-login", post(facebook_login))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, AppJson<AuthResponse>)> {
    let user = state.auth.signup(payload).await?;
    Ok((
        StatusCode::CREATED,
        AppJson(AuthResponse {
            user: Some(user),
            ..AuthResponse::message(
                "Account created successfully. Please check your email for verification.",
            )
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<AppJson<AuthResponse>> {
    let (tokens, user) = state.auth.login(&payload.email, &payload.password).await?;
    Ok(AppJson(AuthResponse {
        access_token: Some(tokens.access_token),
        refresh_token: Some(tokens.refresh_token),
        user: Some(user),
        ..AuthResponse::message("Login successful")
    }))
}

#[instrument(skip(state, headers))]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<AppJson<AuthResponse>> {
    let token = bearer_token(&headers)?;
    let tokens = state.auth.refresh(token).await?;
    Ok(AppJson(AuthResponse {
        access_token: Some(tokens.access_token),
        refresh_token: Some(tokens.refresh_token),
        ..AuthResponse::message("Token refreshed successfully")
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<AppJson<AuthResponse>> {
    state.auth.forgot_password(&payload.email).await?;
    Ok(AppJson(AuthResponse::message(FORGOT_PASSWORD_MESSAGE)))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<AppJson<AuthResponse>> {
    state
        .auth
        .reset_password(&payload.token, &payload.password)
        .await?;
    Ok(AppJson(AuthResponse::message("Password reset successfully")))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> AppResult<AppJson<AuthResponse>> {
    state.auth.verify_email(&payload.token).await?;
    Ok(AppJson(AuthResponse::message("Email verified successfully")))
}

pub async fn google_login(
    AppJson(payload): AppJson<GoogleLoginRequest>,
) -> AppResult<AppJson<AuthResponse>> {
    if payload.google_token.trim().is_empty() {
        return Err(AppError::validation("Google token required"));
    }
    Err(AppError::NotImplemented("Google login not implemented yet".into()))
}

pub async fn facebook_login(
    AppJson(payload): AppJson<FacebookLoginRequest>,
) -> AppResult<AppJson<AuthResponse>> {
    if payload.facebook_token.trim().is_empty() {
        return Err(AppError::validation("Facebook token required"));
    }
    Err(AppError::NotImplemented("Facebook login not implemented yet".into()))
}

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::jwt::{Claims, JwtKeys, TokenKind},
    error::AppError,
};

/// Caller identity placed in request extensions by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<Claims> for Identity {
    fn from(c: Claims) -> Self {
        Self {
            user_id: c.sub,
            username: c.username,
            email: c.email,
        }
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::unauthorized("Authorization header required"))?;

    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    if token == header {
        return Err(AppError::unauthorized("Invalid authorization header format"));
    }
    Ok(token)
}

fn identify(keys: &JwtKeys, headers: &HeaderMap) -> Result<Identity, AppError> {
    let token = bearer_token(headers)?;
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "bearer token rejected");
        AppError::unauthorized("Invalid or expired token")
    })?;
    if claims.kind != TokenKind::Access {
        warn!(user_id = %claims.sub, "non-access token presented to gate");
        return Err(AppError::unauthorized("Invalid or expired token"));
    }
    Ok(claims.into())
}

/// Rejects the request with 401 unless it carries a valid access token.
pub async fn require_auth(
    State(keys): State<JwtKeys>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = identify(&keys, req.headers())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Attaches identity when a valid token is present; never rejects.
pub async fn optional_auth(State(keys): State<JwtKeys>, mut req: Request, next: Next) -> Response {
    if let Ok(identity) = identify(&keys, req.headers()) {
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap},
    middleware::from_fn_with_state,
    routing::post,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    auth::middleware::{optional_auth, Identity},
    error::{AppJson, AppResult},
    recipes::repo::NewRecipeView,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RecipeViewRequest {
    pub recipe_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RecipeViewResponse {
    pub success: bool,
    pub message: String,
}

pub fn view_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/recipe/view", post(track_view))
        .route_layer(from_fn_with_state(state.clone(), optional_auth))
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_default()
}

#[instrument(skip(state, headers, identity, payload))]
pub async fn track_view(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    identity: Option<Extension<Identity>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<RecipeViewRequest>,
) -> AppResult<AppJson<RecipeViewResponse>> {
    let view = NewRecipeView {
        recipe_id: payload.recipe_id,
        user_id: identity.map(|Extension(id)| id.user_id),
        ip_address: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    debug!(recipe_id = %view.recipe_id, anonymous = view.user_id.is_none(), "recording view");
    state.views.record(view).await?;

    Ok(AppJson(RecipeViewResponse {
        success: true,
        message: "Recipe view tracked".into(),
    }))
}

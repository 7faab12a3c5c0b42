pub mod dto;
pub mod gateway;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::gated_routes(state))
        .merge(handlers::webhook_routes())
}

pub mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::view_routes(state)
}

use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{auth, payments, recipes, state::AppState, storage::URL_PREFIX, uploads};

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// `status` is filled in once the response is known.
fn request_span(req: &axum::http::Request<axum::body::Body>) -> tracing::Span {
    let method = req.method().clone();
    let uri = req.uri().clone();
    tracing::info_span!(
        "http_request",
        %method,
        uri = %uri,
        status = tracing::field::Empty
    )
}

pub fn build_app(state: AppState) -> Router {
    let upload_root = state.config.uploads.dir.clone();
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(uploads::router(&state))
        .merge(payments::router(&state))
        .merge(recipes::router(&state))
        .nest_service(URL_PREFIX, ServeDir::new(upload_root))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

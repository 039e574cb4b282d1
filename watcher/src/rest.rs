use crate::metrics::gather_metrics;
use crate::model::{SubscriptionResponse, UserId};
use crate::store::SubscriptionStore;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SubscriptionStore>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    user_id: Option<UserId>,
}

pub fn create_router(store: Arc<dyn SubscriptionStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/subscriptions", get(get_subscriptions))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics() -> Result<String, AppError> {
    Ok(gather_metrics()?)
}

async fn get_subscriptions(
    State(state): State<AppState>,
    Query(params): Query<SubscriptionQuery>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let mut data = match params.user_id {
        Some(user_id) => state.store.list_by_user(user_id).await?,
        None => state.store.list_all().await?,
    };
    data.sort_by(|a, b| (a.user_id, &a.device).cmp(&(b.user_id, &b.device)));

    Ok(Json(SubscriptionResponse {
        total: data.len(),
        data,
    }))
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

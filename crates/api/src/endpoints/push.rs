//! Web Push subscription endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use volunteer_common::{AppError, AppResult};
use volunteer_core::{PushConfigResponse, SubscribeInput};
use volunteer_db::entities::push_subscription;

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{ApiResponse, no_content},
};

/// Request to unregister a push subscription.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

/// A stored subscription. Keys are never echoed back.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub endpoint: String,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl From<push_subscription::Model> for SubscriptionResponse {
    fn from(s: push_subscription::Model) -> Self {
        Self {
            id: s.id,
            endpoint: s.endpoint,
            user_agent: s.user_agent,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

async fn config(State(state): State<AppState>) -> ApiResponse<PushConfigResponse> {
    ApiResponse::ok(state.push_service.config())
}

async fn subscribe(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<SubscribeInput>,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    if !state.push_service.is_enabled() {
        return Err(AppError::BadRequest(
            "Push notifications are not configured".to_string(),
        ));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let subscription = state
        .push_service
        .subscribe(&user.id, input, user_agent)
        .await?;
    Ok(ApiResponse::created(subscription.into()))
}

async fn unsubscribe(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UnsubscribeRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .push_service
        .unsubscribe(&user.id, &req.endpoint)
        .await?;
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(config))
        .route("/subscriptions", post(subscribe).delete(unsubscribe))
}

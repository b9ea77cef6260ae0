//! Authentication endpoints.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use serde::Serialize;
use volunteer_common::AppResult;
use volunteer_core::{AuthSession, ChangePasswordInput, LoginInput, RegisterInput};

use super::users::UserResponse;
use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{ApiResponse, no_content},
};

/// Signed-in user and access token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: UserResponse,
    pub token: String,
}

impl From<AuthSession> for SessionResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user: session.user.into(),
            token: session.token,
        }
    }
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> AppResult<ApiResponse<SessionResponse>> {
    let session = state.auth_service.register(input).await?;
    Ok(ApiResponse::created(session.into()))
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> AppResult<ApiResponse<SessionResponse>> {
    let session = state.auth_service.login(input).await?;
    Ok(ApiResponse::ok(session.into()))
}

async fn me(AuthUser(user): AuthUser) -> ApiResponse<UserResponse> {
    ApiResponse::ok(user.into())
}

async fn change_password(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ChangePasswordInput>,
) -> AppResult<impl axum::response::IntoResponse> {
    state.auth_service.change_password(&user, input).await?;
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/password", put(change_password))
}

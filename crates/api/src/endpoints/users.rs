//! User endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, put},
};
use serde::{Deserialize, Serialize};
use volunteer_common::AppResult;
use volunteer_core::{Dashboard, UpdateProfileInput};
use volunteer_db::entities::user::{self, Role, UserStatus};
use volunteer_db::repositories::UserFilter;

use crate::{
    extractors::{AdminUser, AuthUser, Pagination},
    middleware::AppState,
    response::{ApiResponse, Paginated, no_content},
};

/// Full user profile, shown to the user and to admins.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            skills: u.skill_list(),
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            status: u.status,
            phone: u.phone,
            avatar_url: u.avatar_url,
            bio: u.bio,
            last_login_at: u.last_login_at.map(|t| t.to_rfc3339()),
            created_at: u.created_at.to_rfc3339(),
            updated_at: u.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Public face of a user next to content they wrote.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl From<user::Model> for UserSummary {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            avatar_url: u.avatar_url,
            role: u.role,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

async fn list(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    pagination: Pagination,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<ApiResponse<Paginated<UserResponse>>> {
    let filter = UserFilter {
        role: query.role,
        status: query.status,
        search: query.search,
    };
    let (users, total) = state
        .user_service
        .list(&admin, &filter, pagination.limit, pagination.offset())
        .await?;

    let items = users.into_iter().map(UserResponse::from).collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, &pagination)))
}

async fn dashboard(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Dashboard>> {
    let dashboard = state.user_service.dashboard(&user).await?;
    Ok(ApiResponse::ok(dashboard))
}

async fn update_me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<UpdateProfileInput>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.user_service.update_profile(&user, input).await?;
    Ok(ApiResponse::ok(user.into()))
}

async fn get_user(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<UserResponse>> {
    let target = state.user_service.get(&user, &id).await?;
    Ok(ApiResponse::ok(target.into()))
}

async fn set_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.user_service.set_status(&admin, &id, req.status).await?;
    Ok(ApiResponse::ok(user.into()))
}

async fn set_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.user_service.set_role(&admin, &id, req.role).await?;
    Ok(ApiResponse::ok(user.into()))
}

async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl axum::response::IntoResponse> {
    state.user_service.delete(&admin, &id).await?;
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/dashboard", get(dashboard))
        .route("/me", put(update_me))
        .route("/{id}", get(get_user).delete(delete_user))
        .route("/{id}/status", patch(set_status))
        .route("/{id}/role", patch(set_role))
}

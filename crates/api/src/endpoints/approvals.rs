//! Approval request endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use volunteer_common::AppResult;
use volunteer_core::{PromotionInput, ReviewInput};
use volunteer_db::entities::approval_request::{self, ApprovalStatus, ApprovalType};
use volunteer_db::repositories::ApprovalFilter;

use crate::{
    extractors::{AdminUser, AuthUser, Pagination},
    middleware::AppState,
    response::{ApiResponse, Paginated},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: ApprovalType,
    pub requester_id: String,
    pub event_id: Option<String>,
    pub payload: serde_json::Value,
    pub status: ApprovalStatus,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

impl From<approval_request::Model> for ApprovalResponse {
    fn from(r: approval_request::Model) -> Self {
        Self {
            id: r.id,
            request_type: r.request_type,
            requester_id: r.requester_id,
            event_id: r.event_id,
            payload: r.payload,
            status: r.status,
            reviewed_by: r.reviewed_by,
            review_note: r.review_note,
            created_at: r.created_at.to_rfc3339(),
            reviewed_at: r.reviewed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListApprovalsQuery {
    pub status: Option<ApprovalStatus>,
    #[serde(rename = "type")]
    pub request_type: Option<ApprovalType>,
}

async fn list(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    pagination: Pagination,
    Query(query): Query<ListApprovalsQuery>,
) -> AppResult<ApiResponse<Paginated<ApprovalResponse>>> {
    let filter = ApprovalFilter {
        status: query.status,
        request_type: query.request_type,
        requester_id: None,
    };
    let (requests, total) = state
        .approval_service
        .list(&filter, pagination.limit, pagination.offset())
        .await?;

    let items = requests.into_iter().map(ApprovalResponse::from).collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, &pagination)))
}

async fn list_mine(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    pagination: Pagination,
) -> AppResult<ApiResponse<Paginated<ApprovalResponse>>> {
    let (requests, total) = state
        .approval_service
        .list_mine(&user, pagination.limit, pagination.offset())
        .await?;

    let items = requests.into_iter().map(ApprovalResponse::from).collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, &pagination)))
}

async fn request_promotion(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<PromotionInput>,
) -> AppResult<ApiResponse<ApprovalResponse>> {
    let request = state.approval_service.request_promotion(&user, input).await?;
    Ok(ApiResponse::created(request.into()))
}

async fn get_request(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<ApprovalResponse>> {
    let request = state.approval_service.get(&user, &id).await?;
    Ok(ApiResponse::ok(request.into()))
}

async fn approve(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    input: Option<Json<ReviewInput>>,
) -> AppResult<ApiResponse<ApprovalResponse>> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let request = state.approval_service.approve(&admin, &id, input).await?;
    Ok(ApiResponse::ok(request.into()))
}

async fn reject(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    input: Option<Json<ReviewInput>>,
) -> AppResult<ApiResponse<ApprovalResponse>> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let request = state.approval_service.reject(&admin, &id, input).await?;
    Ok(ApiResponse::ok(request.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/mine", get(list_mine))
        .route("/promotion", post(request_promotion))
        .route("/{id}", get(get_request))
        .route("/{id}/approve", post(approve))
        .route("/{id}/reject", post(reject))
}

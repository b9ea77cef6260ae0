//! Event endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use volunteer_common::AppResult;
use volunteer_core::{CancellationInput, CreateEventInput, EventQuery, Participant, UpdateEventInput};
use volunteer_db::entities::{
    event::{self, EventStatus},
    registration::RegistrationStatus,
};

use super::approvals::ApprovalResponse;
use super::registrations::RegistrationResponse;
use super::users::UserResponse;
use crate::{
    extractors::{AuthUser, Pagination, StaffUser},
    middleware::AppState,
    response::{ApiResponse, Paginated, no_content},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
    pub max_participants: i32,
    pub current_participants: i32,
    pub available_spots: i32,
    pub is_full: bool,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub status: EventStatus,
    pub created_by: String,
    pub channel_id: Option<String>,
    pub approval_request_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<event::Model> for EventResponse {
    fn from(e: event::Model) -> Self {
        Self {
            tags: e.tag_list(),
            is_full: e.is_full(),
            available_spots: (e.max_participants - e.current_participants).max(0),
            id: e.id,
            title: e.title,
            description: e.description,
            location: e.location,
            start_date: e.start_date.to_rfc3339(),
            end_date: e.end_date.to_rfc3339(),
            max_participants: e.max_participants,
            current_participants: e.current_participants,
            image_url: e.image_url,
            status: e.status,
            created_by: e.created_by,
            channel_id: e.channel_id,
            approval_request_id: e.approval_request_id,
            cancellation_reason: e.cancellation_reason,
            created_at: e.created_at.to_rfc3339(),
            updated_at: e.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub registration: RegistrationResponse,
    pub user: Option<UserResponse>,
}

impl From<Participant> for ParticipantResponse {
    fn from(p: Participant) -> Self {
        Self {
            registration: p.registration.into(),
            user: p.user.map(Into::into),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub status: Option<EventStatus>,
    pub tag: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub upcoming_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParticipantsQuery {
    pub status: Option<RegistrationStatus>,
}

async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    pagination: Pagination,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<ApiResponse<Paginated<EventResponse>>> {
    let query = EventQuery {
        status: query.status,
        tag: query.tag,
        search: query.search,
        upcoming_only: query.upcoming_only,
    };
    let (events, total) = state
        .event_service
        .list(&user, query, pagination.limit, pagination.offset())
        .await?;

    let items = events.into_iter().map(EventResponse::from).collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, &pagination)))
}

async fn create(
    StaffUser(user): StaffUser,
    State(state): State<AppState>,
    Json(input): Json<CreateEventInput>,
) -> AppResult<ApiResponse<EventResponse>> {
    let event = state.event_service.create(&user, input).await?;
    Ok(ApiResponse::created(event.into()))
}

async fn list_mine(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<EventResponse>>> {
    let events = state.event_service.list_mine(&user).await?;
    Ok(ApiResponse::ok(events.into_iter().map(Into::into).collect()))
}

async fn get_event(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<EventResponse>> {
    let event = state.event_service.get(&user, &id).await?;
    Ok(ApiResponse::ok(event.into()))
}

async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateEventInput>,
) -> AppResult<ApiResponse<EventResponse>> {
    let event = state.event_service.update(&user, &id, input).await?;
    Ok(ApiResponse::ok(event.into()))
}

async fn delete_event(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl axum::response::IntoResponse> {
    state.event_service.delete(&user, &id).await?;
    Ok(no_content())
}

async fn request_cancellation(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CancellationInput>,
) -> AppResult<ApiResponse<ApprovalResponse>> {
    let request = state
        .event_service
        .request_cancellation(&user, &id, input)
        .await?;
    Ok(ApiResponse::created(request.into()))
}

async fn participants(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ParticipantsQuery>,
) -> AppResult<ApiResponse<Vec<ParticipantResponse>>> {
    let participants = state
        .event_service
        .participants(&user, &id, query.status)
        .await?;
    Ok(ApiResponse::ok(
        participants.into_iter().map(Into::into).collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list).post(create))
        .route("/events/mine", get(list_mine))
        .route(
            "/events/{id}",
            get(get_event).put(update).delete(delete_event),
        )
        .route("/events/{id}/cancellation", post(request_cancellation))
        .route("/events/{id}/participants", get(participants))
}

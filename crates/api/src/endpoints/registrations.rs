//! Registration endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use volunteer_common::AppResult;
use volunteer_core::{QrCode, RegistrationDetail};
use volunteer_db::entities::registration::{self, RegistrationStatus};

use super::events::EventResponse;
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// A registration. The QR token itself is only served by the ticket route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub status: RegistrationStatus,
    pub has_ticket: bool,
    pub registered_at: String,
    pub cancelled_at: Option<String>,
}

impl From<registration::Model> for RegistrationResponse {
    fn from(r: registration::Model) -> Self {
        Self {
            has_ticket: r.status == RegistrationStatus::Registered && r.qr_token.is_some(),
            id: r.id,
            user_id: r.user_id,
            event_id: r.event_id,
            status: r.status,
            registered_at: r.registered_at.to_rfc3339(),
            cancelled_at: r.cancelled_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDetailResponse {
    #[serde(flatten)]
    pub registration: RegistrationResponse,
    pub event: Option<EventResponse>,
}

impl From<RegistrationDetail> for RegistrationDetailResponse {
    fn from(d: RegistrationDetail) -> Self {
        Self {
            registration: d.registration.into(),
            event: d.event.map(Into::into),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MineQuery {
    pub status: Option<RegistrationStatus>,
}

async fn register(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<ApiResponse<RegistrationResponse>> {
    let registration = state
        .registration_service
        .register(&user, &event_id)
        .await?;
    Ok(ApiResponse::created(registration.into()))
}

async fn cancel(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<ApiResponse<RegistrationResponse>> {
    let registration = state.registration_service.cancel(&user, &event_id).await?;
    Ok(ApiResponse::ok(registration.into()))
}

async fn list_mine(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<MineQuery>,
) -> AppResult<ApiResponse<Vec<RegistrationDetailResponse>>> {
    let registrations = state
        .registration_service
        .list_mine(&user, query.status)
        .await?;
    Ok(ApiResponse::ok(
        registrations.into_iter().map(Into::into).collect(),
    ))
}

async fn get_registration(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<RegistrationDetailResponse>> {
    let detail = state.registration_service.get(&user, &id).await?;
    Ok(ApiResponse::ok(detail.into()))
}

async fn qr(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<QrCode>> {
    let code = state.registration_service.qr(&user, &id).await?;
    Ok(ApiResponse::ok(code))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/registrations", post(register).delete(cancel))
        .route("/registrations/mine", get(list_mine))
        .route("/registrations/{id}", get(get_registration))
        .route("/registrations/{id}/qr", get(qr))
}

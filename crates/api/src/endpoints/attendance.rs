//! Attendance endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use volunteer_common::AppResult;
use volunteer_core::{AttendanceDetail, AttendanceSummary, CheckInInput, EventAttendance, FeedbackInput};
use volunteer_db::entities::attendance;

use super::events::EventResponse;
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub id: String,
    pub registration_id: String,
    pub event_id: String,
    pub user_id: String,
    pub check_in_at: Option<String>,
    pub check_out_at: Option<String>,
    pub checked_in_by: Option<String>,
    /// Only for completed records
    pub hours: Option<f64>,
    pub feedback_rating: Option<i16>,
    pub feedback_comment: Option<String>,
    pub feedback_at: Option<String>,
}

impl From<attendance::Model> for AttendanceResponse {
    fn from(a: attendance::Model) -> Self {
        Self {
            hours: a.hours().map(|h| (h * 100.0).round() / 100.0),
            id: a.id,
            registration_id: a.registration_id,
            event_id: a.event_id,
            user_id: a.user_id,
            check_in_at: a.check_in_at.map(|t| t.to_rfc3339()),
            check_out_at: a.check_out_at.map(|t| t.to_rfc3339()),
            checked_in_by: a.checked_in_by,
            feedback_rating: a.feedback_rating,
            feedback_comment: a.feedback_comment,
            feedback_at: a.feedback_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDetailResponse {
    #[serde(flatten)]
    pub attendance: AttendanceResponse,
    pub event: Option<EventResponse>,
}

impl From<AttendanceDetail> for AttendanceDetailResponse {
    fn from(d: AttendanceDetail) -> Self {
        Self {
            attendance: d.attendance.into(),
            event: d.event.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttendanceResponse {
    pub records: Vec<AttendanceResponse>,
    pub summary: AttendanceSummary,
}

impl From<EventAttendance> for EventAttendanceResponse {
    fn from(e: EventAttendance) -> Self {
        Self {
            records: e.records.into_iter().map(Into::into).collect(),
            summary: e.summary,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutRequest {
    pub registration_id: String,
}

async fn check_in(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CheckInInput>,
) -> AppResult<ApiResponse<AttendanceResponse>> {
    let attendance = state.attendance_service.check_in(&user, input).await?;
    Ok(ApiResponse::created(attendance.into()))
}

async fn check_out(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CheckOutRequest>,
) -> AppResult<ApiResponse<AttendanceResponse>> {
    let attendance = state
        .attendance_service
        .check_out(&user, &req.registration_id)
        .await?;
    Ok(ApiResponse::ok(attendance.into()))
}

async fn list_mine(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<AttendanceDetailResponse>>> {
    let records = state.attendance_service.list_mine(&user).await?;
    Ok(ApiResponse::ok(records.into_iter().map(Into::into).collect()))
}

async fn submit_feedback(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<FeedbackInput>,
) -> AppResult<ApiResponse<AttendanceResponse>> {
    let attendance = state
        .attendance_service
        .submit_feedback(&user, &id, input)
        .await?;
    Ok(ApiResponse::ok(attendance.into()))
}

async fn list_for_event(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<ApiResponse<EventAttendanceResponse>> {
    let attendance = state
        .attendance_service
        .list_for_event(&user, &event_id)
        .await?;
    Ok(ApiResponse::ok(attendance.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/attendance/check-in", post(check_in))
        .route("/attendance/check-out", post(check_out))
        .route("/attendance/mine", get(list_mine))
        .route("/attendance/{id}/feedback", put(submit_feedback))
        .route("/events/{id}/attendance", get(list_for_event))
}

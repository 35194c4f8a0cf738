use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    dto::interview_dto::{InterviewView, ScheduleInterviewPayload},
    error::Result,
    middleware::auth::Claims,
    AppState,
};

#[axum::debug_handler]
pub async fn schedule_interview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ScheduleInterviewPayload>,
) -> Result<impl IntoResponse> {
    let request = payload.into_request()?;
    let result = state.scheduler.schedule(&claims.sub, request).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[axum::debug_handler]
pub async fn get_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let interview = state.scheduler.get_interview(id).await?;
    Ok(Json(InterviewView::from(&interview)))
}

#[axum::debug_handler]
pub async fn resend_invitation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let interview = state.scheduler.resend_invitation(id).await?;
    tracing::info!(interview_id = %id, requested_by = %claims.sub, "Invitation resend requested");
    Ok(Json(json!({
        "notification": "sent",
        "interview": InterviewView::from(&interview),
    })))
}

#[axum::debug_handler]
pub async fn list_application_interviews(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> Result<impl IntoResponse> {
    let interviews = state
        .scheduler
        .list_for_application(&application_id)
        .await?;
    let views: Vec<InterviewView> = interviews.iter().map(InterviewView::from).collect();
    Ok(Json(json!({
        "application_id": application_id,
        "interviews": views,
    })))
}

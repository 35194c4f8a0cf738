//! Candidate-facing links. Possession of the token is the only credential.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::{
    dto::interview_dto::{PublicResponseView, ReschedulePayload},
    error::Result,
    services::response_service::ResponseAction,
    AppState,
};

#[axum::debug_handler]
pub async fn accept_interview(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let result = state
        .responses
        .respond(&token, ResponseAction::Accept, None)
        .await?;
    Ok(Json(PublicResponseView::from(&result)))
}

/// GET requests the reschedule without details; POST may carry
/// `{ reason, preferred_times }`.
#[axum::debug_handler]
pub async fn request_reschedule(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let payload: ReschedulePayload = serde_json::from_slice(&body)?;
        Some(payload.into_request()?)
    };
    let result = state
        .responses
        .respond(&token, ResponseAction::Reschedule, payload)
        .await?;
    Ok(Json(PublicResponseView::from(&result)))
}

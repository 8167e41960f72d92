use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CreateSlotRequest, GenerateSlotsRequest};
use crate::middleware::UserId;
use crate::models::Slot;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Free slots customers can pick for a service.
///
/// GET /services/:service_id/slots
pub async fn list_available_slots(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Vec<Slot>>, AppError> {
    Ok(Json(state.slots.list_available_slots(service_id).await?))
}

/// POST /provider/slots
pub async fn create_slot(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Slot>), AppError> {
    let slot = state
        .slots
        .create_slot(user_id, req.service_id, req.window)
        .await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

/// Generate a day of back-to-back interval slots. All or nothing.
///
/// POST /provider/slots/generate
pub async fn generate_slots(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<GenerateSlotsRequest>,
) -> Result<(StatusCode, Json<Vec<Slot>>), AppError> {
    let slots = state.slots.generate_slots(user_id, req.into()).await?;
    Ok((StatusCode::CREATED, Json(slots)))
}

/// GET /provider/services/:service_id/slots
pub async fn list_service_slots(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Vec<Slot>>, AppError> {
    Ok(Json(state.slots.list_slots(user_id, service_id).await?))
}

/// DELETE /provider/slots/:slot_id
pub async fn delete_slot(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(slot_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.slots.delete_slot(user_id, slot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

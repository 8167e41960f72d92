use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CreateBookingRequest, UpdateBookingStatusRequest};
use crate::middleware::UserId;
use crate::models::Booking;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

// ============================================================================
// Customer
// ============================================================================

/// Reserve a slot directly.
///
/// POST /bookings
pub async fn create_booking(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.bookings.reserve(user_id, req.into()).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /bookings
pub async fn list_my_bookings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_for_customer(user_id).await?))
}

/// Cancel one of the caller's bookings and free its slot.
///
/// PATCH /bookings/:booking_id/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.cancel(user_id, booking_id).await?))
}

// ============================================================================
// Provider
// ============================================================================

/// GET /provider/bookings
pub async fn list_business_bookings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_for_provider(user_id).await?))
}

/// Move a booking of the caller's business to a new status.
///
/// PATCH /provider/bookings/:booking_id
pub async fn update_booking_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(booking_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateBookingStatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .update_status(user_id, booking_id, req.into())
        .await?;
    Ok(Json(booking))
}

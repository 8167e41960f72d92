use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::RegisterDeviceTokenRequest;
use crate::middleware::UserId;
use crate::models::{DeviceToken, Notification};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Register a push token for the caller. Re-registering is a no-op.
///
/// POST /notifications/device-tokens
pub async fn register_device_token(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<RegisterDeviceTokenRequest>,
) -> Result<(StatusCode, Json<DeviceToken>), AppError> {
    let token = state
        .store
        .register_device_token(user_id, req.token.trim())
        .await?;
    tracing::info!(user_id = %user_id, "Device token registered");
    Ok((StatusCode::CREATED, Json(token)))
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.store.list_notifications(user_id).await?))
}

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::ProviderListing;
use crate::startup::AppState;

/// Providers with a current subscription, with their services and free slots.
///
/// GET /providers
pub async fn list_providers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProviderListing>>, AppError> {
    Ok(Json(state.directory.list_visible_providers().await?))
}

/// GET /providers/:provider_id
pub async fn get_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<ProviderListing>, AppError> {
    Ok(Json(state.directory.get_provider(provider_id).await?))
}

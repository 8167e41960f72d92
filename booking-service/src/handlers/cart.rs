use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::AddToCartRequest;
use crate::middleware::UserId;
use crate::models::CartItem;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// POST /cart
pub async fn add_to_cart(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartItem>), AppError> {
    let item = state
        .cart
        .add(user_id, req.service_id, req.slot_id, req.booking_date)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /cart
pub async fn list_cart(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<CartItem>>, AppError> {
    Ok(Json(state.cart.list(user_id).await?))
}

/// DELETE /cart/:cart_item_id
pub async fn remove_cart_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(cart_item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.cart.remove(user_id, cart_item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

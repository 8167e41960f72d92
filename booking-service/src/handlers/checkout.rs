use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::CreateCheckoutRequest;
use crate::middleware::UserId;
use crate::models::PaymentIntent;
use crate::services::CheckoutRedirect;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Open a hosted checkout session for the selected cart rows. Bookings are
/// created later, when the processor confirms the payment.
///
/// POST /checkout/sessions
pub async fn create_checkout_session(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutRedirect>), AppError> {
    let redirect = state
        .checkout
        .create_checkout(user_id, req.cart_item_ids, req.address_id)
        .await?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// GET /payments/:payment_id
pub async fn get_payment(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentIntent>, AppError> {
    Ok(Json(state.checkout.get_payment(user_id, payment_id).await?))
}

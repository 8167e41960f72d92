use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::{SeedPlansRequest, SeedPlansResponse, SubscriptionCheckoutRequest};
use crate::middleware::UserId;
use crate::models::SubscriptionPlan;
use crate::services::{CheckoutRedirect, SubscriptionOverview};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// GET /subscription-plans
pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscriptionPlan>>, AppError> {
    Ok(Json(state.subscriptions.list_plans().await?))
}

/// Insert plans, skipping price ids that already exist.
///
/// POST /subscription-plans
pub async fn seed_plans(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<SeedPlansRequest>,
) -> Result<(StatusCode, Json<SeedPlansResponse>), AppError> {
    let inserted = state.subscriptions.seed_plans(user_id, req.plans).await?;
    Ok((StatusCode::CREATED, Json(SeedPlansResponse { inserted })))
}

/// POST /provider/subscriptions/checkout
pub async fn create_subscription_checkout(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ValidatedJson(req): ValidatedJson<SubscriptionCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutRedirect>), AppError> {
    let redirect = state
        .checkout
        .create_subscription_checkout(user_id, req.price_id.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// GET /provider/subscriptions/me
pub async fn get_my_subscription(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<SubscriptionOverview>, AppError> {
    Ok(Json(state.subscriptions.overview(user_id).await?))
}

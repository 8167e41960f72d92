use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use service_core::error::AppError;

use crate::dtos::WebhookAck;
use crate::services::metrics::record_webhook_event;
use crate::services::webhook::SIGNATURE_HEADER;
use crate::startup::AppState;

/// Processor webhook.
///
/// The raw body is verified before it is parsed. Only a signature failure
/// is answered with 400; anything that goes wrong after that is logged and
/// acknowledged so the processor does not keep retrying a lost cause, and
/// the payment intent stays PENDING until a later delivery resolves it.
///
/// POST /webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let payload = state.webhooks.verify(signature, &body).map_err(|e| {
        tracing::warn!(error = %e, "Webhook signature rejected");
        record_webhook_event("signature", "rejected");
        AppError::BadRequest(anyhow::anyhow!("Webhook error: {}", e))
    })?;

    match state.webhooks.process(payload).await {
        Ok(disposition) => {
            tracing::debug!(?disposition, "Webhook processed");
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

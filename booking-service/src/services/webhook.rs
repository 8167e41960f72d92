//! Payment processor webhook reconciliation.
//!
//! The signature is checked against the raw body before anything is parsed.
//! Verified events are classified into [`WebhookEvent`] and applied at most
//! once: payment intent status is the idempotency marker for customer
//! checkouts, the subscription id for provider plans.

use crate::config::StripeConfig;
use crate::models::{
    Booking, CheckoutCompletion, CompletionOutcome, IntentUpdate, PaymentIntentStatus,
    SubscriptionSync, SubscriptionUpsert,
};
use crate::services::checkout::metadata;
use crate::services::error::BookingError;
use crate::services::metrics::{record_booking, record_error, record_webhook_event};
use crate::services::notifier::{Notice, NotificationDispatcher};
use crate::services::store::BookingStore;
use crate::services::stripe::{PaymentGateway, StripeSubscription};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::utils::signature::{verify_signature_header, SignatureError};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing {} header", SIGNATURE_HEADER)]
    MissingSignature,

    #[error("Webhook signing secret not configured")]
    NotConfigured,

    #[error("Webhook body is not valid UTF-8")]
    Encoding,

    #[error("Signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("Malformed event: {0}")]
    Malformed(String),
}

// =============================================================================
// Event classification
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPayment {
    pub session_id: String,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub cart_item_ids: Vec<Uuid>,
    pub stripe_payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSubscription {
    pub session_id: String,
    pub subscription_id: String,
    pub customer_id: Option<String>,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub subscription_id: String,
    pub status: String,
    pub current_period_end: Option<i64>,
}

impl From<StripeSubscription> for SubscriptionChange {
    fn from(subscription: StripeSubscription) -> Self {
        Self {
            current_period_end: subscription.period_end(),
            subscription_id: subscription.id,
            status: subscription.status,
        }
    }
}

/// Processor events this service acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompletedPayment(CompletedPayment),
    CheckoutCompletedSubscription(CompletedSubscription),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionChange),
    PaymentFailed { payment_id: Uuid },
    CheckoutExpired { payment_id: Uuid },
    Unhandled { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    mode: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

fn object<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(value).map_err(|e| WebhookError::Malformed(e.to_string()))
}

fn meta_uuid(meta: &BTreeMap<String, String>, key: &str) -> Result<Uuid, WebhookError> {
    let raw = meta
        .get(key)
        .ok_or_else(|| WebhookError::Malformed(format!("metadata.{} missing", key)))?;
    Uuid::parse_str(raw)
        .map_err(|_| WebhookError::Malformed(format!("metadata.{} is not a UUID", key)))
}

/// A JSON array of ids stored as a single metadata string. Absent means empty.
fn meta_uuid_list(meta: &BTreeMap<String, String>, key: &str) -> Result<Vec<Uuid>, WebhookError> {
    match meta.get(key) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| WebhookError::Malformed(format!("metadata.{}: {}", key, e))),
        None => Ok(Vec::new()),
    }
}

impl SessionObject {
    fn is_provider_subscription(&self) -> bool {
        self.metadata.get(metadata::SUBSCRIPTION_TYPE).map(String::as_str)
            == Some(metadata::PROVIDER_SUBSCRIPTION)
    }
}

impl WebhookEvent {
    /// Classify a verified event body. Returns the processor's event id too.
    pub fn parse(payload: &str) -> Result<(String, WebhookEvent), WebhookError> {
        let raw: RawEvent =
            serde_json::from_str(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        let object_value = raw.data.object;

        let event = match raw.event_type.as_str() {
            "checkout.session.completed" => {
                let session: SessionObject = object(object_value)?;
                match session.mode.as_deref() {
                    Some("payment") => {
                        let cart_item_ids =
                            meta_uuid_list(&session.metadata, metadata::CART_ITEMS)?;
                        WebhookEvent::CheckoutCompletedPayment(CompletedPayment {
                            payment_id: meta_uuid(&session.metadata, metadata::PAYMENT_ID)?,
                            user_id: meta_uuid(&session.metadata, metadata::USER_ID)?,
                            cart_item_ids,
                            stripe_payment_intent_id: session.payment_intent,
                            session_id: session.id,
                        })
                    }
                    Some("subscription") if session.is_provider_subscription() => {
                        let subscription_id = session.subscription.ok_or_else(|| {
                            WebhookError::Malformed("session has no subscription".into())
                        })?;
                        WebhookEvent::CheckoutCompletedSubscription(CompletedSubscription {
                            user_id: meta_uuid(&session.metadata, metadata::USER_ID)?,
                            subscription_id,
                            customer_id: session.customer,
                            session_id: session.id,
                        })
                    }
                    _ => WebhookEvent::Unhandled {
                        event_type: raw.event_type,
                    },
                }
            }
            "checkout.session.expired" => {
                let session: SessionObject = object(object_value)?;
                if session.mode.as_deref() == Some("payment") {
                    WebhookEvent::CheckoutExpired {
                        payment_id: meta_uuid(&session.metadata, metadata::PAYMENT_ID)?,
                    }
                } else {
                    WebhookEvent::Unhandled {
                        event_type: raw.event_type,
                    }
                }
            }
            "customer.subscription.updated" => {
                let subscription: StripeSubscription = object(object_value)?;
                WebhookEvent::SubscriptionUpdated(subscription.into())
            }
            "customer.subscription.deleted" => {
                let subscription: StripeSubscription = object(object_value)?;
                WebhookEvent::SubscriptionDeleted(subscription.into())
            }
            "payment_intent.payment_failed" => {
                let intent: PaymentIntentObject = object(object_value)?;
                match intent.metadata.get(metadata::PAYMENT_ID) {
                    Some(_) => WebhookEvent::PaymentFailed {
                        payment_id: meta_uuid(&intent.metadata, metadata::PAYMENT_ID)?,
                    },
                    // Subscription invoices fail through here too.
                    None => WebhookEvent::Unhandled {
                        event_type: raw.event_type,
                    },
                }
            }
            _ => WebhookEvent::Unhandled {
                event_type: raw.event_type,
            },
        };

        Ok((raw.id, event))
    }

    /// Metric label.
    pub fn name(&self) -> &'static str {
        match self {
            WebhookEvent::CheckoutCompletedPayment(_) => "checkout_completed_payment",
            WebhookEvent::CheckoutCompletedSubscription(_) => "checkout_completed_subscription",
            WebhookEvent::SubscriptionUpdated(_) => "subscription_updated",
            WebhookEvent::SubscriptionDeleted(_) => "subscription_deleted",
            WebhookEvent::PaymentFailed { .. } => "payment_failed",
            WebhookEvent::CheckoutExpired { .. } => "checkout_expired",
            WebhookEvent::Unhandled { .. } => "unhandled",
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Ignored(&'static str),
}

fn instant(secs: i64) -> Result<DateTime<Utc>, BookingError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| BookingError::Validation(format!("Invalid timestamp {}", secs)))
}

#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: NotificationDispatcher,
    webhook_secret: Secret<String>,
    tolerance_secs: i64,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationDispatcher,
        stripe: &StripeConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            webhook_secret: stripe.webhook_secret.clone(),
            tolerance_secs: stripe.webhook_tolerance_secs,
        }
    }

    /// Check the signature header against the raw body and hand back the
    /// body as text.
    pub fn verify<'a>(
        &self,
        signature: Option<&str>,
        payload: &'a [u8],
    ) -> Result<&'a str, WebhookError> {
        let secret = self.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(WebhookError::NotConfigured);
        }
        let header = signature.ok_or(WebhookError::MissingSignature)?;
        let body = std::str::from_utf8(payload).map_err(|_| WebhookError::Encoding)?;

        verify_signature_header(
            secret,
            header,
            body,
            self.tolerance_secs,
            Utc::now().timestamp(),
        )?;
        Ok(body)
    }

    /// Classify and apply a verified body.
    #[instrument(skip(self, payload), fields(event_id))]
    pub async fn process(&self, payload: &str) -> Result<Disposition, BookingError> {
        let (event_id, event) = WebhookEvent::parse(payload).map_err(|e| {
            record_webhook_event("malformed", "error");
            BookingError::Validation(e.to_string())
        })?;
        tracing::Span::current().record("event_id", event_id.as_str());
        self.apply(event).await
    }

    pub async fn apply(&self, event: WebhookEvent) -> Result<Disposition, BookingError> {
        let name = event.name();
        let result = match event {
            WebhookEvent::CheckoutCompletedPayment(completed) => {
                self.complete_payment(completed).await
            }
            WebhookEvent::CheckoutCompletedSubscription(completed) => {
                self.activate_subscription(completed).await
            }
            WebhookEvent::SubscriptionUpdated(change)
            | WebhookEvent::SubscriptionDeleted(change) => self.sync_subscription(change).await,
            WebhookEvent::PaymentFailed { payment_id } => self.fail_payment(payment_id).await,
            WebhookEvent::CheckoutExpired { payment_id } => {
                self.resolve_pending(payment_id, PaymentIntentStatus::Cancelled)
                    .await
            }
            WebhookEvent::Unhandled { event_type } => {
                info!(event_type = %event_type, "Ignoring unhandled event type");
                Ok(Disposition::Ignored("unhandled event type"))
            }
        };

        match &result {
            Ok(Disposition::Applied) => record_webhook_event(name, "applied"),
            Ok(Disposition::Ignored(reason)) => {
                info!(event = name, reason = *reason, "Webhook event ignored");
                record_webhook_event(name, "ignored");
            }
            Err(e) => {
                record_webhook_event(name, "error");
                record_error(e.kind(), "webhook");
            }
        }
        result
    }

    async fn complete_payment(
        &self,
        completed: CompletedPayment,
    ) -> Result<Disposition, BookingError> {
        let outcome = self
            .store
            .complete_checkout(CheckoutCompletion {
                payment_id: completed.payment_id,
                user_id: completed.user_id,
                cart_item_ids: completed.cart_item_ids,
                stripe_session_id: completed.session_id,
                stripe_payment_intent_id: completed.stripe_payment_intent_id,
            })
            .await?;

        match outcome {
            CompletionOutcome::AlreadyPaid(_) => {
                Ok(Disposition::Ignored("payment already applied"))
            }
            CompletionOutcome::Completed { intent, bookings } => {
                for _ in &bookings {
                    record_booking("checkout", "created");
                }
                info!(
                    payment_id = %intent.id,
                    bookings = bookings.len(),
                    "Checkout payment applied"
                );
                self.notify_provider(&bookings).await;
                Ok(Disposition::Applied)
            }
        }
    }

    async fn notify_provider(&self, bookings: &[Booking]) {
        let Some(first) = bookings.first() else {
            return;
        };
        let business = match self.store.get_business(first.business_id).await {
            Ok(Some(business)) => business,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not resolve provider for booking notice");
                return;
            }
        };
        let customer_name = match self.store.get_user(first.user_id).await {
            Ok(Some(user)) => user.name,
            _ => "a customer".to_string(),
        };

        let mut service_names: Vec<String> = Vec::new();
        for booking in bookings {
            if let Ok(Some(service)) = self.store.get_service(booking.service_id).await {
                if !service_names.contains(&service.name) {
                    service_names.push(service.name);
                }
            }
        }

        self.notifier.dispatch(Notice::booking_created(
            business.owner_id,
            first.user_id,
            &customer_name,
            &service_names,
            bookings,
        ));
    }

    async fn activate_subscription(
        &self,
        completed: CompletedSubscription,
    ) -> Result<Disposition, BookingError> {
        let subscription = self
            .gateway
            .retrieve_subscription(&completed.subscription_id)
            .await
            .map_err(|e| BookingError::Gateway(e.to_string()))?;

        let Some(price_id) = subscription.price_id() else {
            warn!(subscription_id = %subscription.id, "Subscription has no price");
            return Ok(Disposition::Ignored("subscription has no price"));
        };
        let Some(plan) = self.store.find_plan_by_price(price_id).await? else {
            warn!(price_id = %price_id, "No plan for subscription price");
            return Ok(Disposition::Ignored("unknown plan price"));
        };

        let start_secs = subscription
            .period_start()
            .or(subscription.created)
            .ok_or_else(|| BookingError::Validation("Subscription has no start time".into()))?;
        let start = instant(start_secs)?;
        let end = match subscription.period_end() {
            Some(secs) => instant(secs)?,
            None => start + plan.billing_interval.fallback_period(),
        };

        let stored = self
            .store
            .upsert_subscription(SubscriptionUpsert {
                user_id: completed.user_id,
                plan_id: plan.id,
                stripe_customer_id: completed
                    .customer_id
                    .or(subscription.customer.clone())
                    .unwrap_or_default(),
                stripe_subscription_id: subscription.id.clone(),
                status: subscription.status.clone(),
                current_period_start: start,
                current_period_end: end,
            })
            .await?;

        info!(
            user_id = %stored.user_id,
            plan = %plan.name,
            status = %stored.status,
            period_end = %stored.current_period_end,
            "Provider subscription recorded"
        );
        Ok(Disposition::Applied)
    }

    async fn sync_subscription(
        &self,
        change: SubscriptionChange,
    ) -> Result<Disposition, BookingError> {
        let current_period_end = change.current_period_end.map(instant).transpose()?;

        match self
            .store
            .sync_subscription(SubscriptionSync {
                stripe_subscription_id: change.subscription_id,
                status: change.status,
                current_period_end,
            })
            .await?
        {
            Some(updated) => {
                info!(
                    user_id = %updated.user_id,
                    status = %updated.status,
                    "Provider subscription updated"
                );
                Ok(Disposition::Applied)
            }
            None => Ok(Disposition::Ignored("unknown subscription")),
        }
    }

    async fn fail_payment(&self, payment_id: Uuid) -> Result<Disposition, BookingError> {
        let disposition = self
            .resolve_pending(payment_id, PaymentIntentStatus::Failed)
            .await?;
        if disposition == Disposition::Applied {
            if let Some(intent) = self.store.get_payment_intent(payment_id).await? {
                self.notifier
                    .dispatch(Notice::payment_failed(intent.user_id, intent.id));
            }
        }
        Ok(disposition)
    }

    async fn resolve_pending(
        &self,
        payment_id: Uuid,
        status: PaymentIntentStatus,
    ) -> Result<Disposition, BookingError> {
        match self
            .store
            .resolve_pending_payment(payment_id, status)
            .await?
        {
            IntentUpdate::Updated(intent) => {
                info!(payment_id = %intent.id, status = %intent.status, "Payment intent resolved");
                Ok(Disposition::Applied)
            }
            IntentUpdate::Unchanged(_) => Ok(Disposition::Ignored("payment already resolved")),
            IntentUpdate::Missing => Ok(Disposition::Ignored("unknown payment")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> String {
        json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        })
        .to_string()
    }

    #[test]
    fn completed_payment_session_carries_metadata() {
        let payment_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let items = vec![Uuid::new_v4(), Uuid::new_v4()];

        let body = event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "mode": "payment",
                "payment_intent": "pi_1",
                "metadata": {
                    "paymentId": payment_id.to_string(),
                    "userId": user_id.to_string(),
                    "addressId": Uuid::new_v4().to_string(),
                    "cartItems": serde_json::to_string(&items).unwrap(),
                }
            }),
        );

        let (id, parsed) = WebhookEvent::parse(&body).unwrap();
        assert_eq!(id, "evt_1");
        assert_eq!(
            parsed,
            WebhookEvent::CheckoutCompletedPayment(CompletedPayment {
                session_id: "cs_1".into(),
                payment_id,
                user_id,
                cart_item_ids: items,
                stripe_payment_intent_id: Some("pi_1".into()),
            })
        );
    }

    #[test]
    fn provider_subscription_session_is_recognised() {
        let user_id = Uuid::new_v4();
        let body = event(
            "checkout.session.completed",
            json!({
                "id": "cs_2",
                "mode": "subscription",
                "subscription": "sub_1",
                "customer": "cus_1",
                "metadata": { "userId": user_id.to_string(), "subscriptionType": "PROVIDER" }
            }),
        );

        let (_, parsed) = WebhookEvent::parse(&body).unwrap();
        match parsed {
            WebhookEvent::CheckoutCompletedSubscription(completed) => {
                assert_eq!(completed.user_id, user_id);
                assert_eq!(completed.subscription_id, "sub_1");
                assert_eq!(completed.customer_id.as_deref(), Some("cus_1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn payment_session_without_payment_id_is_malformed() {
        let body = event(
            "checkout.session.completed",
            json!({ "id": "cs_3", "mode": "payment", "metadata": {} }),
        );
        assert!(matches!(
            WebhookEvent::parse(&body),
            Err(WebhookError::Malformed(_))
        ));
    }

    #[test]
    fn subscription_update_reads_item_period() {
        let body = event(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "status": "past_due",
                "items": { "data": [{
                    "price": { "id": "price_basic" },
                    "current_period_end": 1_900_000_000
                }]}
            }),
        );

        let (_, parsed) = WebhookEvent::parse(&body).unwrap();
        assert_eq!(
            parsed,
            WebhookEvent::SubscriptionUpdated(SubscriptionChange {
                subscription_id: "sub_1".into(),
                status: "past_due".into(),
                current_period_end: Some(1_900_000_000),
            })
        );
    }

    #[test]
    fn unknown_types_are_unhandled() {
        let body = event("invoice.paid", json!({ "id": "in_1" }));
        let (_, parsed) = WebhookEvent::parse(&body).unwrap();
        assert_eq!(parsed.name(), "unhandled");
    }

    #[test]
    fn failed_intent_without_payment_id_is_unhandled() {
        let body = event(
            "payment_intent.payment_failed",
            json!({ "id": "pi_9", "metadata": {} }),
        );
        let (_, parsed) = WebhookEvent::parse(&body).unwrap();
        assert_eq!(parsed.name(), "unhandled");
    }
}

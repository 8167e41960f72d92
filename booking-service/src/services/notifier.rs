//! Fire-and-forget notification dispatch.
//!
//! Callers hand over a [`Notice`] and move on; delivery runs on its own task,
//! prunes device tokens FCM rejects and keeps an in-app record.

use crate::models::{Booking, BookingStatus, NewNotification};
use crate::services::error::BookingError;
use crate::services::metrics::record_notifications;
use crate::services::push::{ProviderError, PushMessage, PushProvider};
use crate::services::store::BookingStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    BookingCreated,
    BookingCancelled,
    BookingStatusUpdated,
    PaymentFailed,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::BookingCreated => "BOOKING_CREATED",
            NoticeKind::BookingCancelled => "BOOKING_CANCELLED",
            NoticeKind::BookingStatusUpdated => "BOOKING_STATUS_UPDATED",
            NoticeKind::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub receiver_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Notice {
    fn new(
        kind: NoticeKind,
        receiver_id: Uuid,
        sender_id: Option<Uuid>,
        title: &str,
        body: String,
    ) -> Self {
        let data = BTreeMap::from([("type".to_string(), kind.as_str().to_string())]);
        Self {
            kind,
            receiver_id,
            sender_id,
            title: title.to_string(),
            body,
            data,
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    /// Tell a provider about new bookings.
    pub fn booking_created(
        provider_user_id: Uuid,
        customer_id: Uuid,
        customer_name: &str,
        service_names: &[String],
        bookings: &[Booking],
    ) -> Self {
        let ids: Vec<String> = bookings.iter().map(|b| b.id.to_string()).collect();
        Self::new(
            NoticeKind::BookingCreated,
            provider_user_id,
            Some(customer_id),
            "New Booking Received",
            format!(
                "New booking for {} by {}",
                service_names.join(", "),
                customer_name
            ),
        )
        .with("bookingIds", ids.join(","))
    }

    pub fn booking_cancelled(provider_user_id: Uuid, booking: &Booking) -> Self {
        Self::new(
            NoticeKind::BookingCancelled,
            provider_user_id,
            Some(booking.user_id),
            "Booking Cancelled",
            format!("Booking for {} was cancelled by the customer", booking.booking_date),
        )
        .with("bookingId", booking.id)
    }

    pub fn booking_status_updated(provider_user_id: Uuid, booking: &Booking) -> Self {
        let body = match booking.booking_status {
            BookingStatus::Confirmed => "Your booking has been confirmed".to_string(),
            BookingStatus::Rejected => "Your booking was rejected by the provider".to_string(),
            other => format!("Your booking is now {}", other),
        };
        Self::new(
            NoticeKind::BookingStatusUpdated,
            booking.user_id,
            Some(provider_user_id),
            "Booking Updated",
            body,
        )
        .with("bookingId", booking.id)
        .with("status", booking.booking_status)
    }

    pub fn payment_failed(customer_id: Uuid, payment_id: Uuid) -> Self {
        Self::new(
            NoticeKind::PaymentFailed,
            customer_id,
            None,
            "Payment Failed",
            "Your payment could not be completed. No booking was made.".to_string(),
        )
        .with("paymentId", payment_id)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    pub pruned: u64,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn BookingStore>,
    push: Arc<dyn PushProvider>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn BookingStore>, push: Arc<dyn PushProvider>) -> Self {
        Self { store, push }
    }

    /// Deliver on a background task. The handle is only useful to tests.
    pub fn dispatch(&self, notice: Notice) -> JoinHandle<()> {
        let dispatcher = self.clone();
        let span = tracing::info_span!(
            "notification",
            kind = notice.kind.as_str(),
            receiver_id = %notice.receiver_id
        );
        tokio::spawn(
            async move {
                if let Err(e) = dispatcher.deliver(notice).await {
                    warn!(error = %e, "Notification delivery failed");
                }
            }
            .instrument(span),
        )
    }

    pub async fn deliver(&self, notice: Notice) -> Result<DeliveryReport, BookingError> {
        let mut report = DeliveryReport::default();

        if self.push.is_enabled() {
            let tokens = self.store.list_device_tokens(notice.receiver_id).await?;
            let mut invalid = Vec::new();

            for token in tokens {
                let message = PushMessage {
                    device_token: token,
                    title: notice.title.clone(),
                    body: notice.body.clone(),
                    data: notice.data.clone(),
                };
                match self.push.send(&message).await {
                    Ok(_) => report.sent += 1,
                    Err(ProviderError::InvalidRecipient(reason)) => {
                        debug!(reason = %reason, "Pruning device token");
                        invalid.push(message.device_token);
                    }
                    Err(e) => {
                        warn!(error = %e, "Push send failed");
                        report.failed += 1;
                    }
                }
            }

            if !invalid.is_empty() {
                report.pruned = self.store.delete_device_tokens(&invalid).await?;
            }
            record_notifications("sent", report.sent as u64);
            record_notifications("failed", report.failed as u64);
            record_notifications("pruned", report.pruned);
        }

        self.store
            .create_notification(NewNotification {
                receiver_id: notice.receiver_id,
                sender_id: notice.sender_id,
                title: notice.title,
                message: notice.body,
                data: serde_json::to_value(&notice.data).unwrap_or_default(),
            })
            .await?;

        Ok(report)
    }
}

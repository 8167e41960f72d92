//! Customer payment intents: this service's record of a checkout attempt.

use super::{Booking, UnknownVariant};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// PENDING until the processor reports an outcome. PAID is terminal; FAILED
/// and CANCELLED can still be overtaken by a late completion, because the
/// customer was charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentIntentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::Pending => "PENDING",
            PaymentIntentStatus::Paid => "PAID",
            PaymentIntentStatus::Failed => "FAILED",
            PaymentIntentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for PaymentIntentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentIntentStatus::Pending),
            "PAID" => Ok(PaymentIntentStatus::Paid),
            "FAILED" => Ok(PaymentIntentStatus::Failed),
            "CANCELLED" => Ok(PaymentIntentStatus::Cancelled),
            other => Err(UnknownVariant::new("payment intent status", other)),
        }
    }
}

impl TryFrom<String> for PaymentIntentStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentIntentStatus,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    /// Cart rows this attempt was created from.
    pub cart_item_ids: Vec<Uuid>,
    /// Bookings created when the payment completed.
    pub booking_ids: Vec<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a payment intent.
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub cart_item_ids: Vec<Uuid>,
}

/// Everything the reconciler learned from a completed checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutCompletion {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    /// Snapshot from the session metadata; rows removed since then simply
    /// produce no booking.
    pub cart_item_ids: Vec<Uuid>,
    pub stripe_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The intent was already PAID; nothing changed.
    AlreadyPaid(PaymentIntent),
    /// The intent is now PAID and these bookings exist.
    Completed {
        intent: PaymentIntent,
        bookings: Vec<Booking>,
    },
}

/// Result of a guarded status change on a payment intent.
#[derive(Debug, Clone)]
pub enum IntentUpdate {
    Updated(PaymentIntent),
    Unchanged(PaymentIntent),
    Missing,
}

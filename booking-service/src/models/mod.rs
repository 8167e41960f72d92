//! Domain models for booking-service.

pub mod booking;
pub mod cart;
pub mod directory;
pub mod notification;
pub mod payment;
pub mod slot;
pub mod subscription;

pub use booking::{
    Booking, BookingStatus, BookingStatusPatch, NewBooking, PaymentStatus, TransitionError,
};
pub use cart::{CartItem, NewCartItem};
pub use directory::{
    BusinessProfile, ProviderListing, ProviderProfile, ServiceListing, ServiceOffering, User,
    UserRole,
};
pub use notification::{DeviceToken, NewNotification, Notification};
pub use payment::{
    CheckoutCompletion, CompletionOutcome, IntentUpdate, NewPaymentIntent, PaymentIntent,
    PaymentIntentStatus,
};
pub use slot::{Slot, SlotWindow, SlotWindowError};
pub use subscription::{
    NewPlan, PlanInterval, ProviderSubscription, SubscriptionPlan, SubscriptionSync,
    SubscriptionUpsert, ACTIVE_STATUS,
};

use thiserror::Error;

/// A stored enum column held a value this build does not know.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

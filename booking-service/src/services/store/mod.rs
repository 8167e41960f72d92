//! Persistence boundary for booking-service.
//!
//! Every method is one atomic unit: implementations must make the slot
//! compare-and-swap, booking insert and payment-intent transition of a single
//! call commit or roll back together.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    Booking, BookingStatusPatch, BusinessProfile, CartItem, CheckoutCompletion,
    CompletionOutcome, DeviceToken, IntentUpdate, NewBooking, NewCartItem, NewNotification,
    NewPaymentIntent, NewPlan, Notification, PaymentIntent, PaymentIntentStatus,
    ProviderProfile, ProviderSubscription, ServiceOffering, Slot, SlotWindow, SubscriptionPlan,
    SubscriptionSync, SubscriptionUpsert, User,
};
use crate::services::error::BookingError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn health_check(&self) -> Result<(), BookingError>;

    // ===== Directory =====

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, BookingError>;

    async fn find_business_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<BusinessProfile>, BookingError>;

    async fn get_business(&self, business_id: Uuid)
        -> Result<Option<BusinessProfile>, BookingError>;

    async fn get_service(&self, service_id: Uuid) -> Result<Option<ServiceOffering>, BookingError>;

    async fn list_services_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<ServiceOffering>, BookingError>;

    /// Providers passing the visibility predicate at `now`.
    async fn list_visible_providers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProviderProfile>, BookingError>;

    async fn get_provider_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProviderProfile>, BookingError>;

    // ===== Slots =====

    /// Insert `windows` for a business (and service, for intervals). The
    /// whole batch is rejected if any window clashes with an existing one or
    /// with another window of the batch.
    async fn create_slots(
        &self,
        business_id: Uuid,
        service_id: Option<Uuid>,
        windows: Vec<SlotWindow>,
    ) -> Result<Vec<Slot>, BookingError>;

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, BookingError>;

    /// Slots `service` can be booked in, ordered by date, start time, label.
    async fn list_slots_for_service(
        &self,
        service: &ServiceOffering,
        only_free: bool,
    ) -> Result<Vec<Slot>, BookingError>;

    async fn delete_slot(&self, business_id: Uuid, slot_id: Uuid) -> Result<(), BookingError>;

    // ===== Cart =====

    async fn add_cart_item(&self, item: NewCartItem) -> Result<CartItem, BookingError>;

    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>, BookingError>;

    /// The subset of `ids` owned by `user_id`.
    async fn get_cart_items(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<CartItem>, BookingError>;

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, BookingError>;

    // ===== Bookings =====

    /// Claim the slot and create a PENDING booking. Fails with
    /// `SlotNotFound` when the slot does not serve the service and
    /// `SlotAlreadyBooked` when another booking holds it.
    async fn reserve_slot(&self, booking: NewBooking) -> Result<Booking, BookingError>;

    /// Customer cancellation; frees the slot.
    async fn cancel_booking(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        today: NaiveDate,
    ) -> Result<Booking, BookingError>;

    /// Provider-side transition; frees the slot when the new status releases it.
    async fn update_booking_status(
        &self,
        business_id: Uuid,
        booking_id: Uuid,
        patch: BookingStatusPatch,
    ) -> Result<Booking, BookingError>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, BookingError>;

    /// Newest first.
    async fn list_bookings_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError>;

    /// Newest first.
    async fn list_bookings_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Booking>, BookingError>;

    async fn has_live_booking(
        &self,
        user_id: Uuid,
        service_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, BookingError>;

    // ===== Payment intents =====

    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, BookingError>;

    async fn attach_checkout_session(
        &self,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<(), BookingError>;

    async fn get_payment_intent(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<PaymentIntent>, BookingError>;

    /// Turn the referenced cart rows into CONFIRMED bookings, mark the intent
    /// PAID and clear the rows. No-op when the intent is already PAID.
    async fn complete_checkout(
        &self,
        completion: CheckoutCompletion,
    ) -> Result<CompletionOutcome, BookingError>;

    /// Move a PENDING intent to `status`; any other state is left alone.
    async fn resolve_pending_payment(
        &self,
        payment_id: Uuid,
        status: PaymentIntentStatus,
    ) -> Result<IntentUpdate, BookingError>;

    // ===== Subscriptions =====

    /// Insert plans, skipping price ids that already exist. Returns the
    /// number inserted.
    async fn seed_plans(&self, plans: Vec<NewPlan>) -> Result<u64, BookingError>;

    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, BookingError>;

    async fn find_plan_by_price(
        &self,
        stripe_price_id: &str,
    ) -> Result<Option<SubscriptionPlan>, BookingError>;

    /// Upsert by user and point the user's subscription flag at the plan.
    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<ProviderSubscription, BookingError>;

    /// Apply a processor status change; `None` when no row matches.
    async fn sync_subscription(
        &self,
        sync: SubscriptionSync,
    ) -> Result<Option<ProviderSubscription>, BookingError>;

    async fn get_subscription_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProviderSubscription>, BookingError>;

    // ===== Notifications =====

    async fn register_device_token(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<DeviceToken, BookingError>;

    async fn list_device_tokens(&self, user_id: Uuid) -> Result<Vec<String>, BookingError>;

    async fn delete_device_tokens(&self, tokens: &[String]) -> Result<u64, BookingError>;

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BookingError>;

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, BookingError>;
}

//! In-process store.
//!
//! All tables sit behind one async mutex and every trait call holds it for
//! its whole duration, so each call is atomic. Used by the test suite and for
//! running the service without PostgreSQL.

use super::BookingStore;
use crate::models::{
    Booking, BookingStatus, BookingStatusPatch, BusinessProfile, CartItem, CheckoutCompletion,
    CompletionOutcome, DeviceToken, IntentUpdate, NewBooking, NewCartItem, NewNotification,
    NewPaymentIntent, NewPlan, Notification, PaymentIntent, PaymentIntentStatus, PaymentStatus,
    ProviderProfile, ProviderSubscription, ServiceOffering, Slot, SlotWindow, SubscriptionPlan,
    SubscriptionSync, SubscriptionUpsert, User, UserRole, ACTIVE_STATUS,
};
use crate::services::error::BookingError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    businesses: HashMap<Uuid, BusinessProfile>,
    services: HashMap<Uuid, ServiceOffering>,
    slots: HashMap<Uuid, Slot>,
    cart: HashMap<Uuid, CartItem>,
    bookings: HashMap<Uuid, Booking>,
    intents: HashMap<Uuid, PaymentIntent>,
    plans: HashMap<Uuid, SubscriptionPlan>,
    /// Keyed by provider user id.
    subscriptions: HashMap<Uuid, ProviderSubscription>,
    /// Keyed by token.
    device_tokens: HashMap<String, DeviceToken>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn provider_profile(&self, user_id: Uuid) -> Option<ProviderProfile> {
        let user = self.users.get(&user_id)?;
        if user.role != UserRole::Provider {
            return None;
        }
        let business = self.businesses.values().find(|b| b.owner_id == user_id)?;
        Some(ProviderProfile {
            user: user.clone(),
            business: business.clone(),
            subscription: self.subscriptions.get(&user_id).cloned(),
        })
    }

    fn release_slot(&mut self, slot_id: Uuid) {
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.is_booked = false;
            slot.booked_by = None;
        }
    }

    fn sync_user_flag(&mut self, subscription: &ProviderSubscription) {
        if let Some(user) = self.users.get_mut(&subscription.user_id) {
            user.subscription_status = subscription.status == ACTIVE_STATUS;
            user.subscription_plan_id = Some(subscription.plan_id);
        }
    }
}

fn newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.created_utc.cmp(&a.created_utc).then(b.id.cmp(&a.id)));
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Users, businesses and services are owned elsewhere; these seed them.

    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_business(&self, business: BusinessProfile) {
        self.tables
            .lock()
            .await
            .businesses
            .insert(business.id, business);
    }

    pub async fn insert_service(&self, service: ServiceOffering) {
        self.tables
            .lock()
            .await
            .services
            .insert(service.id, service);
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn health_check(&self) -> Result<(), BookingError> {
        Ok(())
    }

    // ===== Directory =====

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, BookingError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_business_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<BusinessProfile>, BookingError> {
        Ok(self
            .tables
            .lock()
            .await
            .businesses
            .values()
            .find(|b| b.owner_id == owner_id)
            .cloned())
    }

    async fn get_business(
        &self,
        business_id: Uuid,
    ) -> Result<Option<BusinessProfile>, BookingError> {
        Ok(self
            .tables
            .lock()
            .await
            .businesses
            .get(&business_id)
            .cloned())
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<ServiceOffering>, BookingError> {
        Ok(self.tables.lock().await.services.get(&service_id).cloned())
    }

    async fn list_services_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<ServiceOffering>, BookingError> {
        let tables = self.tables.lock().await;
        let mut services: Vec<_> = tables
            .services
            .values()
            .filter(|s| s.business_id == business_id && s.is_active)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then(a.id.cmp(&b.id)));
        Ok(services)
    }

    async fn list_visible_providers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProviderProfile>, BookingError> {
        let tables = self.tables.lock().await;
        let mut providers: Vec<_> = tables
            .users
            .keys()
            .filter_map(|id| tables.provider_profile(*id))
            .filter(|p| p.is_visible_at(now))
            .collect();
        providers.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        Ok(providers)
    }

    async fn get_provider_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProviderProfile>, BookingError> {
        Ok(self.tables.lock().await.provider_profile(user_id))
    }

    // ===== Slots =====

    async fn create_slots(
        &self,
        business_id: Uuid,
        service_id: Option<Uuid>,
        windows: Vec<SlotWindow>,
    ) -> Result<Vec<Slot>, BookingError> {
        let mut tables = self.tables.lock().await;

        let existing: Vec<SlotWindow> = tables
            .slots
            .values()
            .filter(|s| s.business_id == business_id)
            .filter(|s| match s.window {
                SlotWindow::Interval { .. } => s.service_id == service_id,
                SlotWindow::Labeled { .. } => true,
            })
            .map(|s| s.window.clone())
            .collect();

        if let Some((candidate, hit)) = SlotWindow::first_conflict(&windows, &existing) {
            return Err(BookingError::SlotOverlap {
                candidate: candidate.to_string(),
                existing: hit.to_string(),
            });
        }

        let now = Utc::now();
        let created: Vec<Slot> = windows
            .into_iter()
            .map(|window| Slot {
                id: Uuid::new_v4(),
                business_id,
                service_id,
                window,
                is_booked: false,
                booked_by: None,
                created_utc: now,
            })
            .collect();

        for slot in &created {
            tables.slots.insert(slot.id, slot.clone());
        }
        Ok(created)
    }

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, BookingError> {
        Ok(self.tables.lock().await.slots.get(&slot_id).cloned())
    }

    async fn list_slots_for_service(
        &self,
        service: &ServiceOffering,
        only_free: bool,
    ) -> Result<Vec<Slot>, BookingError> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<Slot> = tables
            .slots
            .values()
            .filter(|s| s.serves(service) && !(only_free && s.is_booked))
            .cloned()
            .collect();
        slots.sort_by(|a, b| {
            let key = |s: &Slot| match &s.window {
                SlotWindow::Interval {
                    date, start_time, ..
                } => (Some(*date), Some(*start_time), None),
                SlotWindow::Labeled { label } => (None, None, Some(label.clone())),
            };
            key(a).cmp(&key(b))
        });
        Ok(slots)
    }

    async fn delete_slot(&self, business_id: Uuid, slot_id: Uuid) -> Result<(), BookingError> {
        let mut tables = self.tables.lock().await;

        match tables.slots.get(&slot_id) {
            Some(slot) if slot.business_id == business_id => {}
            _ => return Err(BookingError::SlotNotFound),
        }
        if tables.bookings.values().any(|b| b.slot_id == slot_id) {
            return Err(BookingError::SlotInUse);
        }

        tables.slots.remove(&slot_id);
        tables.cart.retain(|_, item| item.slot_id != slot_id);
        Ok(())
    }

    // ===== Cart =====

    async fn add_cart_item(&self, item: NewCartItem) -> Result<CartItem, BookingError> {
        let mut tables = self.tables.lock().await;

        if tables
            .cart
            .values()
            .any(|c| c.user_id == item.user_id && c.selection() == item.selection())
        {
            return Err(BookingError::DuplicateCartItem);
        }

        let cart_item = CartItem {
            id: Uuid::new_v4(),
            user_id: item.user_id,
            service_id: item.service_id,
            business_id: item.business_id,
            slot_id: item.slot_id,
            booking_date: item.booking_date,
            created_utc: Utc::now(),
        };
        tables.cart.insert(cart_item.id, cart_item.clone());
        Ok(cart_item)
    }

    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>, BookingError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<_> = tables
            .cart
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn get_cart_items(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<CartItem>, BookingError> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.cart.get(id))
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, BookingError> {
        let mut tables = self.tables.lock().await;
        match tables.cart.get(&item_id) {
            Some(item) if item.user_id == user_id => {
                tables.cart.remove(&item_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ===== Bookings =====

    async fn reserve_slot(&self, booking: NewBooking) -> Result<Booking, BookingError> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let service = tables
            .services
            .get(&booking.service_id)
            .ok_or(BookingError::ServiceNotFound)?;
        let slot = tables
            .slots
            .get_mut(&booking.slot_id)
            .filter(|s| s.serves(service))
            .ok_or(BookingError::SlotNotFound)?;

        if slot.is_booked {
            return Err(BookingError::SlotAlreadyBooked);
        }
        slot.is_booked = true;
        slot.booked_by = Some(booking.user_id);

        let now = Utc::now();
        let created = Booking {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            business_id: booking.business_id,
            service_id: booking.service_id,
            slot_id: booking.slot_id,
            address_id: booking.address_id,
            payment_intent_id: None,
            total_amount: booking.total_amount,
            payment_status: PaymentStatus::Unpaid,
            booking_status: BookingStatus::Pending,
            status_reason: None,
            booking_date: booking.booking_date,
            created_utc: now,
            updated_utc: now,
        };
        tables.bookings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn cancel_booking(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        today: NaiveDate,
    ) -> Result<Booking, BookingError> {
        let mut tables = self.tables.lock().await;

        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| b.user_id == user_id)
            .ok_or(BookingError::BookingNotFound)?;
        booking.check_customer_cancel(today)?;

        booking.booking_status = BookingStatus::Cancelled;
        booking.updated_utc = Utc::now();
        let updated = booking.clone();

        tables.release_slot(updated.slot_id);
        Ok(updated)
    }

    async fn update_booking_status(
        &self,
        business_id: Uuid,
        booking_id: Uuid,
        patch: BookingStatusPatch,
    ) -> Result<Booking, BookingError> {
        let mut tables = self.tables.lock().await;

        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| b.business_id == business_id)
            .ok_or(BookingError::BookingNotFound)?;
        booking.booking_status.transition_to(patch.status)?;

        booking.payment_status = booking.payment_status_after(patch.status);
        booking.booking_status = patch.status;
        booking.status_reason = patch.reason;
        booking.updated_utc = Utc::now();
        let updated = booking.clone();

        if patch.status.releases_slot() {
            tables.release_slot(updated.slot_id);
        }
        Ok(updated)
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, BookingError> {
        Ok(self.tables.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn list_bookings_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<_> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut bookings);
        Ok(bookings)
    }

    async fn list_bookings_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Booking>, BookingError> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<_> = tables
            .bookings
            .values()
            .filter(|b| b.business_id == business_id)
            .cloned()
            .collect();
        newest_first(&mut bookings);
        Ok(bookings)
    }

    async fn has_live_booking(
        &self,
        user_id: Uuid,
        service_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, BookingError> {
        Ok(self.tables.lock().await.bookings.values().any(|b| {
            b.user_id == user_id
                && b.service_id == service_id
                && b.slot_id == slot_id
                && b.booking_date == date
                && b.booking_status.is_live()
        }))
    }

    // ===== Payment intents =====

    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, BookingError> {
        let now = Utc::now();
        let created = PaymentIntent {
            id: Uuid::new_v4(),
            user_id: intent.user_id,
            address_id: intent.address_id,
            amount: intent.amount,
            currency: intent.currency,
            status: PaymentIntentStatus::Pending,
            stripe_session_id: None,
            stripe_payment_intent_id: None,
            cart_item_ids: intent.cart_item_ids,
            booking_ids: Vec::new(),
            created_utc: now,
            updated_utc: now,
        };
        self.tables
            .lock()
            .await
            .intents
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn attach_checkout_session(
        &self,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<(), BookingError> {
        let mut tables = self.tables.lock().await;
        let intent = tables
            .intents
            .get_mut(&payment_id)
            .ok_or(BookingError::PaymentNotFound)?;
        intent.stripe_session_id = Some(session_id.to_string());
        intent.updated_utc = Utc::now();
        Ok(())
    }

    async fn get_payment_intent(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<PaymentIntent>, BookingError> {
        Ok(self.tables.lock().await.intents.get(&payment_id).cloned())
    }

    async fn complete_checkout(
        &self,
        completion: CheckoutCompletion,
    ) -> Result<CompletionOutcome, BookingError> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let intent = tables
            .intents
            .get(&completion.payment_id)
            .filter(|i| i.user_id == completion.user_id)
            .cloned()
            .ok_or(BookingError::PaymentNotFound)?;
        if intent.status == PaymentIntentStatus::Paid {
            return Ok(CompletionOutcome::AlreadyPaid(intent));
        }

        let items: Vec<CartItem> = completion
            .cart_item_ids
            .iter()
            .filter_map(|id| tables.cart.get(id))
            .filter(|c| c.user_id == completion.user_id)
            .cloned()
            .collect();

        // Check every row before touching anything so a conflict leaves no trace.
        let mut claimed = HashSet::new();
        let mut priced = Vec::with_capacity(items.len());
        for item in items {
            let service = tables
                .services
                .get(&item.service_id)
                .ok_or(BookingError::ServiceNotFound)?;
            let slot = tables
                .slots
                .get(&item.slot_id)
                .filter(|s| s.serves(service))
                .ok_or(BookingError::SlotNotFound)?;
            if slot.is_booked || !claimed.insert(slot.id) {
                return Err(BookingError::SlotAlreadyBooked);
            }
            priced.push((item, service.price));
        }

        let now = Utc::now();
        let mut bookings = Vec::with_capacity(priced.len());
        for (item, price) in priced {
            if let Some(slot) = tables.slots.get_mut(&item.slot_id) {
                slot.is_booked = true;
                slot.booked_by = Some(item.user_id);
            }
            let booking = Booking {
                id: Uuid::new_v4(),
                user_id: item.user_id,
                business_id: item.business_id,
                service_id: item.service_id,
                slot_id: item.slot_id,
                address_id: Some(intent.address_id),
                payment_intent_id: Some(intent.id),
                total_amount: price,
                payment_status: PaymentStatus::Paid,
                booking_status: BookingStatus::Confirmed,
                status_reason: None,
                booking_date: item.booking_date,
                created_utc: now,
                updated_utc: now,
            };
            tables.bookings.insert(booking.id, booking.clone());
            tables.cart.remove(&item.id);
            bookings.push(booking);
        }

        let stored = tables
            .intents
            .get_mut(&intent.id)
            .ok_or(BookingError::PaymentNotFound)?;
        stored.status = PaymentIntentStatus::Paid;
        stored.stripe_session_id = Some(completion.stripe_session_id);
        stored.stripe_payment_intent_id = completion.stripe_payment_intent_id;
        stored.booking_ids = bookings.iter().map(|b| b.id).collect();
        stored.updated_utc = now;

        Ok(CompletionOutcome::Completed {
            intent: stored.clone(),
            bookings,
        })
    }

    async fn resolve_pending_payment(
        &self,
        payment_id: Uuid,
        status: PaymentIntentStatus,
    ) -> Result<IntentUpdate, BookingError> {
        let mut tables = self.tables.lock().await;
        let Some(intent) = tables.intents.get_mut(&payment_id) else {
            return Ok(IntentUpdate::Missing);
        };
        if intent.status != PaymentIntentStatus::Pending {
            return Ok(IntentUpdate::Unchanged(intent.clone()));
        }
        intent.status = status;
        intent.updated_utc = Utc::now();
        Ok(IntentUpdate::Updated(intent.clone()))
    }

    // ===== Subscriptions =====

    async fn seed_plans(&self, plans: Vec<NewPlan>) -> Result<u64, BookingError> {
        let mut tables = self.tables.lock().await;
        let mut inserted = 0;
        for plan in plans {
            if tables
                .plans
                .values()
                .any(|p| p.stripe_price_id == plan.stripe_price_id)
            {
                continue;
            }
            let created = SubscriptionPlan {
                id: Uuid::new_v4(),
                name: plan.name,
                price: plan.price,
                currency: plan.currency,
                billing_interval: plan.billing_interval,
                stripe_price_id: plan.stripe_price_id,
                is_active: true,
                created_utc: Utc::now(),
            };
            tables.plans.insert(created.id, created);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, BookingError> {
        let tables = self.tables.lock().await;
        let mut plans: Vec<_> = tables
            .plans
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(plans)
    }

    async fn find_plan_by_price(
        &self,
        stripe_price_id: &str,
    ) -> Result<Option<SubscriptionPlan>, BookingError> {
        Ok(self
            .tables
            .lock()
            .await
            .plans
            .values()
            .find(|p| p.stripe_price_id == stripe_price_id)
            .cloned())
    }

    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<ProviderSubscription, BookingError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        let subscription = match tables.subscriptions.get_mut(&upsert.user_id) {
            Some(existing) => {
                existing.plan_id = upsert.plan_id;
                existing.stripe_customer_id = upsert.stripe_customer_id;
                existing.stripe_subscription_id = upsert.stripe_subscription_id;
                existing.status = upsert.status;
                existing.current_period_start = upsert.current_period_start;
                existing.current_period_end = upsert.current_period_end;
                existing.updated_utc = now;
                existing.clone()
            }
            None => {
                let created = ProviderSubscription {
                    id: Uuid::new_v4(),
                    user_id: upsert.user_id,
                    plan_id: upsert.plan_id,
                    stripe_customer_id: upsert.stripe_customer_id,
                    stripe_subscription_id: upsert.stripe_subscription_id,
                    status: upsert.status,
                    current_period_start: upsert.current_period_start,
                    current_period_end: upsert.current_period_end,
                    created_utc: now,
                    updated_utc: now,
                };
                tables.subscriptions.insert(created.user_id, created.clone());
                created
            }
        };

        tables.sync_user_flag(&subscription);
        Ok(subscription)
    }

    async fn sync_subscription(
        &self,
        sync: SubscriptionSync,
    ) -> Result<Option<ProviderSubscription>, BookingError> {
        let mut tables = self.tables.lock().await;

        let Some(subscription) = tables
            .subscriptions
            .values_mut()
            .find(|s| s.stripe_subscription_id == sync.stripe_subscription_id)
        else {
            return Ok(None);
        };
        subscription.status = sync.status;
        if let Some(end) = sync.current_period_end {
            subscription.current_period_end = end;
        }
        subscription.updated_utc = Utc::now();
        let updated = subscription.clone();

        tables.sync_user_flag(&updated);
        Ok(Some(updated))
    }

    async fn get_subscription_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProviderSubscription>, BookingError> {
        Ok(self
            .tables
            .lock()
            .await
            .subscriptions
            .get(&user_id)
            .cloned())
    }

    // ===== Notifications =====

    async fn register_device_token(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<DeviceToken, BookingError> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .device_tokens
            .entry(token.to_string())
            .or_insert_with(|| DeviceToken {
                id: Uuid::new_v4(),
                user_id,
                token: token.to_string(),
                created_utc: Utc::now(),
            });
        entry.user_id = user_id;
        Ok(entry.clone())
    }

    async fn list_device_tokens(&self, user_id: Uuid) -> Result<Vec<String>, BookingError> {
        let tables = self.tables.lock().await;
        let mut tokens: Vec<_> = tables
            .device_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.token.clone())
            .collect();
        tokens.sort();
        Ok(tokens)
    }

    async fn delete_device_tokens(&self, tokens: &[String]) -> Result<u64, BookingError> {
        let mut tables = self.tables.lock().await;
        let removed = tokens
            .iter()
            .filter(|t| tables.device_tokens.remove(t.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BookingError> {
        let created = Notification {
            id: Uuid::new_v4(),
            receiver_id: notification.receiver_id,
            sender_id: notification.sender_id,
            title: notification.title,
            message: notification.message,
            data: notification.data,
            is_read: false,
            created_utc: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .notifications
            .push(created.clone());
        Ok(created)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, BookingError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.receiver_id == user_id)
            .cloned()
            .collect())
    }
}

//! Checkout orchestration.
//!
//! Turns cart rows into a PENDING payment intent and a hosted checkout
//! session. Bookings are not created here; the webhook reconciler creates
//! them once the processor reports the payment complete.

use crate::config::{FrontendConfig, StripeConfig};
use crate::models::{NewPaymentIntent, PaymentIntent, PaymentIntentStatus, UserRole};
use crate::services::directory::owned_business;
use crate::services::error::BookingError;
use crate::services::metrics::{record_checkout_session, record_error};
use crate::services::store::BookingStore;
use crate::services::stripe::{CheckoutSessionRequest, LineItem, PaymentGateway, SessionMode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

/// Metadata keys shared with the webhook reconciler.
pub mod metadata {
    pub const USER_ID: &str = "userId";
    pub const ADDRESS_ID: &str = "addressId";
    pub const PAYMENT_ID: &str = "paymentId";
    pub const CART_ITEMS: &str = "cartItems";
    pub const BUSINESS_PROFILE_ID: &str = "businessProfileId";
    pub const SUBSCRIPTION_TYPE: &str = "subscriptionType";
    pub const PROVIDER_SUBSCRIPTION: &str = "PROVIDER";
}

/// Largest selection one checkout accepts. The id list travels as a single
/// processor metadata value, which is capped at 500 characters.
pub const MAX_CHECKOUT_ITEMS: usize = 12;

/// Where to send the browser, plus the ids needed to poll the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRedirect {
    pub url: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    frontend: FrontendConfig,
}

/// Minor units as the processor expects them.
fn minor_units(amount: Decimal) -> Result<i64, BookingError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| BookingError::Validation(format!("Amount {} is out of range", amount)))
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        stripe: &StripeConfig,
        frontend: FrontendConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            currency: stripe.currency.clone(),
            frontend,
        }
    }

    /// Validate the selected cart rows, record a PENDING intent and open a
    /// hosted payment session for it.
    #[instrument(
        skip(self, cart_item_ids),
        fields(user_id = %user_id, items = cart_item_ids.len(), payment_id)
    )]
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        cart_item_ids: Vec<Uuid>,
        address_id: Uuid,
    ) -> Result<CheckoutRedirect, BookingError> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = cart_item_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Err(BookingError::Validation("No cart items selected".into()));
        }
        if ids.len() > MAX_CHECKOUT_ITEMS {
            return Err(BookingError::Validation(format!(
                "At most {} cart items can be checked out together",
                MAX_CHECKOUT_ITEMS
            )));
        }

        let items = self.store.get_cart_items(user_id, &ids).await?;
        if items.len() != ids.len() {
            return Err(BookingError::CartItemNotFound);
        }

        let business_id = items[0].business_id;
        if items.iter().any(|item| item.business_id != business_id) {
            return Err(BookingError::CrossBusinessCart);
        }

        let mut amount = Decimal::ZERO;
        let mut line_items = Vec::with_capacity(items.len());
        for item in &items {
            if self
                .store
                .has_live_booking(user_id, item.service_id, item.slot_id, item.booking_date)
                .await?
            {
                return Err(BookingError::AlreadyBooked);
            }

            let slot = self
                .store
                .get_slot(item.slot_id)
                .await?
                .ok_or(BookingError::SlotNotFound)?;
            if slot.is_booked {
                return Err(BookingError::SlotAlreadyBooked);
            }

            let service = self
                .store
                .get_service(item.service_id)
                .await?
                .ok_or(BookingError::ServiceNotFound)?;
            amount += service.price;
            line_items.push(LineItem {
                name: service.name,
                unit_amount: minor_units(service.price)?,
                quantity: 1,
            });
        }

        let intent = self
            .store
            .create_payment_intent(NewPaymentIntent {
                user_id,
                address_id,
                amount,
                currency: self.currency.clone(),
                cart_item_ids: ids.clone(),
            })
            .await?;
        Span::current().record("payment_id", intent.id.to_string());

        let cart_items = serde_json::to_string(&ids)
            .map_err(|e| BookingError::Internal(anyhow::anyhow!(e)))?;
        let request = CheckoutSessionRequest {
            mode: SessionMode::Payment {
                currency: self.currency.clone(),
                line_items,
            },
            success_url: self.frontend.success_url.clone(),
            cancel_url: self.frontend.cancel_url.clone(),
            customer_email: None,
            metadata: BTreeMap::from([
                (metadata::USER_ID.to_string(), user_id.to_string()),
                (metadata::ADDRESS_ID.to_string(), address_id.to_string()),
                (metadata::PAYMENT_ID.to_string(), intent.id.to_string()),
                (metadata::CART_ITEMS.to_string(), cart_items),
            ]),
        };

        let session = match self.gateway.create_checkout_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Checkout session creation failed");
                record_checkout_session("payment", "error");
                record_error("gateway", "create_checkout");
                self.store
                    .resolve_pending_payment(intent.id, PaymentIntentStatus::Cancelled)
                    .await?;
                return Err(BookingError::Gateway(e.to_string()));
            }
        };
        let url = session
            .url
            .ok_or_else(|| BookingError::Gateway("Checkout session has no redirect URL".into()))?;

        self.store
            .attach_checkout_session(intent.id, &session.id)
            .await?;
        record_checkout_session("payment", "created");
        info!(session_id = %session.id, amount = %amount, "Checkout session created");

        Ok(CheckoutRedirect {
            url,
            session_id: session.id,
            payment_id: Some(intent.id),
        })
    }

    /// Recurring-plan checkout for a provider. No payment intent is kept;
    /// the subscription ledger is written when the processor confirms.
    #[instrument(skip(self))]
    pub async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        price_id: &str,
    ) -> Result<CheckoutRedirect, BookingError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .filter(|u| u.role == UserRole::Provider)
            .ok_or_else(|| BookingError::Forbidden("Only providers can subscribe".into()))?;
        let business = owned_business(self.store.as_ref(), user_id).await?;

        let plan = self
            .store
            .find_plan_by_price(price_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(BookingError::PlanNotFound)?;

        let request = CheckoutSessionRequest {
            mode: SessionMode::Subscription {
                price_id: plan.stripe_price_id.clone(),
            },
            success_url: self.frontend.provider_success_url.clone(),
            cancel_url: self.frontend.provider_cancel_url.clone(),
            customer_email: Some(user.email),
            metadata: BTreeMap::from([
                (metadata::USER_ID.to_string(), user_id.to_string()),
                (
                    metadata::BUSINESS_PROFILE_ID.to_string(),
                    business.id.to_string(),
                ),
                (
                    metadata::SUBSCRIPTION_TYPE.to_string(),
                    metadata::PROVIDER_SUBSCRIPTION.to_string(),
                ),
            ]),
        };

        let session = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|e| {
                warn!(error = %e, "Subscription session creation failed");
                record_checkout_session("subscription", "error");
                BookingError::Gateway(e.to_string())
            })?;
        let url = session
            .url
            .ok_or_else(|| BookingError::Gateway("Checkout session has no redirect URL".into()))?;

        record_checkout_session("subscription", "created");
        info!(session_id = %session.id, plan = %plan.name, "Subscription session created");
        Ok(CheckoutRedirect {
            url,
            session_id: session.id,
            payment_id: None,
        })
    }

    /// The caller's own payment intent.
    pub async fn get_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> Result<PaymentIntent, BookingError> {
        self.store
            .get_payment_intent(payment_id)
            .await?
            .filter(|intent| intent.user_id == user_id)
            .ok_or(BookingError::PaymentNotFound)
    }
}

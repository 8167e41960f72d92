//! Test helpers for booking-service integration tests.
//!
//! Builds the full router over the in-memory store, a scripted payment
//! gateway and a recording push provider, and drives it with `oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use booking_service::config::{
    BookingConfig, DatabaseConfig, FcmConfig, FrontendConfig, StripeConfig,
};
use booking_service::models::{
    BusinessProfile, NewCartItem, NewPlan, PlanInterval, ServiceOffering, SlotWindow, User,
    UserRole,
};
use booking_service::services::stripe::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, Price,
    StripeSubscription, SubscriptionItem, SubscriptionItems,
};
use booking_service::services::{init_metrics, BookingStore, MemoryStore, MockPushProvider};
use booking_service::startup::{build_router, AppState, Application};
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::Value;
use service_core::config::Config as CoreConfig;
use service_core::utils::signature::signature_header;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

// ============================================================================
// Fake payment gateway
// ============================================================================

/// Records every session request and answers from a script.
#[derive(Default)]
pub struct FakeGateway {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    subscriptions: Mutex<HashMap<String, StripeSubscription>>,
    fail: AtomicBool,
    counter: AtomicU32,
}

impl FakeGateway {
    pub fn fail_sessions(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn add_subscription(&self, subscription: StripeSubscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                message: "processor unavailable".into(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{}", n);
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.test/pay/{}", id)),
            id,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: format!("No such subscription: {}", subscription_id),
            })
    }
}

/// A Stripe subscription on `price_id` with a 30 day period from now.
pub fn stripe_subscription(id: &str, price_id: &str, status: &str) -> StripeSubscription {
    let now = Utc::now().timestamp();
    StripeSubscription {
        id: id.to_string(),
        customer: Some("cus_test".to_string()),
        status: status.to_string(),
        created: Some(now),
        current_period_start: None,
        current_period_end: None,
        items: SubscriptionItems {
            data: vec![SubscriptionItem {
                price: Price {
                    id: price_id.to_string(),
                    recurring: None,
                },
                current_period_start: Some(now),
                current_period_end: Some(now + 30 * 24 * 3600),
            }],
        },
        metadata: BTreeMap::new(),
    }
}

// ============================================================================
// Test application
// ============================================================================

pub struct Provider {
    pub user_id: Uuid,
    pub business_id: Uuid,
}

#[derive(Clone)]
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub push: Arc<MockPushProvider>,
}

pub fn stripe_config() -> StripeConfig {
    StripeConfig {
        secret_key: Secret::new("sk_test_123".to_string()),
        webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
        api_base_url: "http://127.0.0.1:9".to_string(),
        currency: "inr".to_string(),
        webhook_tolerance_secs: 300,
    }
}

pub fn frontend_config() -> FrontendConfig {
    FrontendConfig {
        success_url: "http://localhost:3000/payment/success".to_string(),
        cancel_url: "http://localhost:3000/payment/cancel".to_string(),
        provider_success_url: "http://localhost:3000/provider/success".to_string(),
        provider_cancel_url: "http://localhost:3000/provider/cancel".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
    }
}

/// Full service config bound to an ephemeral localhost port.
pub fn booking_config() -> BookingConfig {
    BookingConfig {
        common: CoreConfig {
            host: [127, 0, 0, 1].into(),
            port: 0,
        },
        service_name: "booking-service".to_string(),
        service_version: "test".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new(String::new()),
            max_connections: 1,
            min_connections: 1,
        },
        stripe: stripe_config(),
        frontend: frontend_config(),
        fcm: FcmConfig {
            enabled: false,
            project_id: String::new(),
            service_account_key: Secret::new(String::new()),
            api_base_url: "http://127.0.0.1:9".to_string(),
        },
    }
}

pub fn future_date(days: u64) -> NaiveDate {
    Utc::now().date_naive() + Days::new(days)
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

impl TestApp {
    pub fn spawn() -> Self {
        init_metrics();

        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let push = Arc::new(MockPushProvider::new());

        let state = AppState::new(
            store.clone(),
            gateway.clone(),
            push.clone(),
            &stripe_config(),
            frontend_config(),
        );

        TestApp {
            router: build_router(state),
            store,
            gateway,
            push,
        }
    }

    /// Serve the same wiring over a real socket. Returns the base URL.
    pub async fn serve(&self) -> String {
        let state = AppState::new(
            self.store.clone(),
            self.gateway.clone(),
            self.push.clone(),
            &stripe_config(),
            frontend_config(),
        );
        let app = Application::with_state(state, &booking_config())
            .await
            .expect("Failed to bind test server");
        let address = format!("http://127.0.0.1:{}", app.port());
        tokio::spawn(app.run_until_stopped());
        address
    }

    // ===== Seeding =====

    pub async fn seed_user(&self, role: UserRole) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_user(User {
                id,
                name: format!("{} {}", role.as_str(), &id.to_string()[..8]),
                email: format!("{}@example.com", id),
                role,
                subscription_status: false,
                subscription_plan_id: None,
                created_utc: Utc::now(),
            })
            .await;
        id
    }

    pub async fn seed_provider(&self, business_name: &str) -> Provider {
        let user_id = self.seed_user(UserRole::Provider).await;
        let business_id = Uuid::new_v4();
        self.store
            .insert_business(BusinessProfile {
                id: business_id,
                owner_id: user_id,
                business_name: business_name.to_string(),
                is_active: true,
                created_utc: Utc::now(),
            })
            .await;
        Provider {
            user_id,
            business_id,
        }
    }

    pub async fn seed_service(&self, business_id: Uuid, name: &str, price: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_service(ServiceOffering {
                id,
                business_id,
                name: name.to_string(),
                price: Decimal::from(price),
                is_active: true,
                created_utc: Utc::now(),
            })
            .await;
        id
    }

    /// A one-hour interval slot on `date` starting at `hour`.
    pub async fn seed_slot(
        &self,
        business_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        hour: u32,
    ) -> Uuid {
        let window = SlotWindow::Interval {
            date,
            start_time: time(hour, 0),
            end_time: time(hour + 1, 0),
        };
        self.store
            .create_slots(business_id, Some(service_id), vec![window])
            .await
            .expect("slot insert")
            .remove(0)
            .id
    }

    pub async fn seed_cart_item(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        service_id: Uuid,
        slot_id: Uuid,
        booking_date: NaiveDate,
    ) -> Uuid {
        self.store
            .add_cart_item(NewCartItem {
                user_id,
                service_id,
                business_id,
                slot_id,
                booking_date,
            })
            .await
            .expect("cart insert")
            .id
    }

    pub async fn seed_plan(&self, price_id: &str) -> Uuid {
        self.store
            .seed_plans(vec![NewPlan {
                name: "Pro".to_string(),
                price: Decimal::from(999),
                currency: "inr".to_string(),
                billing_interval: PlanInterval::Month,
                stripe_price_id: price_id.to_string(),
            }])
            .await
            .expect("plan seed");
        self.store
            .find_plan_by_price(price_id)
            .await
            .unwrap()
            .expect("seeded plan")
            .id
    }

    // ===== Requests =====

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(user), Some(body)).await
    }

    /// Deliver a webhook body signed with the test secret.
    pub async fn post_webhook(&self, payload: &str) -> (StatusCode, Value) {
        let header = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), payload).unwrap();
        self.post_webhook_with(payload, Some(header)).await
    }

    pub async fn post_webhook_with(
        &self,
        payload: &str,
        signature: Option<String>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhooks/stripe")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        let request = builder.body(Body::from(payload.to_string())).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    /// Wait for spawned notification tasks to write their records.
    pub async fn wait_for_notifications(&self, user_id: Uuid, count: usize) -> Vec<Value> {
        for _ in 0..50 {
            let list = self.store.list_notifications(user_id).await.unwrap();
            if list.len() >= count {
                return list
                    .into_iter()
                    .map(|n| serde_json::to_value(n).unwrap())
                    .collect();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} notifications for {}", count, user_id);
    }
}

// ============================================================================
// Webhook payloads
// ============================================================================

pub fn event(event_type: &str, object: Value) -> String {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object }
    })
    .to_string()
}

pub fn completed_payment_event(
    session_id: &str,
    user_id: Uuid,
    payment_id: Uuid,
    cart_item_ids: &[Uuid],
) -> String {
    event(
        "checkout.session.completed",
        serde_json::json!({
            "id": session_id,
            "object": "checkout.session",
            "mode": "payment",
            "payment_intent": "pi_test_1",
            "metadata": {
                "userId": user_id.to_string(),
                "addressId": Uuid::new_v4().to_string(),
                "paymentId": payment_id.to_string(),
                "cartItems": serde_json::to_string(cart_item_ids).unwrap(),
            }
        }),
    )
}

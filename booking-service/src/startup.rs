//! Application startup and lifecycle management.

use crate::config::{BookingConfig, FrontendConfig, StripeConfig};
use crate::handlers;
use crate::services::{
    init_metrics, BookingService, BookingStore, CartService, CheckoutService, DirectoryService,
    DisabledPushProvider, FcmProvider, NotificationDispatcher, PaymentGateway, PgStore,
    PushProvider, SlotService, StripeClient, SubscriptionService, WebhookReconciler,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub slots: SlotService,
    pub bookings: BookingService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
    pub directory: DirectoryService,
    pub webhooks: WebhookReconciler,
    pub notifier: NotificationDispatcher,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    /// Wire the services over one store, gateway and push provider.
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        push: Arc<dyn PushProvider>,
        stripe: &StripeConfig,
        frontend: FrontendConfig,
    ) -> Self {
        let notifier = NotificationDispatcher::new(store.clone(), push);
        let allowed_origins = frontend.allowed_origins.clone();

        Self {
            slots: SlotService::new(store.clone()),
            bookings: BookingService::new(store.clone(), notifier.clone()),
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), gateway.clone(), stripe, frontend),
            subscriptions: SubscriptionService::new(store.clone()),
            directory: DirectoryService::new(store.clone()),
            webhooks: WebhookReconciler::new(store.clone(), gateway, notifier.clone(), stripe),
            notifier,
            store,
            allowed_origins,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-request-id"),
        ])
}

/// Build the HTTP router with every route and the shared middleware stack.
pub fn build_router(state: AppState) -> Router {
    let customer_routes = Router::new()
        .route("/providers", get(handlers::list_providers))
        .route("/providers/:provider_id", get(handlers::get_provider))
        .route(
            "/services/:service_id/slots",
            get(handlers::list_available_slots),
        )
        .route(
            "/bookings",
            get(handlers::list_my_bookings).post(handlers::create_booking),
        )
        .route("/bookings/:booking_id/cancel", patch(handlers::cancel_booking))
        .route("/cart", get(handlers::list_cart).post(handlers::add_to_cart))
        .route("/cart/:cart_item_id", delete(handlers::remove_cart_item))
        .route("/checkout/sessions", post(handlers::create_checkout_session))
        .route("/payments/:payment_id", get(handlers::get_payment));

    let provider_routes = Router::new()
        .route("/provider/slots", post(handlers::create_slot))
        .route("/provider/slots/generate", post(handlers::generate_slots))
        .route("/provider/slots/:slot_id", delete(handlers::delete_slot))
        .route(
            "/provider/services/:service_id/slots",
            get(handlers::list_service_slots),
        )
        .route("/provider/bookings", get(handlers::list_business_bookings))
        .route(
            "/provider/bookings/:booking_id",
            patch(handlers::update_booking_status),
        )
        .route(
            "/provider/subscriptions/checkout",
            post(handlers::create_subscription_checkout),
        )
        .route(
            "/provider/subscriptions/me",
            get(handlers::get_my_subscription),
        );

    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/webhooks/stripe", post(handlers::stripe_webhook))
        .route(
            "/subscription-plans",
            get(handlers::list_plans).post(handlers::seed_plans),
        )
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/device-tokens",
            post(handlers::register_device_token),
        )
        .merge(customer_routes)
        .merge(provider_routes)
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect to PostgreSQL, run migrations, and bind the listener.
    pub async fn build(config: BookingConfig) -> Result<Self, AppError> {
        init_metrics();

        let store = PgStore::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            AppError::from(e)
        })?;

        store.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            AppError::from(e)
        })?;

        if !config.stripe.is_configured() {
            tracing::warn!("STRIPE_SECRET_KEY is not set; checkout requests will fail");
        }
        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(config.stripe.clone()));

        let push: Arc<dyn PushProvider> = if config.fcm.enabled {
            Arc::new(FcmProvider::new(config.fcm.clone()).map_err(|e| {
                tracing::error!(error = %e, "Failed to initialise FCM provider");
                AppError::ConfigError(anyhow::anyhow!("FCM: {}", e))
            })?)
        } else {
            tracing::info!("Push notifications disabled");
            Arc::new(DisabledPushProvider)
        };

        let state = AppState::new(
            Arc::new(store),
            gateway,
            push,
            &config.stripe,
            config.frontend.clone(),
        );

        Self::with_state(state, &config).await
    }

    /// Bind the listener for an already wired state.
    pub async fn with_state(state: AppState, config: &BookingConfig) -> Result<Self, AppError> {
        let addr = config.common.bind_address();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "Booking service listener bound");

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = "booking-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );
        axum::serve(self.listener, self.router).await
    }
}

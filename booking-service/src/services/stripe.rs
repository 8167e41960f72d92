//! Stripe client for hosted checkout.
//!
//! Talks to the Stripe REST API with form-encoded requests and the secret key
//! as bearer token. Only the two calls the booking flows need are modelled:
//! creating a Checkout Session and retrieving a Subscription.

use crate::config::StripeConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::observability::TracedRequestExt;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment processor credentials not configured")]
    NotConfigured,

    #[error("Payment processor unreachable: {0}")]
    Connection(String),

    #[error("Payment processor returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment processor response: {0}")]
    Decode(String),
}

/// One priced line of a one-off payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    /// Smallest currency unit.
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    Payment {
        currency: String,
        line_items: Vec<LineItem>,
    },
    Subscription {
        price_id: String,
    },
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Payment { .. } => "payment",
            SessionMode::Subscription { .. } => "subscription",
        }
    }
}

/// Everything needed to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub mode: SessionMode,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    /// Returned verbatim on the session and copied onto the payment intent
    /// or subscription Stripe creates for it.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recurring {
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// The subset of a Stripe Subscription object the ledger uses. Newer API
/// versions report billing periods per item rather than on the subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    pub created: Option<i64>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl StripeSubscription {
    pub fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.data.first()
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item().map(|item| item.price.id.as_str())
    }

    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.first_item().and_then(|i| i.current_period_start))
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError>;
}

/// Flatten a session request into Stripe's bracketed form fields.
pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }

    let nested_metadata = match &request.mode {
        SessionMode::Payment {
            currency,
            line_items,
        } => {
            form.push(("payment_method_types[0]".to_string(), "card".to_string()));
            for (i, item) in line_items.iter().enumerate() {
                let prefix = format!("line_items[{}]", i);
                form.push((
                    format!("{}[price_data][currency]", prefix),
                    currency.clone(),
                ));
                form.push((
                    format!("{}[price_data][product_data][name]", prefix),
                    item.name.clone(),
                ));
                form.push((
                    format!("{}[price_data][unit_amount]", prefix),
                    item.unit_amount.to_string(),
                ));
                form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
            }
            "payment_intent_data"
        }
        SessionMode::Subscription { price_id } => {
            form.push(("line_items[0][price]".to_string(), price_id.clone()));
            form.push(("line_items[0][quantity]".to_string(), "1".to_string()));
            "subscription_data"
        }
    };

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
        form.push((
            format!("{}[metadata][{}]", nested_metadata, key),
            value.clone(),
        ));
    }

    form
}

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if Stripe is configured (secret key is set).
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);
        tracing::warn!(status = %status, message = %message, "Stripe request failed");
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!("{}/checkout/sessions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .with_trace_context()
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        let session: CheckoutSession = Self::read_response(response).await?;
        tracing::info!(
            session_id = %session.id,
            mode = request.mode.as_str(),
            "Stripe checkout session created"
        );
        Ok(session)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!(
            "{}/subscriptions/{}",
            self.config.api_base_url, subscription_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .with_trace_context()
            .send()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        Self::read_response(response).await
    }
}

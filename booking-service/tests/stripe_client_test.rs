//! StripeClient against a mock Stripe API.

use booking_service::config::StripeConfig;
use booking_service::services::stripe::{
    CheckoutSessionRequest, GatewayError, LineItem, PaymentGateway, SessionMode, StripeClient,
};
use secrecy::Secret;
use std::collections::BTreeMap;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str, secret_key: &str) -> StripeConfig {
    StripeConfig {
        secret_key: Secret::new(secret_key.to_string()),
        webhook_secret: Secret::new("whsec_test".to_string()),
        api_base_url: base_url.to_string(),
        currency: "inr".to_string(),
        webhook_tolerance_secs: 300,
    }
}

fn payment_request() -> CheckoutSessionRequest {
    CheckoutSessionRequest {
        mode: SessionMode::Payment {
            currency: "inr".into(),
            line_items: vec![LineItem {
                name: "Deep clean".into(),
                unit_amount: 50_000,
                quantity: 1,
            }],
        },
        success_url: "https://app.test/ok".into(),
        cancel_url: "https://app.test/cancel".into(),
        customer_email: None,
        metadata: BTreeMap::from([("paymentId".to_string(), "p-1".to_string())]),
    }
}

#[tokio::test]
async fn creates_session_with_form_body_and_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("unit_amount%5D=50000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_live_1",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_live_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = StripeClient::new(config(&server.uri(), "sk_test_123"));
    let session = client
        .create_checkout_session(&payment_request())
        .await
        .unwrap();

    assert_eq!(session.id, "cs_live_1");
    assert_eq!(
        session.url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_live_1")
    );
}

#[tokio::test]
async fn api_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "type": "invalid_request_error", "message": "Invalid currency: xyz" }
        })))
        .mount(&server)
        .await;

    let client = StripeClient::new(config(&server.uri(), "sk_test_123"));
    let err = client
        .create_checkout_session(&payment_request())
        .await
        .unwrap_err();

    match err {
        GatewayError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid currency: xyz");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn retrieves_subscription_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/sub_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sub_1",
            "object": "subscription",
            "customer": "cus_1",
            "status": "active",
            "created": 1_700_000_000,
            "items": { "data": [{
                "price": { "id": "price_pro", "recurring": { "interval": "month" } },
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }]}
        })))
        .mount(&server)
        .await;

    let client = StripeClient::new(config(&server.uri(), "sk_test_123"));
    let subscription = client.retrieve_subscription("sub_1").await.unwrap();

    assert_eq!(subscription.status, "active");
    assert_eq!(subscription.price_id(), Some("price_pro"));
    assert_eq!(subscription.period_start(), Some(1_700_000_000));
    assert_eq!(subscription.period_end(), Some(1_702_592_000));
}

#[tokio::test]
async fn missing_secret_key_never_calls_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = StripeClient::new(config(&server.uri(), ""));
    assert!(!client.is_configured());
    let err = client
        .create_checkout_session(&payment_request())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotConfigured));
}

#[tokio::test]
async fn unreachable_processor_is_a_connection_error() {
    // Discard port; nothing listens there.
    let client = StripeClient::new(config("http://127.0.0.1:9", "sk_test_123"));
    let err = client.retrieve_subscription("sub_1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Connection(_)));
}

//! Metrics module for booking-service.
//! Prometheus metrics for reservations, checkout, webhooks and notifications.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "booking_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Booking attempts by source (direct, checkout) and outcome
pub static BOOKINGS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Checkout sessions by mode (payment, subscription) and outcome
pub static CHECKOUT_SESSIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Webhook events by event type and outcome
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Push deliveries by outcome
pub static NOTIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    BOOKINGS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "booking_bookings_total",
                "Booking attempts by source and outcome"
            ),
            &["source", "outcome"]
        )
        .expect("Failed to register BOOKINGS_TOTAL")
    });

    CHECKOUT_SESSIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "booking_checkout_sessions_total",
                "Checkout sessions by mode and outcome"
            ),
            &["mode", "outcome"]
        )
        .expect("Failed to register CHECKOUT_SESSIONS_TOTAL")
    });

    WEBHOOK_EVENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "booking_webhook_events_total",
                "Payment processor webhook events by type and outcome"
            ),
            &["event", "outcome"]
        )
        .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
    });

    NOTIFICATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "booking_notifications_total",
                "Push notification deliveries by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register NOTIFICATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("booking_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a booking attempt.
pub fn record_booking(source: &str, outcome: &str) {
    if let Some(counter) = BOOKINGS_TOTAL.get() {
        counter.with_label_values(&[source, outcome]).inc();
    }
}

/// Record a checkout session attempt.
pub fn record_checkout_session(mode: &str, outcome: &str) {
    if let Some(counter) = CHECKOUT_SESSIONS_TOTAL.get() {
        counter.with_label_values(&[mode, outcome]).inc();
    }
}

/// Record a processed webhook event.
pub fn record_webhook_event(event: &str, outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event, outcome]).inc();
    }
}

/// Record push deliveries.
pub fn record_notifications(outcome: &str, count: u64) {
    if let Some(counter) = NOTIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc_by(count);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}

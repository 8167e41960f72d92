//! Direct booking path: slot exclusivity, cancellation and slot management.

mod common;

use axum::http::{Method, StatusCode};
use booking_service::models::UserRole;
use booking_service::services::BookingStore;
use common::{future_date, TestApp};
use serde_json::json;

#[tokio::test]
async fn concurrent_reservations_admit_exactly_one() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Sparkle Cleaning").await;
    let service = app.seed_service(provider.business_id, "Deep clean", 500).await;
    let date = future_date(7);
    let slot = app.seed_slot(provider.business_id, service, date, 10).await;

    let mut customers = Vec::new();
    for _ in 0..10 {
        customers.push(app.seed_user(UserRole::Customer).await);
    }

    let mut handles = Vec::new();
    for customer in customers {
        let app_ref = app.clone();
        handles.push(tokio::spawn(async move {
            app_ref
                .post(
                    "/bookings",
                    customer,
                    json!({ "service_id": service, "slot_id": slot }),
                )
                .await
                .0
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 9);

    let bookings = app
        .store
        .list_bookings_by_business(provider.business_id)
        .await
        .unwrap();
    assert_eq!(bookings.len(), 1);
    let stored_slot = app.store.get_slot(slot).await.unwrap().unwrap();
    assert!(stored_slot.is_booked);
    assert_eq!(stored_slot.booked_by, Some(bookings[0].user_id));
}

#[tokio::test]
async fn cancelling_frees_the_slot_for_the_next_customer() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Fixit").await;
    let service = app.seed_service(provider.business_id, "Plumbing", 300).await;
    let slot = app
        .seed_slot(provider.business_id, service, future_date(3), 9)
        .await;
    let first = app.seed_user(UserRole::Customer).await;
    let second = app.seed_user(UserRole::Customer).await;

    let (status, booking) = app
        .post(
            "/bookings",
            first,
            json!({ "service_id": service, "slot_id": slot }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["booking_status"], "PENDING");
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(
            "/bookings",
            second,
            json!({ "service_id": service, "slot_id": slot }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let cancel_uri = format!("/bookings/{}/cancel", booking_id);
    let (status, cancelled) = app
        .request(Method::PATCH, &cancel_uri, Some(first), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["booking_status"], "CANCELLED");

    let (status, _) = app
        .request(Method::PATCH, &cancel_uri, Some(first), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, rebooked) = app
        .post(
            "/bookings",
            second,
            json!({ "service_id": service, "slot_id": slot }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rebooked["user_id"], second.to_string());

    // The provider hears about the cancellation.
    let notes = app.wait_for_notifications(provider.user_id, 3).await;
    assert!(notes.iter().any(|n| n["title"] == "Booking Cancelled"));
}

#[tokio::test]
async fn another_customer_cannot_cancel() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Fixit").await;
    let service = app.seed_service(provider.business_id, "Plumbing", 300).await;
    let slot = app
        .seed_slot(provider.business_id, service, future_date(3), 9)
        .await;
    let owner = app.seed_user(UserRole::Customer).await;
    let stranger = app.seed_user(UserRole::Customer).await;

    let (_, booking) = app
        .post(
            "/bookings",
            owner,
            json!({ "service_id": service, "slot_id": slot }),
        )
        .await;
    let uri = format!("/bookings/{}/cancel", booking["id"].as_str().unwrap());

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(stranger), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.get_slot(slot).await.unwrap().unwrap().is_booked);
}

#[tokio::test]
async fn missing_caller_identity_is_unauthorized() {
    let app = TestApp::spawn();
    let (status, body) = app.request(Method::GET, "/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("X-User-ID"));
}

#[tokio::test]
async fn overlapping_interval_is_rejected_but_touching_is_fine() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Green Thumb").await;
    let service = app.seed_service(provider.business_id, "Gardening", 400).await;
    let date = future_date(5);

    let slot = |start: &str, end: &str| {
        json!({
            "service_id": service,
            "kind": "interval",
            "date": date,
            "start_time": start,
            "end_time": end,
        })
    };

    let (status, _) = app
        .post("/provider/slots", provider.user_id, slot("10:00:00", "11:00:00"))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .post("/provider/slots", provider.user_id, slot("10:30:00", "11:30:00"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/provider/slots", provider.user_id, slot("11:00:00", "12:00:00"))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .post("/provider/slots", provider.user_id, slot("13:00:00", "12:00:00"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, slots) = app
        .get(
            &format!("/provider/services/{}/slots", service),
            provider.user_id,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slots.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn generated_batch_is_all_or_nothing() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Green Thumb").await;
    let service = app.seed_service(provider.business_id, "Gardening", 400).await;
    let date = future_date(5);

    // 09:00-10:00, 10:15-11:15, 11:30-12:30
    let (status, slots) = app
        .post(
            "/provider/slots/generate",
            provider.user_id,
            json!({
                "service_id": service,
                "date": date,
                "day_start": "09:00:00",
                "day_end": "12:30:00",
                "slot_minutes": 60,
                "break_minutes": 15,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(slots.as_array().unwrap().len(), 3);

    // Second run overlaps the first one entirely.
    let (status, _) = app
        .post(
            "/provider/slots/generate",
            provider.user_id,
            json!({
                "service_id": service,
                "date": date,
                "day_start": "08:00:00",
                "day_end": "12:00:00",
                "slot_minutes": 60,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stored = app
        .get(
            &format!("/provider/services/{}/slots", service),
            provider.user_id,
        )
        .await
        .1;
    assert_eq!(stored.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn provider_rejects_booking_and_slot_reopens() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Sparkle").await;
    let service = app.seed_service(provider.business_id, "Windows", 250).await;
    let slot = app
        .seed_slot(provider.business_id, service, future_date(2), 14)
        .await;
    let customer = app.seed_user(UserRole::Customer).await;

    let (_, booking) = app
        .post(
            "/bookings",
            customer,
            json!({ "service_id": service, "slot_id": slot }),
        )
        .await;
    let uri = format!("/provider/bookings/{}", booking["id"].as_str().unwrap());

    let (status, updated) = app
        .request(
            Method::PATCH,
            &uri,
            Some(provider.user_id),
            Some(json!({ "status": "REJECTED", "reason": "Fully booked that day" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["booking_status"], "REJECTED");
    assert_eq!(updated["status_reason"], "Fully booked that day");

    let (_, free) = app
        .request(
            Method::GET,
            &format!("/services/{}/slots", service),
            None,
            None,
        )
        .await;
    assert_eq!(free.as_array().unwrap().len(), 1);

    // Terminal: no way back.
    let (status, _) = app
        .request(
            Method::PATCH,
            &uri,
            Some(provider.user_id),
            Some(json!({ "status": "CONFIRMED" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let notes = app.wait_for_notifications(customer, 1).await;
    assert_eq!(notes[0]["receiver_id"], customer.to_string());
}

#[tokio::test]
async fn slot_held_by_a_booking_cannot_be_deleted() {
    let app = TestApp::spawn();
    let provider = app.seed_provider("Sparkle").await;
    let service = app.seed_service(provider.business_id, "Windows", 250).await;
    let slot = app
        .seed_slot(provider.business_id, service, future_date(2), 14)
        .await;
    let customer = app.seed_user(UserRole::Customer).await;

    app.post(
        "/bookings",
        customer,
        json!({ "service_id": service, "slot_id": slot }),
    )
    .await;

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/provider/slots/{}", slot),
            Some(provider.user_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(app.store.get_slot(slot).await.unwrap().is_some());
}

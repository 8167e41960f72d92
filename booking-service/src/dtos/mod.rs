//! Request and response bodies for the HTTP surface.

use crate::models::{BookingStatus, BookingStatusPatch, NewPlan, SlotWindow};
use crate::services::{Reservation, SlotSchedule};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

// =============================================================================
// Bookings
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub slot_id: Uuid,
    pub booking_date: Option<NaiveDate>,
    pub address_id: Option<Uuid>,
}

impl From<CreateBookingRequest> for Reservation {
    fn from(req: CreateBookingRequest) -> Self {
        Reservation {
            service_id: req.service_id,
            slot_id: req.slot_id,
            booking_date: req.booking_date,
            address_id: req.address_id,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

impl From<UpdateBookingStatusRequest> for BookingStatusPatch {
    fn from(req: UpdateBookingStatusRequest) -> Self {
        BookingStatusPatch {
            status: req.status,
            reason: req
                .reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        }
    }
}

// =============================================================================
// Cart and checkout
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub service_id: Uuid,
    pub slot_id: Uuid,
    pub booking_date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCheckoutRequest {
    #[validate(length(min = 1, max = 12, message = "Select between 1 and 12 cart items"))]
    pub cart_item_ids: Vec<Uuid>,
    pub address_id: Uuid,
}

// =============================================================================
// Provider slots
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSlotRequest {
    pub service_id: Option<Uuid>,
    #[serde(flatten)]
    pub window: SlotWindow,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateSlotsRequest {
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    #[validate(range(min = 5, max = 720, message = "Slot length must be 5 to 720 minutes"))]
    pub slot_minutes: u32,
    #[serde(default)]
    #[validate(range(max = 240, message = "Break must be at most 240 minutes"))]
    pub break_minutes: u32,
}

impl From<GenerateSlotsRequest> for SlotSchedule {
    fn from(req: GenerateSlotsRequest) -> Self {
        SlotSchedule {
            service_id: req.service_id,
            date: req.date,
            day_start: req.day_start,
            day_end: req.day_end,
            slot_minutes: req.slot_minutes,
            break_minutes: req.break_minutes,
        }
    }
}

// =============================================================================
// Subscriptions and notifications
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct SubscriptionCheckoutRequest {
    #[validate(custom(function = "not_blank", message = "price_id is required"))]
    pub price_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeedPlansRequest {
    #[validate(length(min = 1, message = "At least one plan is required"))]
    pub plans: Vec<NewPlan>,
}

#[derive(Debug, Serialize)]
pub struct SeedPlansResponse {
    pub inserted: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDeviceTokenRequest {
    #[validate(
        length(max = 4096, message = "Token is too long"),
        custom(function = "not_blank", message = "Token is required")
    )]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

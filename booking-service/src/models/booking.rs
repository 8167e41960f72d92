//! Booking model and its status machine.

use super::UnknownVariant;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    #[serde(rename = "ONHOLD")]
    OnHold,
    Completed,
    Cancelled,
    Rejected,
    Failed,
    Refunded,
    Closed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 10] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::OnHold,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
        BookingStatus::Failed,
        BookingStatus::Refunded,
        BookingStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::InProgress => "INPROGRESS",
            BookingStatus::OnHold => "ONHOLD",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Rejected => "REJECTED",
            BookingStatus::Failed => "FAILED",
            BookingStatus::Refunded => "REFUNDED",
            BookingStatus::Closed => "CLOSED",
        }
    }

    /// Statuses that give the slot back.
    pub fn releases_slot(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Rejected | BookingStatus::Failed
        )
    }

    /// A live booking holds its slot.
    pub fn is_live(&self) -> bool {
        !self.releases_slot()
    }

    /// Provider-side transitions.
    pub fn allowed_next(&self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[Confirmed, OnHold, Rejected, Cancelled, Failed],
            Confirmed => &[InProgress, OnHold, Completed, Cancelled, Failed, Refunded],
            OnHold => &[Confirmed, InProgress, Cancelled, Failed],
            InProgress => &[OnHold, Completed, Failed],
            Completed => &[Closed, Refunded],
            Refunded => &[Closed],
            Cancelled | Rejected | Failed | Closed => &[],
        }
    }

    pub fn transition_to(&self, next: BookingStatus) -> Result<(), TransitionError> {
        if *self == next {
            return Err(TransitionError::Unchanged(next));
        }
        if self.allowed_next().contains(&next) {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                from: *self,
                to: next,
            })
        }
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("booking status", s))
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PAID" => Ok(PaymentStatus::Paid),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No new changes: booking is already {0}")]
    Unchanged(BookingStatus),

    #[error("Cannot move booking from {from} to {to}")]
    NotAllowed {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    #[error("Booking in status {0} can no longer be cancelled")]
    NotCancellable(BookingStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_id: Uuid,
    pub service_id: Uuid,
    pub slot_id: Uuid,
    pub address_id: Option<Uuid>,
    pub payment_intent_id: Option<Uuid>,
    pub total_amount: Decimal,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    #[sqlx(try_from = "String")]
    pub booking_status: BookingStatus,
    pub status_reason: Option<String>,
    pub booking_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Booking {
    /// Customers may cancel a pending booking, or a confirmed one before
    /// the day of service.
    pub fn check_customer_cancel(&self, today: NaiveDate) -> Result<(), TransitionError> {
        match self.booking_status {
            BookingStatus::Cancelled => Err(TransitionError::AlreadyCancelled),
            BookingStatus::Pending => Ok(()),
            BookingStatus::Confirmed if self.booking_date > today => Ok(()),
            other => Err(TransitionError::NotCancellable(other)),
        }
    }

    /// Payment status after a provider moves the booking to `next`.
    pub fn payment_status_after(&self, next: BookingStatus) -> PaymentStatus {
        if next == BookingStatus::Refunded && self.payment_status == PaymentStatus::Paid {
            PaymentStatus::Refunded
        } else {
            self.payment_status
        }
    }
}

/// Input for creating a booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub business_id: Uuid,
    pub service_id: Uuid,
    pub slot_id: Uuid,
    pub address_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub booking_date: NaiveDate,
}

/// Resolved provider-side status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingStatusPatch {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn booking(status: BookingStatus, date: NaiveDate) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            address_id: None,
            payment_intent_id: None,
            total_amount: Decimal::from(500),
            payment_status: PaymentStatus::Paid,
            booking_status: status,
            status_reason: None,
            booking_date: date,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("BOOKED".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn serde_matches_column_values() {
        let json = serde_json::to_string(&BookingStatus::InProgress).unwrap();
        assert_eq!(json, "\"INPROGRESS\"");
        let json = serde_json::to_string(&BookingStatus::OnHold).unwrap();
        assert_eq!(json, "\"ONHOLD\"");
    }

    #[test]
    fn only_terminal_failures_release_the_slot() {
        let releasing: Vec<_> = BookingStatus::ALL
            .into_iter()
            .filter(|s| s.releases_slot())
            .collect();
        assert_eq!(
            releasing,
            vec![
                BookingStatus::Cancelled,
                BookingStatus::Rejected,
                BookingStatus::Failed
            ]
        );
    }

    #[test]
    fn same_status_is_unchanged() {
        assert_eq!(
            BookingStatus::Confirmed.transition_to(BookingStatus::Confirmed),
            Err(TransitionError::Unchanged(BookingStatus::Confirmed))
        );
    }

    #[test]
    fn terminal_statuses_do_not_move() {
        for status in [
            BookingStatus::Cancelled,
            BookingStatus::Rejected,
            BookingStatus::Failed,
            BookingStatus::Closed,
        ] {
            assert!(status.transition_to(BookingStatus::Confirmed).is_err());
        }
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        assert!(matches!(
            BookingStatus::Pending.transition_to(BookingStatus::Completed),
            Err(TransitionError::NotAllowed { .. })
        ));
        assert!(BookingStatus::Pending
            .transition_to(BookingStatus::Confirmed)
            .is_ok());
    }

    #[test]
    fn customer_cancel_rules() {
        let tomorrow = today().succ_opt().unwrap();
        assert!(booking(BookingStatus::Pending, today())
            .check_customer_cancel(today())
            .is_ok());
        assert!(booking(BookingStatus::Confirmed, tomorrow)
            .check_customer_cancel(today())
            .is_ok());
        assert_eq!(
            booking(BookingStatus::Confirmed, today()).check_customer_cancel(today()),
            Err(TransitionError::NotCancellable(BookingStatus::Confirmed))
        );
        assert_eq!(
            booking(BookingStatus::Cancelled, tomorrow).check_customer_cancel(today()),
            Err(TransitionError::AlreadyCancelled)
        );
    }

    #[test]
    fn refund_moves_payment_status() {
        let b = booking(BookingStatus::Completed, today());
        assert_eq!(
            b.payment_status_after(BookingStatus::Refunded),
            PaymentStatus::Refunded
        );
        assert_eq!(
            b.payment_status_after(BookingStatus::Closed),
            PaymentStatus::Paid
        );
    }
}

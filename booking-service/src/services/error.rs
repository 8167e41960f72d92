use crate::models::{SlotWindowError, TransitionError};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot is already booked")]
    SlotAlreadyBooked,

    #[error("Slot {candidate} overlaps existing slot {existing}")]
    SlotOverlap { candidate: String, existing: String },

    #[error("Slot is held by a booking and cannot be deleted")]
    SlotInUse,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Cart item not found")]
    CartItemNotFound,

    #[error("Item is already in the cart")]
    DuplicateCartItem,

    #[error("Only services from the same business can be checked out together")]
    CrossBusinessCart,

    #[error("You have already booked this service for the selected slot and date")]
    AlreadyBooked,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Subscription plan not found")]
    PlanNotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    SlotWindow(#[from] SlotWindowError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment processor error: {0}")]
    Gateway(String),
}

impl BookingError {
    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Database(_) => "database",
            BookingError::Internal(_) => "internal",
            BookingError::SlotNotFound
            | BookingError::BookingNotFound
            | BookingError::ServiceNotFound
            | BookingError::CartItemNotFound
            | BookingError::PaymentNotFound
            | BookingError::PlanNotFound
            | BookingError::ProviderNotFound => "not_found",
            BookingError::SlotAlreadyBooked => "slot_already_booked",
            BookingError::SlotOverlap { .. } => "slot_overlap",
            BookingError::SlotInUse
            | BookingError::DuplicateCartItem
            | BookingError::CrossBusinessCart
            | BookingError::AlreadyBooked => "conflict",
            BookingError::Transition(_) => "transition",
            BookingError::SlotWindow(_) | BookingError::Validation(_) => "validation",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::Gateway(_) => "gateway",
        }
    }

    pub(crate) fn database(context: &str, err: impl std::fmt::Display) -> Self {
        BookingError::Database(anyhow::anyhow!("{}: {}", context, err))
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Database(e) => AppError::DatabaseError(e),
            BookingError::Internal(e) => AppError::InternalError(e),
            BookingError::SlotNotFound
            | BookingError::BookingNotFound
            | BookingError::ServiceNotFound
            | BookingError::CartItemNotFound
            | BookingError::PaymentNotFound
            | BookingError::PlanNotFound
            | BookingError::ProviderNotFound => AppError::NotFound(anyhow::anyhow!(message)),
            BookingError::SlotAlreadyBooked
            | BookingError::SlotOverlap { .. }
            | BookingError::SlotInUse
            | BookingError::DuplicateCartItem
            | BookingError::CrossBusinessCart
            | BookingError::AlreadyBooked => AppError::Conflict(anyhow::anyhow!(message)),
            BookingError::Transition(TransitionError::Unchanged(_)) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            BookingError::Transition(_) => AppError::Conflict(anyhow::anyhow!(message)),
            BookingError::SlotWindow(_) | BookingError::Validation(_) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            BookingError::Forbidden(_) => AppError::Forbidden(anyhow::anyhow!(message)),
            BookingError::Gateway(msg) => AppError::BadGateway(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use axum::http::StatusCode;

    #[test]
    fn domain_errors_map_to_http_status() {
        let cases = [
            (BookingError::SlotAlreadyBooked, StatusCode::CONFLICT),
            (BookingError::CrossBusinessCart, StatusCode::CONFLICT),
            (BookingError::SlotNotFound, StatusCode::NOT_FOUND),
            (
                BookingError::Validation("cart is empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                BookingError::Gateway("timeout".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                BookingError::Transition(TransitionError::Unchanged(BookingStatus::Pending)),
                StatusCode::BAD_REQUEST,
            ),
            (
                BookingError::Transition(TransitionError::AlreadyCancelled),
                StatusCode::CONFLICT,
            ),
            (
                BookingError::Forbidden("providers only".into()),
                StatusCode::FORBIDDEN,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}

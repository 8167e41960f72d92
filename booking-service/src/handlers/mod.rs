//! HTTP handlers for booking-service.

pub mod bookings;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod notifications;
pub mod providers;
pub mod slots;
pub mod subscriptions;
pub mod webhooks;

pub use bookings::*;
pub use cart::*;
pub use checkout::*;
pub use health::*;
pub use notifications::*;
pub use providers::*;
pub use slots::*;
pub use subscriptions::*;
pub use webhooks::*;

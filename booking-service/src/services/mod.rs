pub mod bookings;
pub mod cart;
pub mod checkout;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod push;
pub mod slots;
pub mod store;
pub mod stripe;
pub mod subscriptions;
pub mod webhook;

pub use bookings::{BookingService, Reservation};
pub use cart::CartService;
pub use checkout::{CheckoutRedirect, CheckoutService};
pub use directory::DirectoryService;
pub use error::BookingError;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{Notice, NotificationDispatcher};
pub use push::{DisabledPushProvider, FcmProvider, MockPushProvider, PushProvider};
pub use slots::{SlotSchedule, SlotService};
pub use store::{BookingStore, MemoryStore, PgStore};
pub use stripe::{PaymentGateway, StripeClient};
pub use subscriptions::{SubscriptionOverview, SubscriptionService};
pub use webhook::{Disposition, WebhookEvent, WebhookReconciler};

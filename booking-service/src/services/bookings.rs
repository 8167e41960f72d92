//! Direct reservations and the booking lifecycle.

use crate::models::{Booking, BookingStatusPatch, NewBooking};
use crate::services::directory::{bookable_service, owned_business};
use crate::services::error::BookingError;
use crate::services::metrics::{record_booking, record_error};
use crate::services::notifier::{Notice, NotificationDispatcher};
use crate::services::store::BookingStore;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

/// A customer's request for one slot.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub service_id: Uuid,
    pub slot_id: Uuid,
    /// Required for labeled slots; must match the slot's date for intervals.
    pub booking_date: Option<NaiveDate>,
    pub address_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    notifier: NotificationDispatcher,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, notifier: NotificationDispatcher) -> Self {
        Self { store, notifier }
    }

    /// Claim a free slot for the customer. Concurrent claims on one slot
    /// resolve to a single winner; the rest get `SlotAlreadyBooked`.
    #[instrument(
        skip(self, reservation),
        fields(
            user_id = %user_id,
            slot_id = %reservation.slot_id,
            booking_id
        )
    )]
    pub async fn reserve(
        &self,
        user_id: Uuid,
        reservation: Reservation,
    ) -> Result<Booking, BookingError> {
        let service = bookable_service(self.store.as_ref(), reservation.service_id).await?;
        let slot = self
            .store
            .get_slot(reservation.slot_id)
            .await?
            .filter(|slot| slot.serves(&service))
            .ok_or(BookingError::SlotNotFound)?;
        let booking_date = slot.booking_date(reservation.booking_date)?;

        let result = self
            .store
            .reserve_slot(NewBooking {
                user_id,
                business_id: service.business_id,
                service_id: service.id,
                slot_id: slot.id,
                address_id: reservation.address_id,
                total_amount: service.price,
                booking_date,
            })
            .await;

        let booking = match result {
            Ok(booking) => booking,
            Err(e) => {
                record_booking("direct", e.kind());
                return Err(e);
            }
        };

        Span::current().record("booking_id", booking.id.to_string());
        record_booking("direct", "created");
        info!("Slot reserved");

        self.notify_provider(&booking, &service.name).await;
        Ok(booking)
    }

    /// Customer cancellation; the slot becomes free again.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .cancel_booking(user_id, booking_id, Utc::now().date_naive())
            .await?;
        info!("Booking cancelled by customer");

        match self.store.get_business(booking.business_id).await {
            Ok(Some(business)) => {
                self.notifier
                    .dispatch(Notice::booking_cancelled(business.owner_id, &booking));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not resolve provider for cancellation notice"),
        }
        Ok(booking)
    }

    #[instrument(skip(self))]
    pub async fn list_for_customer(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        self.store.list_bookings_by_user(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_for_provider(
        &self,
        provider_user_id: Uuid,
    ) -> Result<Vec<Booking>, BookingError> {
        let business = owned_business(self.store.as_ref(), provider_user_id).await?;
        self.store.list_bookings_by_business(business.id).await
    }

    /// Provider-side status change. Bookings of other businesses look absent.
    #[instrument(skip(self, patch), fields(status = %patch.status))]
    pub async fn update_status(
        &self,
        provider_user_id: Uuid,
        booking_id: Uuid,
        patch: BookingStatusPatch,
    ) -> Result<Booking, BookingError> {
        let business = owned_business(self.store.as_ref(), provider_user_id).await?;
        let booking = self
            .store
            .update_booking_status(business.id, booking_id, patch)
            .await
            .inspect_err(|e| record_error(e.kind(), "update_booking_status"))?;

        info!(booking_id = %booking.id, "Booking status updated");
        self.notifier
            .dispatch(Notice::booking_status_updated(provider_user_id, &booking));
        Ok(booking)
    }

    async fn notify_provider(&self, booking: &Booking, service_name: &str) {
        let business = match self.store.get_business(booking.business_id).await {
            Ok(Some(business)) => business,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not resolve provider for booking notice");
                return;
            }
        };
        let customer_name = match self.store.get_user(booking.user_id).await {
            Ok(Some(user)) => user.name,
            _ => "a customer".to_string(),
        };

        self.notifier.dispatch(Notice::booking_created(
            business.owner_id,
            booking.user_id,
            &customer_name,
            &[service_name.to_string()],
            std::slice::from_ref(booking),
        ));
    }
}

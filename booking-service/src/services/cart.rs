use crate::models::{CartItem, NewCartItem};
use crate::services::directory::bookable_service;
use crate::services::error::BookingError;
use crate::services::store::BookingStore;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn BookingStore>,
}

impl CartService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Stage a (service, slot, date) selection. The booked-slot check is
    /// advisory; exclusivity is enforced again when the payment completes.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: Uuid,
        service_id: Uuid,
        slot_id: Uuid,
        booking_date: NaiveDate,
    ) -> Result<CartItem, BookingError> {
        let service = bookable_service(self.store.as_ref(), service_id).await?;
        let slot = self
            .store
            .get_slot(slot_id)
            .await?
            .filter(|slot| slot.serves(&service))
            .ok_or(BookingError::SlotNotFound)?;
        let booking_date = slot.booking_date(Some(booking_date))?;

        if slot.is_booked {
            return Err(BookingError::SlotAlreadyBooked);
        }

        let item = self
            .store
            .add_cart_item(NewCartItem {
                user_id,
                service_id,
                business_id: service.business_id,
                slot_id,
                booking_date,
            })
            .await?;
        info!(cart_item_id = %item.id, "Added to cart");
        Ok(item)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<CartItem>, BookingError> {
        self.store.list_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, cart_item_id: Uuid) -> Result<(), BookingError> {
        if self.store.remove_cart_item(user_id, cart_item_id).await? {
            Ok(())
        } else {
            Err(BookingError::CartItemNotFound)
        }
    }
}

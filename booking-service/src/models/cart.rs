//! Cart items staged before checkout.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub business_id: Uuid,
    pub slot_id: Uuid,
    pub booking_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

/// Input for adding a cart item.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub business_id: Uuid,
    pub slot_id: Uuid,
    pub booking_date: NaiveDate,
}

impl NewCartItem {
    /// The (service, slot, date) triple a customer may hold once.
    pub fn selection(&self) -> (Uuid, Uuid, NaiveDate) {
        (self.service_id, self.slot_id, self.booking_date)
    }
}

impl CartItem {
    pub fn selection(&self) -> (Uuid, Uuid, NaiveDate) {
        (self.service_id, self.slot_id, self.booking_date)
    }
}

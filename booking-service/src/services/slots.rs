//! Provider slot management and the customer-facing availability read.

use crate::models::{Slot, SlotWindow};
use crate::services::directory::{bookable_service, owned_business, owned_service};
use crate::services::error::BookingError;
use crate::services::store::BookingStore;
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Parameters for laying out a day of interval slots.
#[derive(Debug, Clone)]
pub struct SlotSchedule {
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub slot_minutes: u32,
    pub break_minutes: u32,
}

#[derive(Clone)]
pub struct SlotService {
    store: Arc<dyn BookingStore>,
}

impl SlotService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Create one slot. Intervals need a service; labels may omit it and then
    /// serve every service of the business.
    #[instrument(skip(self, window), fields(kind = window.kind()))]
    pub async fn create_slot(
        &self,
        provider_user_id: Uuid,
        service_id: Option<Uuid>,
        window: SlotWindow,
    ) -> Result<Slot, BookingError> {
        window.validate()?;
        if matches!(window, SlotWindow::Interval { .. }) && service_id.is_none() {
            return Err(BookingError::Validation(
                "serviceId is required for interval slots".into(),
            ));
        }

        let business = owned_business(self.store.as_ref(), provider_user_id).await?;
        if let Some(service_id) = service_id {
            owned_service(self.store.as_ref(), &business, service_id).await?;
        }

        let mut created = self
            .store
            .create_slots(business.id, service_id, vec![window])
            .await?;
        let slot = created
            .pop()
            .ok_or_else(|| BookingError::Internal(anyhow::anyhow!("slot insert returned no row")))?;

        info!(slot_id = %slot.id, business_id = %business.id, "Slot created");
        Ok(slot)
    }

    /// Generate back-to-back intervals for one day; all or nothing.
    #[instrument(skip(self, schedule), fields(service_id = %schedule.service_id, date = %schedule.date))]
    pub async fn generate_slots(
        &self,
        provider_user_id: Uuid,
        schedule: SlotSchedule,
    ) -> Result<Vec<Slot>, BookingError> {
        let windows = SlotWindow::generate(
            schedule.date,
            schedule.day_start,
            schedule.day_end,
            schedule.slot_minutes,
            schedule.break_minutes,
        )?;

        let business = owned_business(self.store.as_ref(), provider_user_id).await?;
        owned_service(self.store.as_ref(), &business, schedule.service_id).await?;

        let created = self
            .store
            .create_slots(business.id, Some(schedule.service_id), windows)
            .await?;
        info!(count = created.len(), "Slots generated");
        Ok(created)
    }

    /// Every slot of one of the caller's services, booked or not.
    #[instrument(skip(self))]
    pub async fn list_slots(
        &self,
        provider_user_id: Uuid,
        service_id: Uuid,
    ) -> Result<Vec<Slot>, BookingError> {
        let business = owned_business(self.store.as_ref(), provider_user_id).await?;
        let service = owned_service(self.store.as_ref(), &business, service_id).await?;
        self.store.list_slots_for_service(&service, false).await
    }

    /// Free slots of an active service.
    #[instrument(skip(self))]
    pub async fn list_available_slots(&self, service_id: Uuid) -> Result<Vec<Slot>, BookingError> {
        let service = bookable_service(self.store.as_ref(), service_id).await?;
        self.store.list_slots_for_service(&service, true).await
    }

    #[instrument(skip(self))]
    pub async fn delete_slot(
        &self,
        provider_user_id: Uuid,
        slot_id: Uuid,
    ) -> Result<(), BookingError> {
        let business = owned_business(self.store.as_ref(), provider_user_id).await?;
        self.store.delete_slot(business.id, slot_id).await?;
        info!(slot_id = %slot_id, "Slot deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BusinessProfile, ServiceOffering, User, UserRole};
    use crate::services::store::MemoryStore;
    use chrono::Utc;
    use rust_decimal::Decimal;

    struct Fixture {
        slots: SlotService,
        provider: Uuid,
        service: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider = Uuid::new_v4();
        let business = Uuid::new_v4();
        let service = Uuid::new_v4();

        store
            .insert_user(User {
                id: provider,
                name: "Ravi".into(),
                email: "ravi@example.com".into(),
                role: UserRole::Provider,
                subscription_status: false,
                subscription_plan_id: None,
                created_utc: Utc::now(),
            })
            .await;
        store
            .insert_business(BusinessProfile {
                id: business,
                owner_id: provider,
                business_name: "Ravi Cleaners".into(),
                is_active: true,
                created_utc: Utc::now(),
            })
            .await;
        store
            .insert_service(ServiceOffering {
                id: service,
                business_id: business,
                name: "Deep cleaning".into(),
                price: Decimal::from(500),
                is_active: true,
                created_utc: Utc::now(),
            })
            .await;

        Fixture {
            slots: SlotService::new(store),
            provider,
            service,
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
    }

    fn interval(start: NaiveTime, end: NaiveTime) -> SlotWindow {
        SlotWindow::Interval {
            date: day(),
            start_time: start,
            end_time: end,
        }
    }

    #[tokio::test]
    async fn overlapping_interval_is_rejected_and_touching_one_accepted() {
        let f = fixture().await;
        f.slots
            .create_slot(f.provider, Some(f.service), interval(at(10, 30), at(11, 30)))
            .await
            .unwrap();

        let err = f
            .slots
            .create_slot(f.provider, Some(f.service), interval(at(10, 0), at(11, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotOverlap { .. }));

        f.slots
            .create_slot(f.provider, Some(f.service), interval(at(11, 30), at(12, 30)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_label_is_rejected() {
        let f = fixture().await;
        let label = |s: &str| SlotWindow::Labeled { label: s.into() };

        f.slots
            .create_slot(f.provider, None, label("10:00 AM"))
            .await
            .unwrap();
        let err = f
            .slots
            .create_slot(f.provider, None, label(" 10:00 am"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotOverlap { .. }));
    }

    #[tokio::test]
    async fn generated_batch_is_atomic() {
        let f = fixture().await;
        f.slots
            .create_slot(f.provider, Some(f.service), interval(at(11, 0), at(11, 30)))
            .await
            .unwrap();

        let schedule = SlotSchedule {
            service_id: f.service,
            date: day(),
            day_start: at(9, 0),
            day_end: at(12, 0),
            slot_minutes: 60,
            break_minutes: 0,
        };
        let err = f
            .slots
            .generate_slots(f.provider, schedule)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotOverlap { .. }));
        assert_eq!(f.slots.list_slots(f.provider, f.service).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn interval_requires_service() {
        let f = fixture().await;
        let err = f
            .slots
            .create_slot(f.provider, None, interval(at(9, 0), at(10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn accounts_without_business_are_forbidden() {
        let f = fixture().await;
        let err = f
            .slots
            .create_slot(Uuid::new_v4(), Some(f.service), interval(at(9, 0), at(10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }
}

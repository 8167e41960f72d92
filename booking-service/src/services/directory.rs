//! Provider discovery and ownership lookups shared by the provider-side flows.

use crate::models::{
    BusinessProfile, ProviderListing, ProviderProfile, ServiceListing, ServiceOffering,
};
use crate::services::error::BookingError;
use crate::services::store::BookingStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// The business the caller operates, or `Forbidden` for accounts without one.
pub(crate) async fn owned_business(
    store: &dyn BookingStore,
    provider_user_id: Uuid,
) -> Result<BusinessProfile, BookingError> {
    store
        .find_business_by_owner(provider_user_id)
        .await?
        .ok_or_else(|| BookingError::Forbidden("No business profile for this account".into()))
}

/// A service of `business`; other businesses' services look absent.
pub(crate) async fn owned_service(
    store: &dyn BookingStore,
    business: &BusinessProfile,
    service_id: Uuid,
) -> Result<ServiceOffering, BookingError> {
    store
        .get_service(service_id)
        .await?
        .filter(|s| s.business_id == business.id)
        .ok_or(BookingError::ServiceNotFound)
}

/// An active service customers can book.
pub(crate) async fn bookable_service(
    store: &dyn BookingStore,
    service_id: Uuid,
) -> Result<ServiceOffering, BookingError> {
    store
        .get_service(service_id)
        .await?
        .filter(|s| s.is_active)
        .ok_or(BookingError::ServiceNotFound)
}

#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn BookingStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Providers with an active business and a paid, unexpired subscription.
    #[instrument(skip(self))]
    pub async fn list_visible_providers(&self) -> Result<Vec<ProviderListing>, BookingError> {
        let providers = self.store.list_visible_providers(Utc::now()).await?;

        let mut listings = Vec::with_capacity(providers.len());
        for profile in providers {
            listings.push(self.listing(profile).await?);
        }
        Ok(listings)
    }

    /// A single provider, hidden unless currently visible.
    #[instrument(skip(self), fields(provider_id = %provider_id))]
    pub async fn get_provider(&self, provider_id: Uuid) -> Result<ProviderListing, BookingError> {
        let profile = self
            .store
            .get_provider_profile(provider_id)
            .await?
            .filter(|p| p.is_visible_at(Utc::now()))
            .ok_or(BookingError::ProviderNotFound)?;

        self.listing(profile).await
    }

    async fn listing(&self, profile: ProviderProfile) -> Result<ProviderListing, BookingError> {
        let services = self
            .store
            .list_services_by_business(profile.business.id)
            .await?;

        let mut listed = Vec::with_capacity(services.len());
        for service in services {
            let available_slots = self.store.list_slots_for_service(&service, true).await?;
            listed.push(ServiceListing {
                service,
                available_slots,
            });
        }

        Ok(ProviderListing {
            provider_id: profile.user.id,
            name: profile.user.name,
            business: profile.business,
            services: listed,
        })
    }
}

//! Users, business profiles and the services they offer.

use super::{ProviderSubscription, Slot, UnknownVariant};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Provider,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Provider => "provider",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(UserRole::Customer),
            "provider" => Ok(UserRole::Provider),
            "admin" => Ok(UserRole::Admin),
            other => Err(UnknownVariant::new("user role", other)),
        }
    }
}

impl TryFrom<String> for UserRole {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    /// Mirrors whether the provider's subscription is currently active.
    pub subscription_status: bool,
    pub subscription_plan_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BusinessProfile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub business_name: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceOffering {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// A provider as the directory sees it: account, business and subscription.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderProfile {
    pub user: User,
    pub business: BusinessProfile,
    pub subscription: Option<ProviderSubscription>,
}

impl ProviderProfile {
    /// Whether customers may discover this provider at `now`.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.user.role == UserRole::Provider
            && self.business.is_active
            && self
                .subscription
                .as_ref()
                .map(|s| s.is_current_at(now))
                .unwrap_or(false)
    }
}

/// A service with the slots customers can still book.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceListing {
    #[serde(flatten)]
    pub service: ServiceOffering,
    pub available_slots: Vec<Slot>,
}

/// Public view of a discoverable provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderListing {
    pub provider_id: Uuid,
    pub name: String,
    pub business: BusinessProfile,
    pub services: Vec<ServiceListing>,
}

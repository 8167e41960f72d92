//! Provider subscription plans and the per-provider subscription ledger.

use super::UnknownVariant;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Processor status that makes a provider discoverable.
pub const ACTIVE_STATUS: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanInterval {
    Month,
    Year,
}

impl PlanInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanInterval::Month => "month",
            PlanInterval::Year => "year",
        }
    }

    /// Fallback period length when the processor omits period bounds.
    pub fn fallback_period(&self) -> TimeDelta {
        match self {
            PlanInterval::Month => TimeDelta::days(30),
            PlanInterval::Year => TimeDelta::days(365),
        }
    }
}

impl FromStr for PlanInterval {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(PlanInterval::Month),
            "year" => Ok(PlanInterval::Year),
            other => Err(UnknownVariant::new("plan interval", other)),
        }
    }
}

impl TryFrom<String> for PlanInterval {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub billing_interval: PlanInterval,
    pub stripe_price_id: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for seeding a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub billing_interval: PlanInterval,
    pub stripe_price_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ProviderSubscription {
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }

    /// Active and not yet past its paid period.
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.current_period_end > now
    }
}

/// Create-or-refresh a provider's subscription from a completed checkout.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

/// Status change reported by the processor for an existing subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionSync {
    pub stripe_subscription_id: String,
    pub status: String,
    /// Only moved when the event carries a valid period end.
    pub current_period_end: Option<DateTime<Utc>>,
}

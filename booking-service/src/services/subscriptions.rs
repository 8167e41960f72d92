use crate::models::{NewPlan, ProviderSubscription, SubscriptionPlan, UserRole};
use crate::services::error::BookingError;
use crate::services::store::BookingStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A provider's view of their own subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Option<ProviderSubscription>,
    pub plan: Option<SubscriptionPlan>,
    /// Whether customers can currently discover the provider.
    pub is_visible: bool,
}

#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn BookingStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Insert plans whose price id is not known yet. Admin accounts only.
    #[instrument(skip(self, plans), fields(count = plans.len()))]
    pub async fn seed_plans(
        &self,
        actor_id: Uuid,
        plans: Vec<NewPlan>,
    ) -> Result<u64, BookingError> {
        self.store
            .get_user(actor_id)
            .await?
            .filter(|u| u.role == UserRole::Admin)
            .ok_or_else(|| BookingError::Forbidden("Only admins can seed plans".into()))?;

        if let Some(plan) = plans.iter().find(|p| p.stripe_price_id.trim().is_empty()) {
            return Err(BookingError::Validation(format!(
                "Plan {} has no processor price id",
                plan.name
            )));
        }
        let inserted = self.store.seed_plans(plans).await?;
        info!(inserted, "Subscription plans seeded");
        Ok(inserted)
    }

    pub async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>, BookingError> {
        self.store.list_active_plans().await
    }

    #[instrument(skip(self))]
    pub async fn overview(&self, user_id: Uuid) -> Result<SubscriptionOverview, BookingError> {
        let subscription = self.store.get_subscription_by_user(user_id).await?;

        let plan = match &subscription {
            Some(sub) => self
                .store
                .list_active_plans()
                .await?
                .into_iter()
                .find(|p| p.id == sub.plan_id),
            None => None,
        };

        let is_visible = self
            .store
            .get_provider_profile(user_id)
            .await?
            .map(|profile| profile.is_visible_at(Utc::now()))
            .unwrap_or(false);

        Ok(SubscriptionOverview {
            subscription,
            plan,
            is_visible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanInterval, User};
    use crate::services::store::MemoryStore;
    use rust_decimal::Decimal;

    async fn with_user(role: UserRole) -> (SubscriptionService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let id = Uuid::new_v4();
        store
            .insert_user(User {
                id,
                name: "Ops".into(),
                email: "ops@example.com".into(),
                role,
                subscription_status: false,
                subscription_plan_id: None,
                created_utc: Utc::now(),
            })
            .await;
        (SubscriptionService::new(store), id)
    }

    fn plan(name: &str, price: i64, price_id: &str) -> NewPlan {
        NewPlan {
            name: name.into(),
            price: Decimal::from(price),
            currency: "inr".into(),
            billing_interval: PlanInterval::Month,
            stripe_price_id: price_id.into(),
        }
    }

    #[tokio::test]
    async fn seeding_skips_known_prices() {
        let (service, admin) = with_user(UserRole::Admin).await;

        let first = service
            .seed_plans(
                admin,
                vec![plan("Basic", 499, "price_basic"), plan("Pro", 999, "price_pro")],
            )
            .await
            .unwrap();
        let second = service
            .seed_plans(admin, vec![plan("Basic", 499, "price_basic")])
            .await
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 0);
        let names: Vec<_> = service
            .list_plans()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Basic", "Pro"]);
    }

    #[tokio::test]
    async fn blank_price_id_is_rejected() {
        let (service, admin) = with_user(UserRole::Admin).await;
        let err = service
            .seed_plans(admin, vec![plan("Basic", 499, " ")])
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn providers_cannot_seed_plans() {
        let (service, provider) = with_user(UserRole::Provider).await;
        let err = service
            .seed_plans(provider, vec![plan("Basic", 499, "price_basic")])
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
        assert!(service.list_plans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_has_no_subscription() {
        let service = SubscriptionService::new(Arc::new(MemoryStore::new()));
        let overview = service.overview(Uuid::new_v4()).await.unwrap();
        assert!(overview.subscription.is_none());
        assert!(!overview.is_visible);
    }
}

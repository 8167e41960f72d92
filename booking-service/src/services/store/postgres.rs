//! PostgreSQL store for booking-service.

use super::BookingStore;
use crate::models::{
    Booking, BookingStatus, BookingStatusPatch, BusinessProfile, CartItem, CheckoutCompletion,
    CompletionOutcome, DeviceToken, IntentUpdate, NewBooking, NewCartItem, NewNotification,
    NewPaymentIntent, NewPlan, Notification, PaymentIntent, PaymentIntentStatus, PaymentStatus,
    ProviderProfile, ProviderSubscription, ServiceOffering, Slot, SlotWindow, SubscriptionPlan,
    SubscriptionSync, SubscriptionUpsert, TransitionError, User, UserRole, ACTIVE_STATUS,
};
use crate::services::error::BookingError;
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, name, email, role, subscription_status, subscription_plan_id, created_utc";
const BUSINESS_COLUMNS: &str = "id, owner_id, business_name, is_active, created_utc";
const SERVICE_COLUMNS: &str = "id, business_id, name, price, is_active, created_utc";
const SLOT_COLUMNS: &str = "id, business_id, service_id, kind, slot_date, start_time, end_time, label, is_booked, booked_by, created_utc";
const CART_COLUMNS: &str = "id, user_id, service_id, business_id, slot_id, booking_date, created_utc";
const BOOKING_COLUMNS: &str = "id, user_id, business_id, service_id, slot_id, address_id, payment_intent_id, total_amount, payment_status, booking_status, status_reason, booking_date, created_utc, updated_utc";
const INTENT_COLUMNS: &str = "id, user_id, address_id, amount, currency, status, stripe_session_id, stripe_payment_intent_id, cart_item_ids, booking_ids, created_utc, updated_utc";
const PLAN_COLUMNS: &str =
    "id, name, price, currency, billing_interval, stripe_price_id, is_active, created_utc";
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, stripe_customer_id, stripe_subscription_id, status, current_period_start, current_period_end, created_utc, updated_utc";
const NOTIFICATION_COLUMNS: &str =
    "id, receiver_id, sender_id, title, message, data, is_read, created_utc";

/// Flat row shape of the `slots` table.
#[derive(FromRow)]
struct SlotRow {
    id: Uuid,
    business_id: Uuid,
    service_id: Option<Uuid>,
    kind: String,
    slot_date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    label: Option<String>,
    is_booked: bool,
    booked_by: Option<Uuid>,
    created_utc: DateTime<Utc>,
}

impl TryFrom<SlotRow> for Slot {
    type Error = BookingError;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        let window = match (
            row.kind.as_str(),
            row.slot_date,
            row.start_time,
            row.end_time,
            row.label,
        ) {
            ("interval", Some(date), Some(start_time), Some(end_time), _) => SlotWindow::Interval {
                date,
                start_time,
                end_time,
            },
            ("labeled", _, _, _, Some(label)) => SlotWindow::Labeled { label },
            (kind, ..) => {
                return Err(BookingError::Internal(anyhow::anyhow!(
                    "Malformed slot row {} of kind {}",
                    row.id,
                    kind
                )))
            }
        };

        Ok(Slot {
            id: row.id,
            business_id: row.business_id,
            service_id: row.service_id,
            window,
            is_booked: row.is_booked,
            booked_by: row.booked_by,
            created_utc: row.created_utc,
        })
    }
}

#[derive(FromRow)]
struct PricedCartRow {
    #[sqlx(flatten)]
    item: CartItem,
    price: Decimal,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "booking-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, BookingError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| BookingError::database("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), BookingError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BookingError::database("Migration failed", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, BookingError> {
        self.pool
            .begin()
            .await
            .map_err(|e| BookingError::database("Failed to begin transaction", e))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), BookingError> {
        tx.commit()
            .await
            .map_err(|e| BookingError::database("Failed to commit transaction", e))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, BookingError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to load users", e))
    }

    /// Free a slot inside `tx`.
    async fn release_slot(
        tx: &mut Transaction<'static, Postgres>,
        slot_id: Uuid,
    ) -> Result<(), BookingError> {
        sqlx::query("UPDATE slots SET is_booked = FALSE, booked_by = NULL WHERE id = $1")
            .bind(slot_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| BookingError::database("Failed to release slot", e))?;
        Ok(())
    }

    /// Claim a free slot for `service` inside `tx`. Returns false when the
    /// slot is taken or does not serve the service.
    async fn claim_slot(
        tx: &mut Transaction<'static, Postgres>,
        slot_id: Uuid,
        service_id: Uuid,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, BookingError> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET is_booked = TRUE, booked_by = $4
            WHERE id = $1
              AND is_booked = FALSE
              AND (service_id = $2 OR (service_id IS NULL AND business_id = $3))
            "#,
        )
        .bind(slot_id)
        .bind(service_id)
        .bind(business_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| BookingError::database("Failed to claim slot", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn sync_user_flag(
        tx: &mut Transaction<'static, Postgres>,
        subscription: &ProviderSubscription,
    ) -> Result<(), BookingError> {
        sqlx::query(
            "UPDATE users SET subscription_status = $2, subscription_plan_id = $3 WHERE id = $1",
        )
        .bind(subscription.user_id)
        .bind(subscription.status == ACTIVE_STATUS)
        .bind(subscription.plan_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| BookingError::database("Failed to sync subscription flag", e))?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| BookingError::database("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Directory
    // =========================================================================

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get user", e))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_business_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<BusinessProfile>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_business_by_owner"])
            .start_timer();

        let business = sqlx::query_as::<_, BusinessProfile>(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM business_profiles WHERE owner_id = $1"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get business", e))?;

        timer.observe_duration();
        Ok(business)
    }

    #[instrument(skip(self))]
    async fn get_business(
        &self,
        business_id: Uuid,
    ) -> Result<Option<BusinessProfile>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_business"])
            .start_timer();

        let business = sqlx::query_as::<_, BusinessProfile>(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM business_profiles WHERE id = $1"
        ))
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get business", e))?;

        timer.observe_duration();
        Ok(business)
    }

    #[instrument(skip(self))]
    async fn get_service(&self, service_id: Uuid) -> Result<Option<ServiceOffering>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_service"])
            .start_timer();

        let service = sqlx::query_as::<_, ServiceOffering>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
        ))
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get service", e))?;

        timer.observe_duration();
        Ok(service)
    }

    #[instrument(skip(self))]
    async fn list_services_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<ServiceOffering>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_services_by_business"])
            .start_timer();

        let services = sqlx::query_as::<_, ServiceOffering>(&format!(
            r#"
            SELECT {SERVICE_COLUMNS} FROM services
            WHERE business_id = $1 AND is_active = TRUE
            ORDER BY created_utc, id
            "#
        ))
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list services", e))?;

        timer.observe_duration();
        Ok(services)
    }

    #[instrument(skip(self))]
    async fn list_visible_providers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProviderProfile>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_visible_providers"])
            .start_timer();

        let businesses = sqlx::query_as::<_, BusinessProfile>(
            r#"
            SELECT b.id, b.owner_id, b.business_name, b.is_active, b.created_utc
            FROM business_profiles b
            JOIN users u ON u.id = b.owner_id
            JOIN provider_subscriptions s ON s.user_id = u.id
            WHERE u.role = 'provider'
              AND b.is_active = TRUE
              AND s.status = $1
              AND s.current_period_end > $2
            "#,
        )
        .bind(ACTIVE_STATUS)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list providers", e))?;

        let owner_ids: Vec<Uuid> = businesses.iter().map(|b| b.owner_id).collect();
        let mut users: HashMap<Uuid, User> = self
            .users_by_ids(&owner_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let mut subscriptions: HashMap<Uuid, ProviderSubscription> =
            sqlx::query_as::<_, ProviderSubscription>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM provider_subscriptions WHERE user_id = ANY($1)"
            ))
            .bind(&owner_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("Failed to load subscriptions", e))?
            .into_iter()
            .map(|s| (s.user_id, s))
            .collect();

        let mut providers: Vec<ProviderProfile> = businesses
            .into_iter()
            .filter_map(|business| {
                let user = users.remove(&business.owner_id)?;
                Some(ProviderProfile {
                    subscription: subscriptions.remove(&user.id),
                    user,
                    business,
                })
            })
            .filter(|p| p.is_visible_at(now))
            .collect();
        providers.sort_by(|a, b| a.user.name.cmp(&b.user.name));

        timer.observe_duration();
        Ok(providers)
    }

    #[instrument(skip(self))]
    async fn get_provider_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProviderProfile>, BookingError> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(None);
        };
        if user.role != UserRole::Provider {
            return Ok(None);
        }
        let Some(business) = self.find_business_by_owner(user_id).await? else {
            return Ok(None);
        };
        let subscription = self.get_subscription_by_user(user_id).await?;

        Ok(Some(ProviderProfile {
            user,
            business,
            subscription,
        }))
    }

    // =========================================================================
    // Slots
    // =========================================================================

    #[instrument(skip(self, windows), fields(count = windows.len()))]
    async fn create_slots(
        &self,
        business_id: Uuid,
        service_id: Option<Uuid>,
        windows: Vec<SlotWindow>,
    ) -> Result<Vec<Slot>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_slots"])
            .start_timer();

        let mut tx = self.begin().await?;

        // Serializes slot layout changes per business.
        sqlx::query("SELECT id FROM business_profiles WHERE id = $1 FOR UPDATE")
            .bind(business_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| BookingError::database("Failed to lock business", e))?;

        let existing: Vec<SlotWindow> = sqlx::query_as::<_, SlotRow>(&format!(
            r#"
            SELECT {SLOT_COLUMNS} FROM slots
            WHERE business_id = $1
              AND (kind = 'labeled' OR service_id IS NOT DISTINCT FROM $2)
            "#
        ))
        .bind(business_id)
        .bind(service_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to load slots", e))?
        .into_iter()
        .map(|row| Slot::try_from(row).map(|s| s.window))
        .collect::<Result<_, _>>()?;

        if let Some((candidate, hit)) = SlotWindow::first_conflict(&windows, &existing) {
            return Err(BookingError::SlotOverlap {
                candidate: candidate.to_string(),
                existing: hit.to_string(),
            });
        }

        let mut created = Vec::with_capacity(windows.len());
        for window in windows {
            let (date, start, end, label) = match &window {
                SlotWindow::Interval {
                    date,
                    start_time,
                    end_time,
                } => (Some(*date), Some(*start_time), Some(*end_time), None),
                SlotWindow::Labeled { label } => (None, None, None, Some(label.trim().to_string())),
            };

            let row = sqlx::query_as::<_, SlotRow>(&format!(
                r#"
                INSERT INTO slots (id, business_id, service_id, kind, slot_date, start_time, end_time, label)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {SLOT_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(business_id)
            .bind(service_id)
            .bind(window.kind())
            .bind(date)
            .bind(start)
            .bind(end)
            .bind(label)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BookingError::SlotOverlap {
                        candidate: window.to_string(),
                        existing: window.to_string(),
                    }
                } else {
                    BookingError::database("Failed to create slot", e)
                }
            })?;
            created.push(Slot::try_from(row)?);
        }

        Self::commit(tx).await?;

        timer.observe_duration();
        info!(business_id = %business_id, count = created.len(), "Slots created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_slot"])
            .start_timer();

        let row = sqlx::query_as::<_, SlotRow>(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1"
        ))
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get slot", e))?;

        timer.observe_duration();
        row.map(Slot::try_from).transpose()
    }

    #[instrument(skip(self, service), fields(service_id = %service.id))]
    async fn list_slots_for_service(
        &self,
        service: &ServiceOffering,
        only_free: bool,
    ) -> Result<Vec<Slot>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_slots_for_service"])
            .start_timer();

        let rows = sqlx::query_as::<_, SlotRow>(&format!(
            r#"
            SELECT {SLOT_COLUMNS} FROM slots
            WHERE (service_id = $1 OR (service_id IS NULL AND business_id = $2))
              AND ($3 = FALSE OR is_booked = FALSE)
            ORDER BY slot_date ASC NULLS FIRST, start_time ASC NULLS FIRST, label ASC
            "#
        ))
        .bind(service.id)
        .bind(service.business_id)
        .bind(only_free)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list slots", e))?;

        timer.observe_duration();
        rows.into_iter().map(Slot::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn delete_slot(&self, business_id: Uuid, slot_id: Uuid) -> Result<(), BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_slot"])
            .start_timer();

        let result = sqlx::query("DELETE FROM slots WHERE id = $1 AND business_id = $2")
            .bind(slot_id)
            .bind(business_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    BookingError::SlotInUse
                } else {
                    BookingError::database("Failed to delete slot", e)
                }
            })?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            return Err(BookingError::SlotNotFound);
        }
        info!(slot_id = %slot_id, "Slot deleted");
        Ok(())
    }

    // =========================================================================
    // Cart
    // =========================================================================

    #[instrument(skip(self, item), fields(user_id = %item.user_id, slot_id = %item.slot_id))]
    async fn add_cart_item(&self, item: NewCartItem) -> Result<CartItem, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_cart_item"])
            .start_timer();

        let cart_item = sqlx::query_as::<_, CartItem>(&format!(
            r#"
            INSERT INTO cart_items (id, user_id, service_id, business_id, slot_id, booking_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(item.user_id)
        .bind(item.service_id)
        .bind(item.business_id)
        .bind(item.slot_id)
        .bind(item.booking_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::DuplicateCartItem
            } else {
                BookingError::database("Failed to add cart item", e)
            }
        })?;

        timer.observe_duration();
        Ok(cart_item)
    }

    #[instrument(skip(self))]
    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_cart"])
            .start_timer();

        let items = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY created_utc, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list cart", e))?;

        timer.observe_duration();
        Ok(items)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_cart_items(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<CartItem>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_cart_items"])
            .start_timer();

        let items = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 AND id = ANY($2)"
        ))
        .bind(user_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get cart items", e))?;

        timer.observe_duration();
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_cart_item"])
            .start_timer();

        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| BookingError::database("Failed to remove cart item", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Bookings
    // =========================================================================

    #[instrument(skip(self, booking), fields(user_id = %booking.user_id, slot_id = %booking.slot_id))]
    async fn reserve_slot(&self, booking: NewBooking) -> Result<Booking, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reserve_slot"])
            .start_timer();

        let mut tx = self.begin().await?;

        let claimed = Self::claim_slot(
            &mut tx,
            booking.slot_id,
            booking.service_id,
            booking.business_id,
            booking.user_id,
        )
        .await?;

        if !claimed {
            let exists = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM slots
                    WHERE id = $1 AND (service_id = $2 OR (service_id IS NULL AND business_id = $3))
                )
                "#,
            )
            .bind(booking.slot_id)
            .bind(booking.service_id)
            .bind(booking.business_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| BookingError::database("Failed to check slot", e))?;

            return Err(if exists {
                BookingError::SlotAlreadyBooked
            } else {
                BookingError::SlotNotFound
            });
        }

        let created = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings (id, user_id, business_id, service_id, slot_id, address_id, total_amount, payment_status, booking_status, booking_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(booking.user_id)
        .bind(booking.business_id)
        .bind(booking.service_id)
        .bind(booking.slot_id)
        .bind(booking.address_id)
        .bind(booking.total_amount)
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(BookingStatus::Pending.as_str())
        .bind(booking.booking_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::SlotAlreadyBooked
            } else {
                BookingError::database("Failed to create booking", e)
            }
        })?;

        Self::commit(tx).await?;

        timer.observe_duration();
        info!(booking_id = %created.id, "Slot reserved");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn cancel_booking(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        today: NaiveDate,
    ) -> Result<Booking, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_booking"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to load booking", e))?
        .ok_or(BookingError::BookingNotFound)?;

        current.check_customer_cancel(today)?;

        let updated = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings SET booking_status = $2, updated_utc = NOW()
            WHERE id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(BookingStatus::Cancelled.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to cancel booking", e))?;

        Self::release_slot(&mut tx, updated.slot_id).await?;
        Self::commit(tx).await?;

        timer.observe_duration();
        info!(booking_id = %booking_id, "Booking cancelled");
        Ok(updated)
    }

    #[instrument(skip(self, patch), fields(status = %patch.status))]
    async fn update_booking_status(
        &self,
        business_id: Uuid,
        booking_id: Uuid,
        patch: BookingStatusPatch,
    ) -> Result<Booking, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_booking_status"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 AND business_id = $2 FOR UPDATE"
        ))
        .bind(booking_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to load booking", e))?
        .ok_or(BookingError::BookingNotFound)?;

        current.booking_status.transition_to(patch.status)?;

        let updated = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings
            SET booking_status = $3, status_reason = $4, payment_status = $5, updated_utc = NOW()
            WHERE id = $1 AND booking_status = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(current.booking_status.as_str())
        .bind(patch.status.as_str())
        .bind(&patch.reason)
        .bind(current.payment_status_after(patch.status).as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to update booking", e))?
        .ok_or(TransitionError::NotAllowed {
            from: current.booking_status,
            to: patch.status,
        })?;

        if patch.status.releases_slot() {
            Self::release_slot(&mut tx, updated.slot_id).await?;
        }
        Self::commit(tx).await?;

        timer.observe_duration();
        info!(
            booking_id = %booking_id,
            from = %current.booking_status,
            to = %patch.status,
            "Booking status updated"
        );
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking"])
            .start_timer();

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get booking", e))?;

        timer.observe_duration();
        Ok(booking)
    }

    #[instrument(skip(self))]
    async fn list_bookings_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bookings_by_user"])
            .start_timer();

        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_utc DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list bookings", e))?;

        timer.observe_duration();
        Ok(bookings)
    }

    #[instrument(skip(self))]
    async fn list_bookings_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Booking>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bookings_by_business"])
            .start_timer();

        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE business_id = $1 ORDER BY created_utc DESC, id DESC"
        ))
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list bookings", e))?;

        timer.observe_duration();
        Ok(bookings)
    }

    #[instrument(skip(self))]
    async fn has_live_booking(
        &self,
        user_id: Uuid,
        service_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["has_live_booking"])
            .start_timer();

        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bookings
                WHERE user_id = $1 AND service_id = $2 AND slot_id = $3 AND booking_date = $4
                  AND booking_status NOT IN ('CANCELLED', 'REJECTED', 'FAILED')
            )
            "#,
        )
        .bind(user_id)
        .bind(service_id)
        .bind(slot_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to check bookings", e))?;

        timer.observe_duration();
        Ok(exists)
    }

    // =========================================================================
    // Payment intents
    // =========================================================================

    #[instrument(skip(self, intent), fields(user_id = %intent.user_id, amount = %intent.amount))]
    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment_intent"])
            .start_timer();

        let created = sqlx::query_as::<_, PaymentIntent>(&format!(
            r#"
            INSERT INTO payment_intents (id, user_id, address_id, amount, currency, status, cart_item_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(intent.user_id)
        .bind(intent.address_id)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(PaymentIntentStatus::Pending.as_str())
        .bind(&intent.cart_item_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to create payment intent", e))?;

        timer.observe_duration();
        info!(payment_id = %created.id, "Payment intent created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn attach_checkout_session(
        &self,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<(), BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["attach_checkout_session"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE payment_intents SET stripe_session_id = $2, updated_utc = NOW() WHERE id = $1",
        )
        .bind(payment_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to attach checkout session", e))?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            return Err(BookingError::PaymentNotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_payment_intent(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<PaymentIntent>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment_intent"])
            .start_timer();

        let intent = sqlx::query_as::<_, PaymentIntent>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get payment intent", e))?;

        timer.observe_duration();
        Ok(intent)
    }

    #[instrument(skip(self, completion), fields(payment_id = %completion.payment_id))]
    async fn complete_checkout(
        &self,
        completion: CheckoutCompletion,
    ) -> Result<CompletionOutcome, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete_checkout"])
            .start_timer();

        let mut tx = self.begin().await?;

        let intent = sqlx::query_as::<_, PaymentIntent>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(completion.payment_id)
        .bind(completion.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to load payment intent", e))?
        .ok_or(BookingError::PaymentNotFound)?;

        if intent.status == PaymentIntentStatus::Paid {
            return Ok(CompletionOutcome::AlreadyPaid(intent));
        }

        let rows = sqlx::query_as::<_, PricedCartRow>(
            r#"
            SELECT c.id, c.user_id, c.service_id, c.business_id, c.slot_id, c.booking_date, c.created_utc, s.price
            FROM cart_items c
            JOIN services s ON s.id = c.service_id
            WHERE c.user_id = $1 AND c.id = ANY($2)
            ORDER BY c.created_utc, c.id
            FOR UPDATE OF c
            "#,
        )
        .bind(completion.user_id)
        .bind(&completion.cart_item_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to load cart items", e))?;

        let mut bookings = Vec::with_capacity(rows.len());
        for PricedCartRow { item, price } in rows {
            let claimed = Self::claim_slot(
                &mut tx,
                item.slot_id,
                item.service_id,
                item.business_id,
                item.user_id,
            )
            .await?;
            if !claimed {
                // Dropping the transaction rolls back every claim made so far.
                warn!(slot_id = %item.slot_id, "Slot taken before checkout completed");
                return Err(BookingError::SlotAlreadyBooked);
            }

            let booking = sqlx::query_as::<_, Booking>(&format!(
                r#"
                INSERT INTO bookings (id, user_id, business_id, service_id, slot_id, address_id, payment_intent_id, total_amount, payment_status, booking_status, booking_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {BOOKING_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(item.user_id)
            .bind(item.business_id)
            .bind(item.service_id)
            .bind(item.slot_id)
            .bind(intent.address_id)
            .bind(intent.id)
            .bind(price)
            .bind(PaymentStatus::Paid.as_str())
            .bind(BookingStatus::Confirmed.as_str())
            .bind(item.booking_date)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BookingError::SlotAlreadyBooked
                } else {
                    BookingError::database("Failed to create booking", e)
                }
            })?;
            bookings.push(booking);
        }

        let booking_ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();
        let paid = sqlx::query_as::<_, PaymentIntent>(&format!(
            r#"
            UPDATE payment_intents
            SET status = $2, stripe_session_id = $3, stripe_payment_intent_id = $4,
                booking_ids = $5, updated_utc = NOW()
            WHERE id = $1
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(intent.id)
        .bind(PaymentIntentStatus::Paid.as_str())
        .bind(&completion.stripe_session_id)
        .bind(&completion.stripe_payment_intent_id)
        .bind(&booking_ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to mark payment intent paid", e))?;

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND id = ANY($2)")
            .bind(completion.user_id)
            .bind(&completion.cart_item_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| BookingError::database("Failed to clear cart", e))?;

        Self::commit(tx).await?;

        timer.observe_duration();
        info!(
            payment_id = %paid.id,
            bookings = bookings.len(),
            "Checkout completed"
        );
        Ok(CompletionOutcome::Completed {
            intent: paid,
            bookings,
        })
    }

    #[instrument(skip(self), fields(status = %status))]
    async fn resolve_pending_payment(
        &self,
        payment_id: Uuid,
        status: PaymentIntentStatus,
    ) -> Result<IntentUpdate, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_pending_payment"])
            .start_timer();

        let updated = sqlx::query_as::<_, PaymentIntent>(&format!(
            r#"
            UPDATE payment_intents SET status = $2, updated_utc = NOW()
            WHERE id = $1 AND status = $3
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(status.as_str())
        .bind(PaymentIntentStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to update payment intent", e))?;

        timer.observe_duration();
        match updated {
            Some(intent) => Ok(IntentUpdate::Updated(intent)),
            None => Ok(match self.get_payment_intent(payment_id).await? {
                Some(intent) => IntentUpdate::Unchanged(intent),
                None => IntentUpdate::Missing,
            }),
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    #[instrument(skip(self, plans), fields(count = plans.len()))]
    async fn seed_plans(&self, plans: Vec<NewPlan>) -> Result<u64, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["seed_plans"])
            .start_timer();

        let mut inserted = 0;
        for plan in plans {
            let result = sqlx::query(
                r#"
                INSERT INTO subscription_plans (id, name, price, currency, billing_interval, stripe_price_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (stripe_price_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&plan.name)
            .bind(plan.price)
            .bind(&plan.currency)
            .bind(plan.billing_interval.as_str())
            .bind(&plan.stripe_price_id)
            .execute(&self.pool)
            .await
            .map_err(|e| BookingError::database("Failed to seed plan", e))?;
            inserted += result.rows_affected();
        }

        timer.observe_duration();
        info!(inserted = inserted, "Subscription plans seeded");
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_plans"])
            .start_timer();

        let plans = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE is_active = TRUE ORDER BY price"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list plans", e))?;

        timer.observe_duration();
        Ok(plans)
    }

    #[instrument(skip(self))]
    async fn find_plan_by_price(
        &self,
        stripe_price_id: &str,
    ) -> Result<Option<SubscriptionPlan>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_plan_by_price"])
            .start_timer();

        let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE stripe_price_id = $1"
        ))
        .bind(stripe_price_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get plan", e))?;

        timer.observe_duration();
        Ok(plan)
    }

    #[instrument(skip(self, upsert), fields(user_id = %upsert.user_id, status = %upsert.status))]
    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<ProviderSubscription, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_subscription"])
            .start_timer();

        let mut tx = self.begin().await?;

        let subscription = sqlx::query_as::<_, ProviderSubscription>(&format!(
            r#"
            INSERT INTO provider_subscriptions (id, user_id, plan_id, stripe_customer_id, stripe_subscription_id, status, current_period_start, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_id = EXCLUDED.plan_id,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                updated_utc = NOW()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(upsert.user_id)
        .bind(upsert.plan_id)
        .bind(&upsert.stripe_customer_id)
        .bind(&upsert.stripe_subscription_id)
        .bind(&upsert.status)
        .bind(upsert.current_period_start)
        .bind(upsert.current_period_end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to upsert subscription", e))?;

        Self::sync_user_flag(&mut tx, &subscription).await?;
        Self::commit(tx).await?;

        timer.observe_duration();
        info!(subscription_id = %subscription.id, "Provider subscription saved");
        Ok(subscription)
    }

    #[instrument(skip(self, sync), fields(stripe_subscription_id = %sync.stripe_subscription_id))]
    async fn sync_subscription(
        &self,
        sync: SubscriptionSync,
    ) -> Result<Option<ProviderSubscription>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sync_subscription"])
            .start_timer();

        let mut tx = self.begin().await?;

        let updated = sqlx::query_as::<_, ProviderSubscription>(&format!(
            r#"
            UPDATE provider_subscriptions
            SET status = $2,
                current_period_end = COALESCE($3, current_period_end),
                updated_utc = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(&sync.stripe_subscription_id)
        .bind(&sync.status)
        .bind(sync.current_period_end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| BookingError::database("Failed to sync subscription", e))?;

        if let Some(subscription) = &updated {
            Self::sync_user_flag(&mut tx, subscription).await?;
        }
        Self::commit(tx).await?;

        timer.observe_duration();
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn get_subscription_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProviderSubscription>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription_by_user"])
            .start_timer();

        let subscription = sqlx::query_as::<_, ProviderSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM provider_subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to get subscription", e))?;

        timer.observe_duration();
        Ok(subscription)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    #[instrument(skip(self, token))]
    async fn register_device_token(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<DeviceToken, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["register_device_token"])
            .start_timer();

        let device = sqlx::query_as::<_, DeviceToken>(
            r#"
            INSERT INTO device_tokens (id, user_id, token)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id, user_id, token, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to register device token", e))?;

        timer.observe_duration();
        Ok(device)
    }

    #[instrument(skip(self))]
    async fn list_device_tokens(&self, user_id: Uuid) -> Result<Vec<String>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_device_tokens"])
            .start_timer();

        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT token FROM device_tokens WHERE user_id = $1 ORDER BY token",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list device tokens", e))?;

        timer.observe_duration();
        Ok(tokens)
    }

    #[instrument(skip(self, tokens), fields(count = tokens.len()))]
    async fn delete_device_tokens(&self, tokens: &[String]) -> Result<u64, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_device_tokens"])
            .start_timer();

        let result = sqlx::query("DELETE FROM device_tokens WHERE token = ANY($1)")
            .bind(tokens)
            .execute(&self.pool)
            .await
            .map_err(|e| BookingError::database("Failed to delete device tokens", e))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, notification), fields(receiver_id = %notification.receiver_id))]
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_notification"])
            .start_timer();

        let created = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (id, receiver_id, sender_id, title, message, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(notification.receiver_id)
        .bind(notification.sender_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to create notification", e))?;

        timer.observe_duration();
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, BookingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_notifications"])
            .start_timer();

        let notifications = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE receiver_id = $1 ORDER BY created_utc DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("Failed to list notifications", e))?;

        timer.observe_duration();
        Ok(notifications)
    }
}

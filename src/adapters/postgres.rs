//! PostgreSQL access for the tables a dispatch pass reads and the two it writes
//! (`push_subscriptions` cleanup and `notification_log`).

use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use time::{Date, Time};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ports::NotificationStore;
use crate::types::habits::{ExecutionStatus, Habit, NotificationPreferences};
use crate::types::push::Subscription;

const SUBSCRIPTION_COLUMNS: &str = "user_id, endpoint, p256dh, auth";

/// `preferred_time` is cast so rows stored as text (`07:00`) decode too.
const HABIT_COLUMNS: &str =
    "id, user_id, name, micro_action, preferred_time::time AS preferred_time, days_of_week, is_active";

const PROFILE_COLUMNS: &str =
    "notify_briefing, notify_habits, briefing_hour, notify_advance_minutes, timezone";

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    notify_briefing: bool,
    notify_habits: bool,
    briefing_hour: i32,
    notify_advance_minutes: i32,
    timezone: Option<String>,
}

impl TryFrom<ProfileRow> for NotificationPreferences {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let briefing_hour = u8::try_from(row.briefing_hour)
            .ok()
            .filter(|hour| *hour < 24)
            .ok_or_else(|| {
                StoreError::InvalidRow(format!("briefing_hour {} out of range", row.briefing_hour))
            })?;
        Ok(Self {
            notify_briefing: row.notify_briefing,
            notify_habits: row.notify_habits,
            briefing_hour,
            advance_minutes: row.notify_advance_minutes,
            timezone: row.timezone,
        })
    }
}

#[derive(Debug, FromRow)]
struct HabitRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    micro_action: String,
    preferred_time: Option<Time>,
    days_of_week: Vec<i32>,
    is_active: bool,
}

impl From<HabitRow> for Habit {
    fn from(row: HabitRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            micro_action: row.micro_action,
            preferred_time: row.preferred_time,
            days_of_week: row
                .days_of_week
                .into_iter()
                .filter_map(|day| u8::try_from(day).ok().filter(|day| *day < 7))
                .collect(),
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl NotificationStore for PgStore {
    async fn list_subscriber_user_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT user_id FROM push_subscriptions ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn list_subscriptions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, StoreError> {
        let query =
            format!("SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions WHERE user_id = $1");
        let subscriptions = sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(subscriptions)
    }

    async fn delete_subscriptions_by_endpoint(
        &self,
        endpoints: &[String],
    ) -> Result<u64, StoreError> {
        if endpoints.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ANY($1)")
            .bind(endpoints)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, endpoint) DO UPDATE SET \
                p256dh = EXCLUDED.p256dh, \
                auth = EXCLUDED.auth, \
                updated_at = NOW()",
        )
        .bind(subscription.user_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.p256dh)
        .bind(&subscription.auth)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_subscription(&self, user_id: Uuid, endpoint: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
                .bind(user_id)
                .bind(endpoint)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreferences>, StoreError> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(NotificationPreferences::try_from).transpose()
    }

    async fn list_active_habits_for_weekday(
        &self,
        user_id: Uuid,
        weekday: u8,
    ) -> Result<Vec<Habit>, StoreError> {
        let query = format!(
            "SELECT {HABIT_COLUMNS} FROM habits \
             WHERE user_id = $1 AND is_active = true AND $2 = ANY(days_of_week)"
        );
        let rows = sqlx::query_as::<_, HabitRow>(&query)
            .bind(user_id)
            .bind(i32::from(weekday))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Habit::from).collect())
    }

    async fn briefing_exists(&self, user_id: Uuid, date: Date) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM evening_briefings \
             WHERE user_id = $1 AND briefing_date = $2)",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn habit_executed(
        &self,
        user_id: Uuid,
        habit_id: Uuid,
        date: Date,
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM daily_executions \
             WHERE user_id = $1 AND habit_id = $2 AND execution_date = $3 \
               AND status::text = $4)",
        )
        .bind(user_id)
        .bind(habit_id)
        .bind(date)
        .bind(ExecutionStatus::Executed.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn claim_event(&self, user_id: Uuid, tag: &str, date: Date) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO notification_log (user_id, tag, local_date) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, tag, local_date) DO NOTHING",
        )
        .bind(user_id)
        .bind(tag)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_event(&self, user_id: Uuid, tag: &str, date: Date) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM notification_log WHERE user_id = $1 AND tag = $2 AND local_date = $3",
        )
        .bind(user_id)
        .bind(tag)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_sent_log(&self, before: Date) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM notification_log WHERE local_date < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

use time::Date;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::habits::{Habit, NotificationPreferences};
use crate::types::push::Subscription;

/// Everything a dispatch pass reads from or writes to the database.
pub trait NotificationStore: Clone + Send + Sync + 'static {
    /// Distinct users owning at least one push subscription.
    fn list_subscriber_user_ids(&self)
    -> impl Future<Output = Result<Vec<Uuid>, StoreError>> + Send;

    fn list_subscriptions_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Subscription>, StoreError>> + Send;

    /// Removes every subscription with one of the given endpoints. Deleting an
    /// endpoint that is already gone is not an error.
    fn delete_subscriptions_by_endpoint(
        &self,
        endpoints: &[String],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Inserts or refreshes the keys of a `(user_id, endpoint)` subscription.
    fn upsert_subscription(
        &self,
        subscription: &Subscription,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_subscription(
        &self,
        user_id: Uuid,
        endpoint: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn load_preferences(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<NotificationPreferences>, StoreError>> + Send;

    /// Active habits whose `days_of_week` contains `weekday` (0 = Sunday).
    fn list_active_habits_for_weekday(
        &self,
        user_id: Uuid,
        weekday: u8,
    ) -> impl Future<Output = Result<Vec<Habit>, StoreError>> + Send;

    fn briefing_exists(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn habit_executed(
        &self,
        user_id: Uuid,
        habit_id: Uuid,
        date: Date,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Records that `tag` is being sent to `user_id` for `date`. Returns `false`
    /// when another pass already claimed it.
    fn claim_event(
        &self,
        user_id: Uuid,
        tag: &str,
        date: Date,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn release_event(
        &self,
        user_id: Uuid,
        tag: &str,
        date: Date,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drops sent-log rows for local dates before `before`.
    fn prune_sent_log(&self, before: Date) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use time::Date;
use uuid::Uuid;

use crate::error::StoreError;
use crate::ports::NotificationStore;
use crate::types::habits::{ExecutionStatus, Habit, NotificationPreferences};
use crate::types::push::Subscription;

#[derive(Default)]
struct State {
    subscriptions: Vec<Subscription>,
    preferences: HashMap<Uuid, NotificationPreferences>,
    habits: Vec<Habit>,
    briefings: HashSet<(Uuid, Date)>,
    executions: HashMap<(Uuid, Uuid, Date), ExecutionStatus>,
    sent_log: BTreeSet<(Uuid, String, Date)>,
    failing_users: HashSet<Uuid>,
    fail_deletes: bool,
    delete_batches: Vec<Vec<String>>,
}

/// Store double with the same semantics as the PostgreSQL adapter.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().expect("memory store lock");
        f(&mut state)
    }

    fn check_user(state: &State, user_id: Uuid) -> Result<(), StoreError> {
        if state.failing_users.contains(&user_id) {
            return Err(StoreError::InvalidRow(format!(
                "simulated read failure for {user_id}"
            )));
        }
        Ok(())
    }

    pub(crate) fn add_subscription(&self, subscription: Subscription) {
        self.with(|state| state.subscriptions.push(subscription));
    }

    pub(crate) fn set_preferences(&self, user_id: Uuid, prefs: NotificationPreferences) {
        self.with(|state| state.preferences.insert(user_id, prefs));
    }

    pub(crate) fn add_habit(&self, habit: Habit) {
        self.with(|state| state.habits.push(habit));
    }

    pub(crate) fn add_briefing(&self, user_id: Uuid, date: Date) {
        self.with(|state| state.briefings.insert((user_id, date)));
    }

    pub(crate) fn add_execution(
        &self,
        user_id: Uuid,
        habit_id: Uuid,
        date: Date,
        status: ExecutionStatus,
    ) {
        self.with(|state| state.executions.insert((user_id, habit_id, date), status));
    }

    pub(crate) fn fail_reads_for(&self, user_id: Uuid) {
        self.with(|state| state.failing_users.insert(user_id));
    }

    pub(crate) fn fail_deletes(&self) {
        self.with(|state| state.fail_deletes = true);
    }

    pub(crate) fn subscriptions(&self) -> Vec<Subscription> {
        self.with(|state| state.subscriptions.clone())
    }

    pub(crate) fn delete_batches(&self) -> Vec<Vec<String>> {
        self.with(|state| state.delete_batches.clone())
    }

    pub(crate) fn sent_log_len(&self) -> usize {
        self.with(|state| state.sent_log.len())
    }
}

impl NotificationStore for MemoryStore {
    async fn list_subscriber_user_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.with(|state| {
            let ids: BTreeSet<Uuid> = state.subscriptions.iter().map(|s| s.user_id).collect();
            ids.into_iter().collect()
        }))
    }

    async fn list_subscriptions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.with(|state| {
            state
                .subscriptions
                .iter()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect()
        }))
    }

    async fn delete_subscriptions_by_endpoint(
        &self,
        endpoints: &[String],
    ) -> Result<u64, StoreError> {
        self.with(|state| {
            state.delete_batches.push(endpoints.to_vec());
            if state.fail_deletes {
                return Err(StoreError::InvalidRow("simulated delete failure".into()));
            }
            let before = state.subscriptions.len();
            state
                .subscriptions
                .retain(|s| !endpoints.contains(&s.endpoint));
            Ok((before - state.subscriptions.len()) as u64)
        })
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.with(|state| {
            match state.subscriptions.iter_mut().find(|s| {
                s.user_id == subscription.user_id && s.endpoint == subscription.endpoint
            }) {
                Some(existing) => *existing = subscription.clone(),
                None => state.subscriptions.push(subscription.clone()),
            }
        });
        Ok(())
    }

    async fn delete_subscription(&self, user_id: Uuid, endpoint: &str) -> Result<bool, StoreError> {
        Ok(self.with(|state| {
            let before = state.subscriptions.len();
            state
                .subscriptions
                .retain(|s| !(s.user_id == user_id && s.endpoint == endpoint));
            before != state.subscriptions.len()
        }))
    }

    async fn load_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreferences>, StoreError> {
        self.with(|state| {
            Self::check_user(state, user_id)?;
            Ok(state.preferences.get(&user_id).cloned())
        })
    }

    async fn list_active_habits_for_weekday(
        &self,
        user_id: Uuid,
        weekday: u8,
    ) -> Result<Vec<Habit>, StoreError> {
        self.with(|state| {
            Self::check_user(state, user_id)?;
            Ok(state
                .habits
                .iter()
                .filter(|h| h.user_id == user_id && h.scheduled_on(weekday))
                .cloned()
                .collect())
        })
    }

    async fn briefing_exists(&self, user_id: Uuid, date: Date) -> Result<bool, StoreError> {
        Ok(self.with(|state| state.briefings.contains(&(user_id, date))))
    }

    async fn habit_executed(
        &self,
        user_id: Uuid,
        habit_id: Uuid,
        date: Date,
    ) -> Result<bool, StoreError> {
        Ok(self.with(|state| {
            state.executions.get(&(user_id, habit_id, date)) == Some(&ExecutionStatus::Executed)
        }))
    }

    async fn claim_event(&self, user_id: Uuid, tag: &str, date: Date) -> Result<bool, StoreError> {
        Ok(self.with(|state| state.sent_log.insert((user_id, tag.to_string(), date))))
    }

    async fn release_event(&self, user_id: Uuid, tag: &str, date: Date) -> Result<(), StoreError> {
        self.with(|state| state.sent_log.remove(&(user_id, tag.to_string(), date)));
        Ok(())
    }

    async fn prune_sent_log(&self, before: Date) -> Result<u64, StoreError> {
        Ok(self.with(|state| {
            let len = state.sent_log.len();
            state.sent_log.retain(|(_, _, date)| *date >= before);
            (len - state.sent_log.len()) as u64
        }))
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use time::macros::date;

    fn subscription(user_id: Uuid, endpoint: &str, p256dh: &str) -> Subscription {
        Subscription {
            user_id,
            endpoint: endpoint.to_string(),
            p256dh: p256dh.to_string(),
            auth: "auth".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_subscription__should_replace_keys_for_same_endpoint() {
        // Given
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        store
            .upsert_subscription(&subscription(user_id, "https://push.example/1", "old"))
            .await
            .expect("insert");

        // When
        store
            .upsert_subscription(&subscription(user_id, "https://push.example/1", "new"))
            .await
            .expect("update");

        // Then
        let subscriptions = store.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].p256dh, "new");
    }

    #[tokio::test]
    async fn delete_subscriptions_by_endpoint__should_be_idempotent() {
        // Given
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        store.add_subscription(subscription(user_id, "https://push.example/1", "k"));
        let endpoints = vec!["https://push.example/1".to_string()];

        // When
        let first = store
            .delete_subscriptions_by_endpoint(&endpoints)
            .await
            .expect("delete");
        let second = store
            .delete_subscriptions_by_endpoint(&endpoints)
            .await
            .expect("delete again");

        // Then
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn delete_subscription__should_only_remove_the_users_row() {
        // Given
        let store = MemoryStore::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.add_subscription(subscription(alice, "https://push.example/1", "k"));
        store.add_subscription(subscription(bob, "https://push.example/2", "k"));

        // When
        let removed = store
            .delete_subscription(alice, "https://push.example/1")
            .await
            .expect("delete");
        let missing = store
            .delete_subscription(alice, "https://push.example/2")
            .await
            .expect("delete");

        // Then
        assert!(removed);
        assert!(!missing);
        assert_eq!(
            store.list_subscriber_user_ids().await.expect("list"),
            vec![bob]
        );
    }

    #[tokio::test]
    async fn claim_event__should_succeed_once_per_day() {
        // Given
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        let today = date!(2025 - 01 - 12);

        // Then
        assert!(store.claim_event(user_id, "briefing-reminder", today).await.unwrap());
        assert!(!store.claim_event(user_id, "briefing-reminder", today).await.unwrap());
        assert!(
            store
                .claim_event(user_id, "briefing-reminder", date!(2025 - 01 - 13))
                .await
                .unwrap()
        );
        store
            .release_event(user_id, "briefing-reminder", today)
            .await
            .unwrap();
        assert!(store.claim_event(user_id, "briefing-reminder", today).await.unwrap());
    }

    #[tokio::test]
    async fn prune_sent_log__should_keep_recent_dates() {
        // Given
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        for day in [1, 5, 8] {
            let date = Date::from_calendar_date(2025, time::Month::January, day).unwrap();
            store.claim_event(user_id, "briefing-reminder", date).await.unwrap();
        }

        // When
        let pruned = store.prune_sent_log(date!(2025 - 01 - 05)).await.unwrap();

        // Then
        assert_eq!(pruned, 1);
        assert_eq!(store.sent_log_len(), 2);
    }
}

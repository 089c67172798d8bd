use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Briefing,
    Habit { habit_id: Uuid },
}

impl EventKind {
    pub fn habit_id(self) -> Option<Uuid> {
        match self {
            EventKind::Habit { habit_id } => Some(habit_id),
            EventKind::Briefing => None,
        }
    }
}

/// A notification computed by one scheduling pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub user_id: Uuid,
    pub kind: EventKind,
    pub title: String,
    pub body: String,
    pub tag: String,
    pub url: String,
    /// Calendar date in the user's timezone when the event was computed.
    pub local_date: Date,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub cleaned: usize,
    pub deduplicated: usize,
    pub skipped_users: usize,
}

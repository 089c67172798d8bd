use serde::{Deserialize, Serialize};
use time::Time;
use uuid::Uuid;

pub const DEFAULT_BRIEFING_HOUR: u8 = 21;
pub const DEFAULT_ADVANCE_MINUTES: i32 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub micro_action: String,
    pub preferred_time: Option<Time>,
    /// 0 = Sunday .. 6 = Saturday.
    pub days_of_week: Vec<u8>,
    pub is_active: bool,
}

impl Habit {
    pub fn scheduled_on(&self, weekday: u8) -> bool {
        self.is_active && self.days_of_week.contains(&weekday)
    }
}

/// Notification settings stored on the user profile.
///
/// A user without a profile row gets [`NotificationPreferences::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub notify_briefing: bool,
    pub notify_habits: bool,
    pub briefing_hour: u8,
    pub advance_minutes: i32,
    pub timezone: Option<String>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            notify_briefing: true,
            notify_habits: true,
            briefing_hour: DEFAULT_BRIEFING_HOUR,
            advance_minutes: DEFAULT_ADVANCE_MINUTES,
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Executed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Executed => "executed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

use time::{Date, OffsetDateTime, Time};
use time_tz::{OffsetDateTimeExt, Tz, timezones};
use uuid::Uuid;

use crate::error::{ConfigError, StoreError};
use crate::ports;
use crate::types::habits::{Habit, NotificationPreferences};
use crate::types::push::{EventKind, NotificationEvent};

/// The briefing fires during the first minutes of `briefing_hour`.
pub(crate) const BRIEFING_WINDOW_MINUTES: u8 = 15;
/// A habit reminder fires within this many minutes of its reminder time.
pub(crate) const HABIT_WINDOW_MINUTES: u8 = 7;

const MINUTES_PER_DAY: i32 = 24 * 60;

pub(crate) const BRIEFING_TAG: &str = "briefing-reminder";
const BRIEFING_TITLE: &str = "🌙 Briefing Noturno";
const BRIEFING_BODY: &str = "Hora de armar o campo para amanhã. Prepare seu ambiente!";
const BRIEFING_URL: &str = "/briefing";
const HABIT_URL: &str = "/";

/// Wall-clock reading in a user's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalClock {
    pub date: Date,
    pub hour: u8,
    pub minute: u8,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u8,
}

pub(crate) fn local_clock(instant: OffsetDateTime, tz: &Tz) -> LocalClock {
    let local = instant.to_timezone(tz);
    LocalClock {
        date: local.date(),
        hour: local.hour(),
        minute: local.minute(),
        weekday: local.weekday().number_days_from_sunday(),
    }
}

/// `preferred_time - advance_minutes`, wrapped onto a 24 hour clock.
pub(crate) fn reminder_time(preferred_time: Time, advance_minutes: i32) -> (u8, u8) {
    // advance comes straight from the database and may be any i32
    let total = i32::from(preferred_time.hour()) * 60 + i32::from(preferred_time.minute())
        - advance_minutes.rem_euclid(MINUTES_PER_DAY);
    let wrapped = total.rem_euclid(MINUTES_PER_DAY);
    // rem_euclid keeps both parts inside 0..24 and 0..60
    ((wrapped / 60) as u8, (wrapped % 60) as u8)
}

pub(crate) fn briefing_window_open(prefs: &NotificationPreferences, clock: &LocalClock) -> bool {
    prefs.notify_briefing
        && clock.hour == prefs.briefing_hour
        && clock.minute < BRIEFING_WINDOW_MINUTES
}

/// Only compares minutes inside the same hour, so a reminder at 06:58 does not
/// match 07:02.
pub(crate) fn habit_window_open(
    habit: &Habit,
    prefs: &NotificationPreferences,
    clock: &LocalClock,
) -> bool {
    let Some(preferred_time) = habit.preferred_time else {
        return false;
    };
    let (hour, minute) = reminder_time(preferred_time, prefs.advance_minutes);
    hour == clock.hour && minute.abs_diff(clock.minute) <= HABIT_WINDOW_MINUTES
}

pub(crate) fn briefing_event(user_id: Uuid, local_date: Date) -> NotificationEvent {
    NotificationEvent {
        user_id,
        kind: EventKind::Briefing,
        title: BRIEFING_TITLE.to_string(),
        body: BRIEFING_BODY.to_string(),
        tag: BRIEFING_TAG.to_string(),
        url: BRIEFING_URL.to_string(),
        local_date,
    }
}

pub(crate) fn habit_event(habit: &Habit, local_date: Date) -> NotificationEvent {
    NotificationEvent {
        user_id: habit.user_id,
        kind: EventKind::Habit { habit_id: habit.id },
        title: format!("⚡ {}", habit.name),
        body: format!("Micro-ação: {}. Apenas 2 minutos!", habit.micro_action),
        tag: format!("habit-{}", habit.id),
        url: HABIT_URL.to_string(),
        local_date,
    }
}

/// Decides which notifications are due for a user at a given instant.
///
/// Holds no state between passes. Two passes inside the same window emit the
/// same events again; deduplication happens in the dispatcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SchedulingEngine {
    default_tz: &'static Tz,
}

impl SchedulingEngine {
    pub(crate) fn new(default_timezone: &str) -> Result<Self, ConfigError> {
        let default_tz = timezones::get_by_name(default_timezone)
            .ok_or_else(|| ConfigError::UnknownTimezone(default_timezone.to_string()))?;
        Ok(Self { default_tz })
    }

    pub(crate) fn timezone_for(&self, user_id: Uuid, name: Option<&str>) -> &'static Tz {
        let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
            return self.default_tz;
        };
        match timezones::get_by_name(name) {
            Some(tz) => tz,
            None => {
                tracing::warn!(%user_id, timezone = name, "unknown timezone, using default");
                self.default_tz
            }
        }
    }

    pub(crate) async fn evaluate_user<S: ports::NotificationStore>(
        &self,
        store: &S,
        now: OffsetDateTime,
        user_id: Uuid,
    ) -> Result<Vec<NotificationEvent>, StoreError> {
        let prefs = store.load_preferences(user_id).await?.unwrap_or_default();
        let tz = self.timezone_for(user_id, prefs.timezone.as_deref());
        let clock = local_clock(now, tz);
        let mut events = Vec::new();

        if briefing_window_open(&prefs, &clock) && !store.briefing_exists(user_id, clock.date).await?
        {
            events.push(briefing_event(user_id, clock.date));
        }

        if prefs.notify_habits {
            let habits = store
                .list_active_habits_for_weekday(user_id, clock.weekday)
                .await?;
            for habit in &habits {
                if !habit.scheduled_on(clock.weekday) || !habit_window_open(habit, &prefs, &clock) {
                    continue;
                }
                if !store.habit_executed(user_id, habit.id, clock.date).await? {
                    events.push(habit_event(habit, clock.date));
                }
            }
        }

        tracing::debug!(
            %user_id,
            local_date = %clock.date,
            hour = clock.hour,
            minute = clock.minute,
            due = events.len(),
            "evaluated user"
        );
        Ok(events)
    }
}

use std::time::Duration;

use time::OffsetDateTime;

use crate::ports;

#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;
pub mod web_push;

pub use postgres::PgStore;
pub use web_push::HttpPushSender;

/// Wall clock backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimeProvider;

impl ports::TimeProvider for TokioTimeProvider {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}

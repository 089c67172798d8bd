use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::adapters::TokioTimeProvider;
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::ports::{NotificationStore, PushSender, TimeProvider};
use crate::push::delivery::DeliveryOutcome;
use crate::push::payload::PushPayload;
use crate::push::scheduler::SchedulingEngine;
use crate::types::push::{DispatchSummary, NotificationEvent, Subscription};

/// Sent-log rows older than this many days are pruned after each pass.
const SENT_LOG_RETENTION_DAYS: i64 = 7;

/// Runs scheduling passes: evaluates every subscriber, delivers due reminders
/// through a bounded worker pool and removes endpoints the push services report
/// as gone.
pub(crate) struct Dispatcher<S, P, T = TokioTimeProvider> {
    store: S,
    sender: P,
    time: T,
    engine: SchedulingEngine,
    concurrency: usize,
    icon: String,
    badge: String,
}

struct Claimed {
    event: NotificationEvent,
    /// False when the sent-log could not be written; nothing to release then.
    recorded: bool,
}

impl<S, P, T> Dispatcher<S, P, T>
where
    S: NotificationStore,
    P: PushSender,
    T: TimeProvider,
{
    pub(crate) fn new(
        store: S,
        sender: P,
        time: T,
        config: &DispatchConfig,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            store,
            sender,
            time,
            engine: SchedulingEngine::new(&config.default_timezone)?,
            concurrency: config.concurrency.max(1),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
        })
    }

    pub(crate) async fn run_once(&self) -> Result<DispatchSummary, DispatchError> {
        self.run(self.time.now()).await
    }

    pub(crate) async fn run(&self, now: OffsetDateTime) -> Result<DispatchSummary, DispatchError> {
        let user_ids = self
            .store
            .list_subscriber_user_ids()
            .await
            .map_err(DispatchError::Subscribers)?;
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut summary = DispatchSummary::default();

        let events = self
            .evaluate_users(user_ids, now, &permits, &mut summary)
            .await?;
        summary.processed = events.len();

        let claimed = self.claim_events(events, &mut summary).await;
        let (successes, gone) = self.deliver(&claimed, &permits, &mut summary).await?;

        for (entry, delivered) in claimed.iter().zip(successes) {
            if delivered == 0 && entry.recorded {
                let event = &entry.event;
                if let Err(err) = self
                    .store
                    .release_event(event.user_id, &event.tag, event.local_date)
                    .await
                {
                    tracing::warn!(
                        user_id = %event.user_id,
                        tag = %event.tag,
                        error = %err,
                        "failed to release undelivered reminder"
                    );
                }
            }
        }

        summary.cleaned = gone.len();
        if !gone.is_empty() {
            let endpoints: Vec<String> = gone.into_iter().collect();
            match self.store.delete_subscriptions_by_endpoint(&endpoints).await {
                Ok(deleted) => tracing::info!(
                    gone = endpoints.len(),
                    deleted,
                    "removed expired subscriptions"
                ),
                Err(err) => tracing::error!(
                    gone = endpoints.len(),
                    error = %err,
                    "failed to remove expired subscriptions"
                ),
            }
        }

        self.prune_sent_log(now).await;

        tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            cleaned = summary.cleaned,
            deduplicated = summary.deduplicated,
            skipped_users = summary.skipped_users,
            "dispatch pass finished"
        );
        Ok(summary)
    }

    async fn evaluate_users(
        &self,
        user_ids: Vec<Uuid>,
        now: OffsetDateTime,
        permits: &Arc<Semaphore>,
        summary: &mut DispatchSummary,
    ) -> Result<Vec<NotificationEvent>, DispatchError> {
        let mut tasks = JoinSet::new();
        for user_id in user_ids {
            let store = self.store.clone();
            let engine = self.engine;
            let permit = Arc::clone(permits).acquire_owned().await?;
            tasks.spawn(async move {
                let _permit = permit;
                (user_id, engine.evaluate_user(&store, now, user_id).await)
            });
        }

        let mut events = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(user_events))) => events.extend(user_events),
                Ok((user_id, Err(err))) => {
                    summary.skipped_users += 1;
                    tracing::warn!(%user_id, error = %err, "skipping user for this pass");
                }
                Err(err) => {
                    summary.skipped_users += 1;
                    tracing::error!(error = %err, "user evaluation task aborted");
                }
            }
        }
        Ok(events)
    }

    async fn claim_events(
        &self,
        events: Vec<NotificationEvent>,
        summary: &mut DispatchSummary,
    ) -> Vec<Claimed> {
        let mut claimed = Vec::with_capacity(events.len());
        for event in events {
            let claim = self
                .store
                .claim_event(event.user_id, &event.tag, event.local_date)
                .await;
            match claim {
                Ok(true) => claimed.push(Claimed {
                    event,
                    recorded: true,
                }),
                Ok(false) => {
                    summary.deduplicated += 1;
                    tracing::debug!(
                        user_id = %event.user_id,
                        habit_id = ?event.kind.habit_id(),
                        tag = %event.tag,
                        "reminder already sent today"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        user_id = %event.user_id,
                        tag = %event.tag,
                        error = %err,
                        "could not record reminder; delivering anyway"
                    );
                    claimed.push(Claimed {
                        event,
                        recorded: false,
                    });
                }
            }
        }
        claimed
    }

    /// Returns the number of successful deliveries per claimed event and the
    /// distinct endpoints reported gone.
    async fn deliver(
        &self,
        claimed: &[Claimed],
        permits: &Arc<Semaphore>,
        summary: &mut DispatchSummary,
    ) -> Result<(Vec<usize>, BTreeSet<String>), DispatchError> {
        let mut subscriptions: HashMap<Uuid, Arc<Vec<Subscription>>> = HashMap::new();
        let mut tasks = JoinSet::new();

        for (index, entry) in claimed.iter().enumerate() {
            let event = &entry.event;
            let targets = match subscriptions.get(&event.user_id) {
                Some(targets) => Arc::clone(targets),
                None => match self.store.list_subscriptions_for_user(event.user_id).await {
                    Ok(found) => {
                        let found = Arc::new(found);
                        subscriptions.insert(event.user_id, Arc::clone(&found));
                        found
                    }
                    Err(err) => {
                        tracing::warn!(
                            user_id = %event.user_id,
                            error = %err,
                            "failed to load subscriptions"
                        );
                        subscriptions.insert(event.user_id, Arc::new(Vec::new()));
                        summary.skipped_users += 1;
                        continue;
                    }
                },
            };

            let payload = Arc::new(PushPayload::for_event(event, &self.icon, &self.badge));
            for subscription in targets.iter().cloned() {
                let sender = self.sender.clone();
                let payload = Arc::clone(&payload);
                let permit = Arc::clone(permits).acquire_owned().await?;
                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = sender.send(&subscription, &payload).await;
                    (index, subscription.endpoint, outcome)
                });
            }
        }

        let mut successes = vec![0usize; claimed.len()];
        let mut gone = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, DeliveryOutcome::Delivered)) => {
                    summary.sent += 1;
                    successes[index] += 1;
                }
                Ok((_, endpoint, DeliveryOutcome::Gone)) => {
                    gone.insert(endpoint);
                }
                Ok((_, _, DeliveryOutcome::Failed(_))) => summary.failed += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::error!(error = %err, "delivery task aborted");
                }
            }
        }
        Ok((successes, gone))
    }

    async fn prune_sent_log(&self, now: OffsetDateTime) {
        let cutoff = now
            .date()
            .saturating_sub(time::Duration::days(SENT_LOG_RETENTION_DAYS));
        match self.store.prune_sent_log(cutoff).await {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, %cutoff, "pruned sent-log"),
            Err(err) => tracing::warn!(error = %err, "failed to prune sent-log"),
        }
    }
}

/// Object-safe handle on a dispatcher so the HTTP layer does not carry its
/// type parameters.
pub(crate) trait DispatchRunner: Send + Sync + 'static {
    fn dispatch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<DispatchSummary, DispatchError>> + Send + '_>>;
}

impl<S, P, T> DispatchRunner for Dispatcher<S, P, T>
where
    S: NotificationStore,
    P: PushSender,
    T: TimeProvider,
{
    fn dispatch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<DispatchSummary, DispatchError>> + Send + '_>> {
        Box::pin(self.run_once())
    }
}

/// Runs a pass, then sleeps for `interval`, forever. Fatal errors are logged
/// and the next tick tries again.
pub(crate) async fn run_periodically<T: TimeProvider>(
    runner: Arc<dyn DispatchRunner>,
    time: T,
    interval: Duration,
) {
    loop {
        if let Err(err) = runner.dispatch().await {
            tracing::error!(error = %err, "dispatch pass failed");
        }
        time.sleep(interval).await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use crate::ports::PushSender;
    use crate::push::delivery::DeliveryOutcome;
    use crate::push::payload::PushPayload;
    use crate::types::push::Subscription;

    /// Records every send and answers according to the endpoint suffix:
    /// `/gone` → 410, `/fail` → transient failure, anything else delivered.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Arc<Mutex<Vec<(String, PushPayload)>>>,
    }

    impl RecordingSender {
        pub(crate) fn sent(&self) -> Vec<(String, PushPayload)> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    impl PushSender for RecordingSender {
        type Fut<'a>
            = std::future::Ready<DeliveryOutcome>
        where
            Self: 'a;

        fn send<'a>(
            &'a self,
            subscription: &'a Subscription,
            payload: &'a PushPayload,
        ) -> Self::Fut<'a> {
            self.sent
                .lock()
                .expect("sent lock")
                .push((subscription.endpoint.clone(), payload.clone()));
            let outcome = if subscription.endpoint.ends_with("/gone") {
                DeliveryOutcome::Gone
            } else if subscription.endpoint.ends_with("/fail") {
                DeliveryOutcome::Failed("push service responded 500".to_string())
            } else {
                DeliveryOutcome::Delivered
            };
            std::future::ready(outcome)
        }
    }
}

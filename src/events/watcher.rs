//! Live event stream for one stack.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::history::current_events;
use crate::provider::{ResourceGroupClient, StatusEvent};
use crate::retry::RetryPolicy;

/// Polling behaviour of an [`EventWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Sleep between successful fetches.
    pub poll_delay: Duration,
    /// Retry budget for a failing fetch.
    pub retry: RetryPolicy,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_millis(500),
            retry: RetryPolicy::exponential(3, Duration::from_secs(2), Duration::from_secs(8)),
        }
    }
}

/// Produces chronologically ordered event streams.
#[derive(Clone)]
pub struct EventWatcher {
    /// Provider client shared with the stream tasks.
    client: Arc<dyn ResourceGroupClient>,
    /// Polling behaviour.
    settings: WatchSettings,
}

impl std::fmt::Debug for EventWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWatcher")
            .field("backend", &self.client.backend_type())
            .field("settings", &self.settings)
            .finish()
    }
}

impl EventWatcher {
    /// Creates a watcher.
    #[must_use]
    pub fn new(client: Arc<dyn ResourceGroupClient>, settings: WatchSettings) -> Self {
        Self { client, settings }
    }

    /// Returns the provider client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn ResourceGroupClient> {
        &self.client
    }

    /// Returns the polling behaviour.
    #[must_use]
    pub const fn settings(&self) -> WatchSettings {
        self.settings
    }

    /// Streams the events of `group` newer than `since`, oldest first.
    ///
    /// Without `since`, the current operation's history is streamed first.
    /// The stream ends when the stack's own record reaches a status that is
    /// not in progress and is newer than the watch start (`since`, or the
    /// time of this call), when `cancel` fires, when the stack does not
    /// exist, or when reading keeps failing after the retry budget. Read
    /// failures never surface as items.
    pub fn watch(
        &self,
        group: &str,
        since: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StatusEvent> + Send + use<> {
        let client = Arc::clone(&self.client);
        let settings = self.settings;
        let group = group.to_string();
        let started = since.unwrap_or_else(Utc::now);

        stream! {
            let client_ref: &dyn ResourceGroupClient = client.as_ref();
            let group_ref = group.as_str();
            let mut watermark = since;

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let fetched = settings
                    .retry
                    .run(
                        || current_events(client_ref, group_ref, watermark),
                        |err| !err.is_group_not_found(),
                    )
                    .await;

                let mut batch = match fetched {
                    Ok(batch) => batch,
                    Err(err) if err.is_group_not_found() => {
                        debug!("Stack {group_ref} is gone, ending event stream");
                        break;
                    }
                    Err(err) => {
                        warn!("Giving up on events of {group_ref}: {err}");
                        break;
                    }
                };

                batch.reverse();
                let mut finished = false;
                for event in batch {
                    watermark = Some(watermark.map_or(event.timestamp, |w| w.max(event.timestamp)));
                    finished |= event.is_group_event()
                        && !event.is_in_progress()
                        && event.timestamp > started;
                    yield event;
                }

                if finished {
                    break;
                }

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(settings.poll_delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::events::history::tests::clarity_history;
    use crate::provider::fake::{Call, FakeProvider};

    fn quick() -> WatchSettings {
        WatchSettings {
            poll_delay: Duration::from_millis(1),
            retry: RetryPolicy::fixed(2, Duration::ZERO),
        }
    }

    fn current_operation() -> Vec<StatusEvent> {
        let mut expected = clarity_history()[..3].to_vec();
        expected.reverse();
        expected
    }

    #[tokio::test]
    async fn test_yields_current_operation_in_order() {
        let fake = Arc::new(FakeProvider::new().with_events(clarity_history(), 3));
        let watcher = EventWatcher::new(fake, quick());

        let events: Vec<StatusEvent> = watcher
            .watch("clarity-master", None, CancellationToken::new())
            .take(3)
            .collect()
            .await;

        assert_eq!(events, current_operation());
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_ends_on_terminal_record_after_since() {
        let history = clarity_history();
        let fake = Arc::new(FakeProvider::new().with_events(history.clone(), 3));
        let watcher = EventWatcher::new(fake, quick());

        let events: Vec<StatusEvent> = watcher
            .watch("clarity-master", Some(history[3].timestamp), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events, current_operation());
    }

    #[tokio::test]
    async fn test_old_terminal_record_does_not_end_watch() {
        let fake = Arc::new(FakeProvider::new().with_events(clarity_history(), 3));
        let watcher = EventWatcher::new(fake.clone(), quick());
        let cancel = CancellationToken::new();

        let stream = watcher.watch("clarity-master", None, cancel.clone());
        let consumer = tokio::spawn(async move { stream.collect::<Vec<_>>().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!consumer.is_finished());
        cancel.cancel();
        let events = consumer.await.expect("consumer task");
        assert_eq!(events, current_operation());
        assert!(fake.count(|c| matches!(c, Call::ListEvents(None))) > 1);
    }

    #[tokio::test]
    async fn test_recovers_from_throttled_reads() {
        let history = clarity_history();
        let fake = Arc::new(
            FakeProvider::new()
                .with_events(history.clone(), 3)
                .with_event_failures(1),
        );
        let watcher = EventWatcher::new(fake.clone(), quick());

        let events: Vec<StatusEvent> = watcher
            .watch("clarity-master", Some(history[3].timestamp), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events, current_operation());
        assert_eq!(fake.count(|c| matches!(c, Call::ListEvents(_))), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_stream_quietly() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_events(clarity_history(), 3)
                .with_event_failures(5),
        );
        let watcher = EventWatcher::new(fake.clone(), quick());

        let events: Vec<StatusEvent> = watcher
            .watch("clarity-master", None, CancellationToken::new())
            .collect()
            .await;

        assert!(events.is_empty());
        assert_eq!(fake.count(|c| matches!(c, Call::ListEvents(_))), 2);
    }

    #[tokio::test]
    async fn test_skips_events_before_watermark() {
        let history = clarity_history();
        let fake = Arc::new(FakeProvider::new().with_events(history.clone(), 3));
        let watcher = EventWatcher::new(fake, quick());

        let events: Vec<StatusEvent> = watcher
            .watch("clarity-master", Some(history[1].timestamp), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events, history[..1].to_vec());
    }

    #[tokio::test]
    async fn test_missing_stack_ends_silently() {
        let fake = Arc::new(FakeProvider::new().with_missing_events());
        let watcher = EventWatcher::new(fake.clone(), quick());

        let events: Vec<StatusEvent> = watcher
            .watch("gone", None, CancellationToken::new())
            .collect()
            .await;

        assert!(events.is_empty());
        assert_eq!(fake.count(|c| matches!(c, Call::ListEvents(_))), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_fetches_nothing() {
        let fake = Arc::new(FakeProvider::new().with_events(clarity_history(), 3));
        let watcher = EventWatcher::new(fake.clone(), quick());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let events: Vec<StatusEvent> = watcher.watch("clarity-master", None, cancel).collect().await;

        assert!(events.is_empty());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_polling() {
        let history = clarity_history();
        let fake = Arc::new(FakeProvider::new().with_events(history.clone(), 3));
        let watcher = EventWatcher::new(fake, quick());
        let cancel = CancellationToken::new();

        let stream = watcher.watch("clarity-master", Some(history[0].timestamp), cancel.clone());
        let consumer = tokio::spawn(async move { stream.collect::<Vec<_>>().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let events = consumer.await.expect("consumer task");
        assert!(events.is_empty());
    }
}

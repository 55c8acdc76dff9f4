//! Watch-and-diagnose wrapper around long-running stack operations.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::diagnose::diagnose_failure;
use super::printer::EventSink;
use super::watcher::EventWatcher;
use crate::error::Result;

/// Streams a stack's events to a sink while an operation runs, and
/// reports the stack's failures if the operation fails.
#[derive(Clone)]
pub struct EventMonitor {
    /// Event source.
    watcher: EventWatcher,
    /// Event destination.
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMonitor")
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}

impl EventMonitor {
    /// Creates a monitor.
    #[must_use]
    pub fn new(watcher: EventWatcher, sink: Arc<dyn EventSink>) -> Self {
        Self { watcher, sink }
    }

    /// Returns the underlying watcher.
    #[must_use]
    pub const fn watcher(&self) -> &EventWatcher {
        &self.watcher
    }

    /// Runs `operation` while streaming `group`'s events to the sink.
    ///
    /// The watcher is cancelled on every exit path. When the operation
    /// fails, the stack's failure events are rendered to the sink before
    /// the original error is returned; errors while diagnosing are logged
    /// and dropped.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error.
    pub async fn watch_during<T, F>(&self, group: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cancel = CancellationToken::new();
        let stream = self.watcher.watch(group, Some(Utc::now()), cancel.clone());
        let sink = Arc::clone(&self.sink);

        let printer = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(event) = stream.next().await {
                sink.on_event(&event);
            }
        });

        // Cancels the watcher even if this future is dropped mid-operation.
        let guard = cancel.drop_guard();
        let result = operation.await;
        drop(guard);

        if let Err(err) = printer.await {
            debug!("Event printer for {group} stopped abnormally: {err}");
        }

        if let Err(err) = &result {
            debug!("Operation on {group} failed ({err}), diagnosing");
            self.report_failure(group).await;
        }

        result
    }

    /// Renders `group`'s failure events to the sink. Best effort.
    pub async fn report_failure(&self, group: &str) {
        match diagnose_failure(self.watcher.client().as_ref(), group).await {
            Ok(report) => self.sink.on_diagnosis(group, &report),
            Err(err) => warn!("Could not diagnose failure of {group}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{ChangeSetError, StackDeployError};
    use crate::events::history::tests::clarity_history;
    use crate::events::printer::tests::RecordingSink;
    use crate::events::watcher::WatchSettings;
    use crate::provider::fake::{event, FakeProvider};
    use crate::provider::ResourceGroupClient;
    use crate::retry::RetryPolicy;

    fn monitor(fake: Arc<FakeProvider>, sink: Arc<RecordingSink>) -> EventMonitor {
        let settings = WatchSettings {
            poll_delay: Duration::from_millis(1),
            retry: RetryPolicy::fixed(1, Duration::ZERO),
        };
        let client: Arc<dyn ResourceGroupClient> = fake;
        EventMonitor::new(EventWatcher::new(client, settings), sink)
    }

    fn later(minutes: i64) -> String {
        (Utc::now() + chrono::Duration::minutes(minutes)).to_rfc3339()
    }

    #[tokio::test]
    async fn test_streams_events_and_passes_value_through() {
        let events = vec![
            event("app", "app", "UPDATE_COMPLETE", &later(90), None),
            event("app", "Bucket", "UPDATE_COMPLETE", &later(60), None),
            event("app", "app", "UPDATE_IN_PROGRESS", &later(30), Some("User Initiated")),
        ];
        let fake = Arc::new(FakeProvider::new().with_events(events, 10));
        let sink = Arc::new(RecordingSink::default());

        let value = monitor(fake, sink.clone())
            .watch_during("app", async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(7)
            })
            .await
            .expect("operation result");

        assert_eq!(value, 7);
        let seen: Vec<String> = sink
            .events
            .lock()
            .expect("lock")
            .iter()
            .map(|e| format!("{}:{}", e.logical_id, e.status))
            .collect();
        assert_eq!(
            seen,
            vec!["app:UPDATE_IN_PROGRESS", "Bucket:UPDATE_COMPLETE", "app:UPDATE_COMPLETE"]
        );
        assert!(sink.diagnoses.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_diagnosed_and_rethrown() {
        colored::control::set_override(false);
        let fake = Arc::new(FakeProvider::new().with_events(clarity_history()[3..].to_vec(), 3));
        let sink = Arc::new(RecordingSink::default());

        let result: Result<()> = monitor(fake, sink.clone())
            .watch_during("clarity-master", async {
                Err(StackDeployError::ChangeSet(ChangeSetError::Failed {
                    name: String::from("stackdeploy-1"),
                    reason: String::from("boom"),
                }))
            })
            .await;

        assert!(matches!(
            result,
            Err(StackDeployError::ChangeSet(ChangeSetError::Failed { .. }))
        ));
        let diagnoses = sink.diagnoses.lock().expect("lock");
        assert_eq!(diagnoses.len(), 1);
        assert_eq!(diagnoses[0].0, "clarity-master");
        assert!(diagnoses[0].1.contains("UPDATE_ROLLBACK_IN_PROGRESS"));
    }

    #[tokio::test]
    async fn test_diagnosis_errors_do_not_mask_failure() {
        let fake = Arc::new(FakeProvider::new().with_missing_events());
        let sink = Arc::new(RecordingSink::default());

        let result: Result<()> = monitor(fake, sink.clone())
            .watch_during("gone", async { Err(StackDeployError::internal("boom")) })
            .await;

        assert!(matches!(result, Err(StackDeployError::Internal(_))));
        assert!(sink.diagnoses.lock().expect("lock").is_empty());
    }
}

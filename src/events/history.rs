//! Event history of the current stack operation.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::Result;
use crate::provider::{ResourceGroupClient, StatusEvent};

/// Returns the events of the stack's current (or most recent) operation,
/// newest first.
///
/// Pages are walked newest-first. The walk stops at the stack's own
/// terminal record of the previous operation, or at the first event at or
/// before `since`.
///
/// # Errors
///
/// Returns any provider error, including
/// [`ProviderError::GroupNotFound`](crate::error::ProviderError::GroupNotFound).
pub async fn current_events(
    client: &dyn ResourceGroupClient,
    group: &str,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<StatusEvent>> {
    let mut events = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = client.list_events(group, page_token.as_deref()).await?;
        trace!("Fetched {} events for {group}", page.events.len());

        for event in page.events {
            let previous_operation_end =
                event.is_group_event() && !event.is_in_progress() && !events.is_empty();
            let before_watermark = since.is_some_and(|since| event.timestamp <= since);
            if previous_operation_end || before_watermark {
                return Ok(events);
            }
            events.push(event);
        }

        match page.next_token {
            Some(token) => page_token = Some(token),
            None => return Ok(events),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::fake::{event, Call, FakeProvider};

    /// Stack records of one stack, newest first: a completed update, three
    /// rolled-back updates and two older completed updates.
    pub(crate) fn clarity_history() -> Vec<StatusEvent> {
        const REASON: &str = "Parameter validation failed: parameter value undefined for parameter name DBSecurityGroup does not exist, parameter value undefined for parameter name RedisSecurityGroup does not exist, parameter value undefined for parameter name HistorianDBServersAccessSecurityGroup does not exist";
        let g = "clarity-master";
        let user = Some("User Initiated");
        vec![
            event(g, g, "UPDATE_COMPLETE", "2019-01-22T22:11:34.412Z", None),
            event(g, g, "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS", "2019-01-22T22:11:33.430Z", None),
            event(g, g, "UPDATE_IN_PROGRESS", "2019-01-22T22:11:15.785Z", user),
            event(g, g, "UPDATE_ROLLBACK_COMPLETE", "2019-01-22T21:58:20.357Z", None),
            event(g, g, "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS", "2019-01-22T21:58:14.458Z", None),
            event(g, g, "UPDATE_ROLLBACK_IN_PROGRESS", "2019-01-22T21:57:59.697Z", Some(REASON)),
            event(g, g, "UPDATE_IN_PROGRESS", "2019-01-22T21:57:56.642Z", user),
            event(g, g, "UPDATE_ROLLBACK_COMPLETE", "2019-01-22T21:51:29.134Z", None),
            event(g, g, "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS", "2019-01-22T21:51:28.086Z", None),
            event(g, g, "UPDATE_ROLLBACK_IN_PROGRESS", "2019-01-22T21:51:10.843Z", Some(REASON)),
            event(g, g, "UPDATE_IN_PROGRESS", "2019-01-22T21:51:07.252Z", user),
            event(g, g, "UPDATE_ROLLBACK_COMPLETE", "2019-01-22T21:42:41.351Z", None),
            event(g, g, "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS", "2019-01-22T21:42:40.462Z", None),
            event(g, g, "UPDATE_ROLLBACK_IN_PROGRESS", "2019-01-22T21:42:24.977Z", Some(REASON)),
            event(g, g, "UPDATE_IN_PROGRESS", "2019-01-22T21:42:22.358Z", user),
            event(g, g, "UPDATE_COMPLETE", "2019-01-21T23:25:10.407Z", None),
            event(g, g, "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS", "2019-01-21T23:25:09.537Z", None),
            event(g, g, "UPDATE_IN_PROGRESS", "2019-01-21T23:25:01.465Z", user),
            event(g, g, "UPDATE_COMPLETE", "2019-01-21T23:21:08.434Z", None),
        ]
    }

    #[tokio::test]
    async fn test_stops_at_previous_operation() {
        let history = clarity_history();
        let fake = FakeProvider::new().with_events(history.clone(), 3);

        let events = current_events(&fake, "clarity-master", None)
            .await
            .expect("events");

        assert_eq!(events, history[..3].to_vec());
        assert_eq!(fake.count(|c| matches!(c, Call::ListEvents(_))), 2);
    }

    #[tokio::test]
    async fn test_follows_pages_until_previous_operation() {
        let history = clarity_history()[3..].to_vec();
        let fake = FakeProvider::new().with_events(history.clone(), 3);

        let events = current_events(&fake, "clarity-master", None)
            .await
            .expect("events");

        assert_eq!(events, history[..4].to_vec());
        assert_eq!(
            fake.calls(),
            vec![Call::ListEvents(None), Call::ListEvents(Some(String::from("3")))]
        );
    }

    #[tokio::test]
    async fn test_stops_at_watermark() {
        let history = clarity_history();
        let fake = FakeProvider::new().with_events(history.clone(), 3);
        let since = history[1].timestamp;

        let events = current_events(&fake, "clarity-master", Some(since))
            .await
            .expect("events");

        assert_eq!(events, history[..1].to_vec());
    }
}

//! Transient notices that dismiss themselves.

use std::time::Duration;

use uuid::Uuid;

use crate::events::{DomainEvent, EventBus};
use crate::types::Timestamp;

/// Publish a notice and schedule its dismissal.
///
/// Dismissal needs a tokio runtime; outside one only the notice itself is
/// published and the renderer is left to expire it from `dismiss_after_ms`.
pub fn show_notice(events: &EventBus, text: impl Into<String>, dismiss_after: Duration) -> Uuid {
    let id = Uuid::new_v4();
    let text = text.into();
    tracing::debug!(%id, %text, "Notice shown");
    events.publish(DomainEvent::NoticeShown {
        id,
        text,
        dismiss_after_ms: dismiss_after.as_millis() as u64,
        timestamp: Timestamp::now(),
    });

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let events = events.clone();
        handle.spawn(async move {
            tokio::time::sleep(dismiss_after).await;
            events.publish(DomainEvent::NoticeDismissed {
                id,
                timestamp: Timestamp::now(),
            });
        });
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_notice_dismisses_after_delay() {
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let id = show_notice(&events, "Switched to Chat Kiki", Duration::from_secs(2));

        match rx.recv().await.unwrap() {
            DomainEvent::NoticeShown {
                id: shown,
                text,
                dismiss_after_ms,
                ..
            } => {
                assert_eq!(shown, id);
                assert_eq!(text, "Switched to Chat Kiki");
                assert_eq!(dismiss_after_ms, 2000);
            }
            other => panic!("unexpected event {:?}", other),
        }

        match rx.recv().await.unwrap() {
            DomainEvent::NoticeDismissed { id: dismissed, .. } => assert_eq!(dismissed, id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_notice_without_runtime_still_publishes() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        show_notice(&events, "hello", Duration::from_secs(1));
        assert_eq!(rx.try_recv().unwrap().event_name(), "notice_shown");
        assert!(rx.try_recv().is_err());
    }
}

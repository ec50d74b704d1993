//! Notification dispatch over whatever transport is plugged in.

use crate::error::DeliveryError;
use crate::format::format_event;
use crate::models::{ChangeEvent, SubscriberId};
use futures::future::join_all;
use std::future::Future;
use tracing::{info, warn};

/// Sink for outbound messages.
pub trait Notifier: Send + Sync {
    fn deliver(
        &self,
        subscriber: SubscriberId,
        text: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Delivery counts for one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Deliver every event, one message each.
///
/// Failures are logged and counted; they never stop the remaining deliveries.
pub async fn dispatch<N: Notifier>(notifier: &N, events: &[ChangeEvent]) -> DispatchReport {
    let deliveries = events.iter().map(|event| async move {
        let text = format_event(event);
        (event, notifier.deliver(event.subscriber, &text).await)
    });

    let mut report = DispatchReport::default();
    for (event, result) in join_all(deliveries).await {
        match result {
            Ok(()) => {
                report.delivered += 1;
                info!(
                    subscriber = event.subscriber,
                    asset = %event.asset,
                    pct = event.pct_change,
                    "notification sent"
                );
            }
            Err(e) => {
                report.failed += 1;
                warn!(subscriber = event.subscriber, asset = %event.asset, error = %e, "notification failed");
            }
        }
    }
    report
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;
    use crate::models::Direction;
    use chrono::Utc;

    fn event(subscriber: SubscriberId) -> ChangeEvent {
        ChangeEvent {
            subscriber,
            asset: "solana".to_string(),
            last: 100.0,
            current: 90.0,
            pct_change: 10.0,
            direction: Direction::Down,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_continues_past_failures() {
        let notifier = RecordingNotifier {
            fail_for: vec![2],
            ..Default::default()
        };
        let report = dispatch(&notifier, &[event(1), event(2), event(3)]).await;
        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, text)| text.contains("SOLANA")));
    }
}

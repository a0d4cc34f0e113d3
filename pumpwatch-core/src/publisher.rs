//! Fan-out of per-cycle summaries to any number of subscribers.
//!
//! The publisher keeps the most recent summary so a fresh subscriber gets
//! a value immediately instead of waiting up to one full cycle, then
//! streams every summary published after that. A slow subscriber only
//! loses its own backlog; it never blocks the sampler or its peers.

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use pumpwatch_types::SystemSummary;

/// Broadcasts one [`SystemSummary`] per completed cycle.
pub struct SnapshotPublisher {
    latest: RwLock<Option<SystemSummary>>,
    sender: broadcast::Sender<SystemSummary>,
}

impl SnapshotPublisher {
    /// `capacity` is the per-subscriber backlog; a subscriber that falls
    /// further behind than this skips ahead to the oldest retained summary.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            latest: RwLock::new(None),
            sender,
        }
    }

    /// Publish a cycle's summary to all current subscribers.
    pub fn publish(&self, summary: SystemSummary) {
        *self.latest.write() = Some(summary.clone());
        // Err means no live subscribers, which is fine.
        let _ = self.sender.send(summary);
    }

    /// The most recently published summary, if any cycle has completed.
    pub fn latest(&self) -> Option<SystemSummary> {
        self.latest.read().clone()
    }

    /// Register a subscriber.
    ///
    /// The stream yields the latest summary immediately (when one exists)
    /// and every summary published afterwards.
    pub fn subscribe(&self) -> SummaryStream {
        // The receiver is created before the latest value is captured so a
        // summary published in between is never lost; it may then arrive
        // both as the pending value and through the channel, which the
        // stream dedupes by timestamp.
        let receiver = self.sender.subscribe();
        SummaryStream {
            pending: self.latest.read().clone(),
            delivered: None,
            receiver,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One subscriber's view of the summary stream.
pub struct SummaryStream {
    pending: Option<SystemSummary>,
    /// Capture time of the immediately-delivered summary, kept until the
    /// first channel delivery to swallow the duplicate from a publish
    /// racing the subscription.
    delivered: Option<chrono::DateTime<chrono::Utc>>,
    receiver: broadcast::Receiver<SystemSummary>,
}

impl SummaryStream {
    /// Next summary, or `None` once the publisher is gone and the backlog
    /// is drained. A lagged subscriber logs the loss and keeps going from
    /// the oldest summary still retained.
    pub async fn recv(&mut self) -> Option<SystemSummary> {
        if let Some(summary) = self.pending.take() {
            self.delivered = Some(summary.timestamp);
            return Some(summary);
        }
        loop {
            match self.receiver.recv().await {
                Ok(summary) => {
                    if self.delivered.take() == Some(summary.timestamp) {
                        continue;
                    }
                    return Some(summary);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "summary subscriber lagging, dropped updates");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

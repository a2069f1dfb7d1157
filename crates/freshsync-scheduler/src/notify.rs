//! Worker notification fan-out
//!
//! A thin broadcast-channel implementation of the
//! [`IJobNotifier`](freshsync_core::ports::IJobNotifier) port. Idle workers
//! subscribe and block on the channel; whenever a job is created or a
//! running job completes, every subscriber receives a
//! [`WorkerSignal::NewJobAvailable`] and retries acquisition.
//!
//! Losing a signal is harmless: a worker that misses one simply acquires on
//! its next poll, and a signal with no listeners is dropped silently.

use tokio::sync::broadcast;
use tracing::debug;

use freshsync_core::ports::IJobNotifier;

/// Signals pushed to connected workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// A job may now be claimable; try acquisition
    NewJobAvailable,
}

/// Broadcast-channel notifier for pull-based workers
#[derive(Debug, Clone)]
pub struct BroadcastJobNotifier {
    tx: broadcast::Sender<WorkerSignal>,
}

impl BroadcastJobNotifier {
    /// Creates a notifier with the given per-subscriber buffer capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes a worker connection to job signals
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerSignal> {
        self.tx.subscribe()
    }

    /// Number of currently subscribed workers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastJobNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

impl IJobNotifier for BroadcastJobNotifier {
    fn notify_jobs_available(&self) {
        match self.tx.send(WorkerSignal::NewJobAvailable) {
            Ok(receivers) => debug!(receivers, "Broadcast job-available signal"),
            Err(_) => debug!("Job-available signal dropped: no workers connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signal() {
        let notifier = BroadcastJobNotifier::new(4);
        let mut rx_a = notifier.subscribe();
        let mut rx_b = notifier.subscribe();

        notifier.notify_jobs_available();

        assert_eq!(rx_a.recv().await.unwrap(), WorkerSignal::NewJobAvailable);
        assert_eq!(rx_b.recv().await.unwrap(), WorkerSignal::NewJobAvailable);
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let notifier = BroadcastJobNotifier::new(4);
        // Must not panic or error
        notifier.notify_jobs_available();
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let notifier = BroadcastJobNotifier::new(4);
        assert_eq!(notifier.subscriber_count(), 0);
        let _rx = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);
    }
}

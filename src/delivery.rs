use crate::message::Encoder;
use crate::queue::BlockingQueue;
use crate::record::LogRecord;
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error};

/// Counters shared by the delivery workers.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Records handed to the transport successfully.
    pub delivered: AtomicU64,
    /// Records the transport rejected. They are not retried.
    pub failed: AtomicU64,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Unbounded queue of pending records drained by a fixed set of workers.
///
/// `push_back` never waits, so it is safe to call from the logging path.
/// Each worker pops one record at a time, encodes it and sends it through
/// the transport. With more than one worker, records may reach the
/// collector out of order.
pub struct DeliveryQueue {
    queue: Arc<BlockingQueue<LogRecord>>,
    stats: Arc<DeliveryStats>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl DeliveryQueue {
    /// Spawn `concurrency` workers (at least one) on the current Tokio
    /// runtime.
    ///
    /// `poll_interval` controls how often [`DeliveryQueue::flush`] checks
    /// whether the queue has drained.
    pub fn start(
        encoder: Arc<Encoder>,
        transport: Arc<dyn Transport>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        let queue = Arc::new(BlockingQueue::new());
        let stats = Arc::new(DeliveryStats::default());

        let workers = (0..concurrency.max(1))
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let stats = Arc::clone(&stats);
                let encoder = Arc::clone(&encoder);
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    while let Some(record) = queue.pop().await {
                        let message = encoder.encode(&record);
                        match transport.send(&message).await {
                            Ok(()) => {
                                stats.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                stats.failed.fetch_add(1, Ordering::Relaxed);
                                error!(worker, transport = transport.name(), error = %e, "failed to deliver log record");
                            }
                        }
                    }
                    debug!(worker, "delivery worker stopped");
                })
            })
            .collect();

        DeliveryQueue {
            queue,
            stats,
            workers: Mutex::new(workers),
            poll_interval,
        }
    }

    pub fn push_back(&self, record: LogRecord) {
        self.queue.push_back(record);
    }

    /// Records waiting for a worker. In-flight sends are not counted.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Wait until no records are waiting.
    ///
    /// This polls the queue depth; sends already picked up by a worker may
    /// still be in flight when it returns.
    pub async fn flush(&self) {
        while !self.queue.is_empty() {
            sleep(self.poll_interval).await;
        }
    }

    /// Stop accepting work and wait for the workers to drain the queue and
    /// exit.
    pub async fn shutdown(&self) {
        self.queue.close();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "delivery worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::WireMessage;
    use crate::noop::NoopTransport;
    use crate::record::Level;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Recording {
        seen: AsyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
            if message.short_message == "reject" {
                return Err(TransportError::Closed);
            }
            self.seen.lock().await.push(message.short_message.clone());
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn encoder() -> Arc<Encoder> {
        Arc::new(Encoder::new("test-host"))
    }

    #[tokio::test]
    async fn single_worker_keeps_dequeue_order() {
        let transport = Arc::new(Recording::default());
        let queue = DeliveryQueue::start(encoder(), transport.clone(), 1, Duration::from_millis(5));

        for i in 0..20 {
            queue.push_back(LogRecord::new(Level::Info, format!("msg-{}", i)));
        }
        timeout(Duration::from_secs(2), queue.shutdown()).await.unwrap();

        let seen = transport.seen.lock().await.clone();
        let expected: Vec<_> = (0..20).map(|i| format!("msg-{}", i)).collect();
        assert_eq!(seen, expected);
        assert_eq!(queue.stats().delivered(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_workers_deliver_everything() {
        let transport = Arc::new(NoopTransport::default());
        let queue = DeliveryQueue::start(encoder(), transport.clone(), 16, Duration::from_millis(5));

        for i in 0..500 {
            queue.push_back(LogRecord::new(Level::Debug, format!("{}", i)));
        }
        timeout(Duration::from_secs(2), queue.flush()).await.unwrap();
        timeout(Duration::from_secs(2), queue.shutdown()).await.unwrap();

        assert_eq!(transport.sent(), 500);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn failures_are_counted_not_retried() {
        let transport = Arc::new(Recording::default());
        let queue = DeliveryQueue::start(encoder(), transport.clone(), 2, Duration::from_millis(5));

        queue.push_back(LogRecord::new(Level::Error, "reject"));
        queue.push_back(LogRecord::new(Level::Error, "accept"));
        timeout(Duration::from_secs(2), queue.shutdown()).await.unwrap();

        assert_eq!(queue.stats().failed(), 1);
        assert_eq!(queue.stats().delivered(), 1);
        assert_eq!(*transport.seen.lock().await, vec!["accept".to_string()]);
    }
}

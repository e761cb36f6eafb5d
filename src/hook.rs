use crate::config::HookConfig;
use crate::delivery::{DeliveryQueue, DeliveryStats};
use crate::message::Encoder;
use crate::record::LogRecord;
use crate::transport::{Transport, TransportError};
use std::sync::Arc;

/// Error type returned by [`GelfHook`].
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("hook is synchronous; records must be sent with `fire`")]
    Synchronous,
}

/// Entry point for instrumentation code: turns records into GELF messages
/// and hands them to a [`Transport`].
///
/// In synchronous mode [`GelfHook::fire`] waits for the transport and
/// returns its result. In asynchronous mode records are queued for a pool
/// of delivery workers; failures are then only visible in the crate's own
/// diagnostics and in [`GelfHook::stats`].
pub struct GelfHook {
    encoder: Arc<Encoder>,
    transport: Arc<dyn Transport>,
    queue: Option<DeliveryQueue>,
}

impl GelfHook {
    /// Build a hook around `transport`.
    ///
    /// In asynchronous mode this spawns the delivery workers, so it must be
    /// called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: HookConfig) -> Self {
        let host = config.host.clone().unwrap_or_else(discover_hostname);
        let encoder = Arc::new(Encoder::new(host).with_extra(config.extra));

        let queue = (!config.synchronous).then(|| {
            DeliveryQueue::start(
                Arc::clone(&encoder),
                Arc::clone(&transport),
                config.concurrency,
                config.flush_poll_interval,
            )
        });

        GelfHook {
            encoder,
            transport,
            queue,
        }
    }

    pub fn host(&self) -> &str {
        self.encoder.host()
    }

    pub fn is_synchronous(&self) -> bool {
        self.queue.is_none()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Deliver one record.
    ///
    /// Synchronous hooks return once the transport finished; asynchronous
    /// hooks return as soon as the record is queued.
    pub async fn fire(&self, record: LogRecord) -> Result<(), HookError> {
        match &self.queue {
            Some(queue) => {
                queue.push_back(record);
                Ok(())
            }
            None => {
                let message = self.encoder.encode(&record);
                self.transport.send(&message).await?;
                Ok(())
            }
        }
    }

    /// Queue a record without awaiting. Only available in asynchronous mode.
    pub fn enqueue(&self, record: LogRecord) -> Result<(), HookError> {
        let queue = self.queue.as_ref().ok_or(HookError::Synchronous)?;
        queue.push_back(record);
        Ok(())
    }

    /// Records waiting for a delivery worker.
    pub fn pending(&self) -> usize {
        self.queue.as_ref().map_or(0, DeliveryQueue::len)
    }

    pub fn stats(&self) -> Option<&DeliveryStats> {
        self.queue.as_ref().map(DeliveryQueue::stats)
    }

    /// Wait until the delivery queue is empty. No-op in synchronous mode.
    pub async fn flush(&self) {
        if let Some(queue) = &self.queue {
            queue.flush().await;
        }
    }

    /// Flush, stop the delivery workers and close the transport.
    pub async fn flush_and_close(&self) -> Result<(), HookError> {
        if let Some(queue) = &self.queue {
            queue.flush().await;
            queue.shutdown().await;
        }
        self.transport.close().await?;
        Ok(())
    }
}

/// Host name reported in messages: `HOSTNAME`, then `/etc/hostname`,
/// then `localhost`.
pub fn discover_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::WireMessage;
    use crate::noop::NoopTransport;
    use crate::record::Level;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{timeout, Duration};

    struct Failing {
        closed: AtomicBool,
    }

    #[async_trait]
    impl Transport for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn send(&self, _message: &WireMessage) -> Result<(), TransportError> {
            Err(TransportError::TooManyChunks { needed: 300 })
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(synchronous: bool) -> HookConfig {
        HookConfig {
            synchronous,
            concurrency: 4,
            host: Some("unit-test".to_string()),
            flush_poll_interval: Duration::from_millis(5),
            ..HookConfig::default()
        }
    }

    #[tokio::test]
    async fn synchronous_fire_surfaces_transport_errors() {
        let transport = Arc::new(Failing {
            closed: AtomicBool::new(false),
        });
        let hook = GelfHook::new(transport.clone(), config(true));

        let err = hook.fire(LogRecord::new(Level::Error, "x")).await.unwrap_err();
        assert!(matches!(
            err,
            HookError::Transport(TransportError::TooManyChunks { .. })
        ));
        assert!(matches!(
            hook.enqueue(LogRecord::new(Level::Error, "x")),
            Err(HookError::Synchronous)
        ));

        hook.flush_and_close().await.unwrap();
        assert!(transport.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn asynchronous_fire_hides_transport_errors() {
        let transport = Arc::new(Failing {
            closed: AtomicBool::new(false),
        });
        let hook = GelfHook::new(transport, config(false));

        hook.fire(LogRecord::new(Level::Error, "x")).await.unwrap();
        timeout(Duration::from_secs(2), hook.flush_and_close()).await.unwrap().unwrap();
        assert_eq!(hook.stats().map(DeliveryStats::failed), Some(1));
    }

    #[tokio::test]
    async fn flush_and_close_delivers_queued_records() {
        let transport = Arc::new(NoopTransport::default());
        let hook = GelfHook::new(transport.clone(), config(false));
        assert_eq!(hook.host(), "unit-test");
        assert!(!hook.is_synchronous());

        for i in 0..50 {
            hook.enqueue(LogRecord::new(Level::Info, format!("{}", i))).unwrap();
        }
        timeout(Duration::from_secs(2), hook.flush_and_close()).await.unwrap().unwrap();

        assert_eq!(hook.pending(), 0);
        assert_eq!(transport.sent(), 50);
    }

    #[test]
    fn hostname_is_never_empty() {
        assert!(!discover_hostname().is_empty());
    }
}

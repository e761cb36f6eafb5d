use crate::queue::BlockingQueue;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Creates the objects handed out by an [`ObjectPool`].
#[async_trait]
pub trait PoolFactory: Send + Sync {
    type Object: Send;

    async fn create(&self) -> Result<Self::Object, TransportError>;
}

enum Slot<T> {
    Idle(T),
    /// A discarded object's place, to be refilled by the next taker.
    Vacant,
}

/// Pool that keeps at most `capacity` objects alive.
///
/// Objects are created lazily. Once `capacity` objects exist, `get` waits
/// until another caller releases or discards the [`Pooled`] it holds.
pub struct ObjectPool<F: PoolFactory> {
    factory: F,
    capacity: usize,
    created: Mutex<usize>,
    idle: BlockingQueue<Slot<F::Object>>,
    retry_interval: Duration,
}

impl<F: PoolFactory> ObjectPool<F> {
    pub fn new(factory: F, capacity: usize) -> Self {
        ObjectPool {
            factory,
            capacity: capacity.max(1),
            created: Mutex::new(0),
            idle: BlockingQueue::new(),
            retry_interval: Duration::from_secs(1),
        }
    }

    /// Delay between attempts when the factory fails.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots claimed so far (live or vacant).
    pub fn created(&self) -> usize {
        *self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Take an object, creating one if the pool has room.
    ///
    /// Factory failures are logged and retried until one succeeds. If this
    /// future is dropped before it resolves, the claimed slot is handed back
    /// to the pool.
    pub async fn get(&self) -> Pooled<'_, F> {
        let claimed = {
            let mut created = self.created.lock().unwrap_or_else(PoisonError::into_inner);
            if *created < self.capacity {
                *created += 1;
                true
            } else {
                false
            }
        };

        if !claimed {
            if let Some(Slot::Idle(object)) = self.idle.pop().await {
                return Pooled {
                    pool: self,
                    object: Some(object),
                    keep: false,
                };
            }
        }

        // The slot is ours from here on; an empty guard dropped mid-creation
        // leaves it vacant for the next taker.
        let mut pooled = Pooled {
            pool: self,
            object: None,
            keep: false,
        };
        pooled.object = Some(self.create().await);
        pooled
    }

    async fn create(&self) -> F::Object {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.factory.create().await {
                Ok(object) => return object,
                Err(e) => {
                    warn!(error = %e, attempt, "failed to create pooled object, retrying");
                    sleep(self.retry_interval).await;
                }
            }
        }
    }
}

/// An object checked out of an [`ObjectPool`].
///
/// Call [`Pooled::release`] to hand a healthy object back. Dropping the
/// guard any other way, including through [`Pooled::discard`] or a
/// cancelled caller, drops the object and frees its slot so the next
/// `get` creates a replacement.
pub struct Pooled<'a, F: PoolFactory> {
    pool: &'a ObjectPool<F>,
    object: Option<F::Object>,
    keep: bool,
}

impl<F: PoolFactory> Pooled<'_, F> {
    /// Return the object to the idle set.
    pub fn release(mut self) {
        self.keep = true;
    }

    /// Drop a broken object; its slot goes to the next `get`.
    pub fn discard(self) {}
}

impl<F: PoolFactory> Deref for Pooled<'_, F> {
    type Target = F::Object;

    fn deref(&self) -> &F::Object {
        match &self.object {
            Some(object) => object,
            // Only empty while `get` is still creating the object.
            None => unreachable!("pooled object accessed before creation"),
        }
    }
}

impl<F: PoolFactory> DerefMut for Pooled<'_, F> {
    fn deref_mut(&mut self) -> &mut F::Object {
        match &mut self.object {
            Some(object) => object,
            None => unreachable!("pooled object accessed before creation"),
        }
    }
}

impl<F: PoolFactory> Drop for Pooled<'_, F> {
    fn drop(&mut self) {
        let slot = match self.object.take() {
            Some(object) if self.keep => Slot::Idle(object),
            _ => Slot::Vacant,
        };
        self.pool.idle.push_back(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Counter {
        made: AtomicUsize,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl PoolFactory for Arc<Counter> {
        type Object = usize;

        async fn create(&self) -> Result<usize, TransportError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Closed);
            }
            Ok(self.made.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn extra_taker_waits_for_a_release() {
        let counter = Arc::new(Counter::default());
        let pool = Arc::new(ObjectPool::new(Arc::clone(&counter), 2));

        let first = pool.get().await;
        let first_value = *first;
        let _second = pool.get().await;

        let third = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let object = pool.get().await;
                let value = *object;
                object.release();
                value
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!third.is_finished());
        assert_eq!(counter.made.load(Ordering::SeqCst), 2);

        first.release();
        let reused = timeout(Duration::from_secs(1), third).await.unwrap().unwrap();
        assert_eq!(reused, first_value);
        assert_eq!(counter.made.load(Ordering::SeqCst), 2);
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn discard_lets_the_next_taker_create_a_replacement() {
        let counter = Arc::new(Counter::default());
        let pool = ObjectPool::new(Arc::clone(&counter), 1);

        let broken = pool.get().await;
        let broken_value = *broken;
        broken.discard();
        let fresh = timeout(Duration::from_secs(1), pool.get()).await.unwrap();

        assert_ne!(*fresh, broken_value);
        assert_eq!(counter.made.load(Ordering::SeqCst), 2);
        assert_eq!(pool.created(), 1);
    }

    struct Slow;

    #[async_trait]
    impl PoolFactory for Slow {
        type Object = ();

        async fn create(&self) -> Result<(), TransportError> {
            sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancelled_taker_gives_its_slot_back() {
        let pool = ObjectPool::new(Slow, 1);

        assert!(timeout(Duration::from_millis(50), pool.get()).await.is_err());
        assert_eq!(pool.created(), 1);

        let next = timeout(Duration::from_secs(2), pool.get()).await;
        assert!(next.is_ok(), "slot of the cancelled taker was leaked");
    }

    #[tokio::test]
    async fn dropped_guard_frees_its_slot() {
        let counter = Arc::new(Counter::default());
        let pool = ObjectPool::new(Arc::clone(&counter), 1);

        drop(pool.get().await);
        let replacement = timeout(Duration::from_secs(1), pool.get()).await.unwrap();
        assert_eq!(*replacement, 1);
    }

    #[tokio::test]
    async fn factory_failures_are_retried() {
        let counter = Arc::new(Counter::default());
        counter.failures_left.store(2, Ordering::SeqCst);
        let pool = ObjectPool::new(Arc::clone(&counter), 1)
            .with_retry_interval(Duration::from_millis(5));

        let object = timeout(Duration::from_secs(1), pool.get()).await.unwrap();
        assert_eq!(*object, 0);
        assert_eq!(counter.failures_left.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let pool = ObjectPool::new(Arc::new(Counter::default()), 0);
        assert_eq!(pool.capacity(), 1);
    }
}

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

/// Unbounded FIFO with an async blocking pop.
///
/// Every push adds exactly one permit to the wake-up semaphore, so each
/// pushed item releases exactly one waiting popper. Pushing never awaits and
/// can be done from synchronous code.
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Semaphore,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        BlockingQueue {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_back(&self, item: T) {
        self.items().push_back(item);
        self.available.add_permits(1);
    }

    /// Wait for the front item and remove it.
    ///
    /// Returns `None` only once the queue has been closed and drained.
    pub async fn pop(&self) -> Option<T> {
        match self.available.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.items().pop_front()
            }
            // Closed: hand out what is left without waiting.
            Err(_) => self.items().pop_front(),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        match self.available.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.items().pop_front()
            }
            Err(_) if self.available.is_closed() => self.items().pop_front(),
            Err(_) => None,
        }
    }

    /// Wake every waiting popper. Items still queued remain poppable.
    pub fn close(&self) {
        self.available.close();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

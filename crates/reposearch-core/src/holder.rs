//! Readiness gate for the process-wide indexer instance.
//!
//! Index population can finish after request handling has started. The
//! holder lets readers block until the first instance is installed; from
//! then on a reader always gets an instance.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

/// One shared indexer, installed once and readable by many callers.
pub struct IndexerHolder<T: ?Sized> {
    slot: Mutex<Option<Arc<T>>>,
    ready: Condvar,
    notify: Notify,
}

impl<T: ?Sized> IndexerHolder<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install an indexer and wake every waiting reader.
    ///
    /// `None` never clears an installed instance.
    pub fn set(&self, indexer: Option<Arc<T>>) {
        let Some(indexer) = indexer else {
            debug!("Ignoring empty indexer installation");
            return;
        };
        *self.lock() = Some(indexer);
        self.ready.notify_all();
        self.notify.notify_waiters();
    }

    /// The installed indexer, without waiting.
    pub fn try_get(&self) -> Option<Arc<T>> {
        self.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_some()
    }

    /// Block the current thread until an indexer is installed.
    pub fn get(&self) -> Arc<T> {
        let mut slot = self.lock();
        loop {
            if let Some(indexer) = slot.as_ref() {
                return indexer.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`get`](Self::get), giving up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Arc<T>> {
        let slot = self.lock();
        let (slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    /// Wait asynchronously until an indexer is installed.
    pub async fn wait(&self) -> Arc<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `set` is not missed.
            notified.as_mut().enable();
            if let Some(indexer) = self.try_get() {
                return indexer;
            }
            notified.await;
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<Arc<T>> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl<T: ?Sized> Default for IndexerHolder<T> {
    fn default() -> Self {
        Self::new()
    }
}

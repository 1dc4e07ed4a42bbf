//! [`ScopeSlot`]: the cached, resolved secrets of one scope (the host, or one
//! function).
//!
//! A slot is either empty or holds a fully loaded value. Reads of a loaded
//! value go through `arc-swap` and never block. The empty→loaded transition
//! and invalidation both take the slot's load lock, so concurrent misses on the
//! same scope collapse into a single load while different scopes load in
//! parallel.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use common::SecretsError;
use tokio::sync::Mutex;

pub struct ScopeSlot<T> {
    value: ArcSwapOption<T>,
    load_lock: Mutex<()>,
}

impl<T> ScopeSlot<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new, empty slot.
    pub fn new() -> Self {
        Self {
            value: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
        }
    }

    /// The cached value, if loaded. Lock-free.
    pub fn cached(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.value.load().is_some()
    }

    /// Return the cached value, or run `load` and cache its result.
    ///
    /// The load runs on its own task while holding the slot's load lock: a
    /// caller that drops this future does not abort a load in progress, and
    /// later callers find the slot populated. A failed load leaves the slot
    /// empty.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `load`.
    pub async fn get_or_load<F, Fut>(self: &Arc<Self>, load: F) -> Result<Arc<T>, SecretsError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SecretsError>> + Send + 'static,
    {
        if let Some(value) = self.cached() {
            return Ok(value);
        }

        let slot = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = slot.load_lock.lock().await;
            if let Some(value) = slot.cached() {
                return Ok(value);
            }
            let value = Arc::new(load().await?);
            slot.value.store(Some(Arc::clone(&value)));
            Ok(value)
        });

        task.await
            .map_err(|e| SecretsError::Internal(format!("secrets load task failed: {e}")))?
    }

    /// Drop the cached value; the next access reloads. Waits for an in-flight
    /// load to finish first.
    pub async fn invalidate(&self) {
        let _guard = self.load_lock.lock().await;
        self.value.store(None);
    }
}

impl<T> Default for ScopeSlot<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

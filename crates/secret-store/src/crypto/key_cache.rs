//! [`KeyCache`]: decoded key material keyed by key id.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::key::CryptographicKey;

/// Thread-safe cache of decoded keys, keyed by key id.
///
/// Constructed once when the resolver is built and owned by it for the life
/// of the store; dropping it zeroes every cached key. Lookups hand out clones,
/// so callers never hold a reference into the cache.
#[derive(Debug, Default)]
pub struct KeyCache {
    inner: RwLock<HashMap<String, CryptographicKey>>,
}

impl KeyCache {
    /// Create a new, empty [`KeyCache`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the key cached under `slot`, if any.
    pub fn get(&self, slot: &str) -> Option<CryptographicKey> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot)
            .cloned()
    }

    /// Return the key cached under `slot`, or run `resolve` and cache its
    /// result. Neither `Ok(None)` nor an error is cached, so a key that shows
    /// up or gets fixed later is still picked up.
    ///
    /// When two callers race on the same slot the first insert wins and both
    /// see identical bytes.
    pub fn get_or_resolve<F, E>(&self, slot: &str, resolve: F) -> Result<Option<CryptographicKey>, E>
    where
        F: FnOnce() -> Result<Option<CryptographicKey>, E>,
    {
        if let Some(key) = self.get(slot) {
            return Ok(Some(key));
        }
        let Some(key) = resolve()? else {
            return Ok(None);
        };
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(map.entry(slot.to_owned()).or_insert(key).clone()))
    }

    /// Drop every cached key.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(fill: u8) -> Result<Option<CryptographicKey>, ()> {
        Ok(Some(CryptographicKey::new("k", &[fill; 16])))
    }

    #[test]
    fn initially_empty() {
        let cache = KeyCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn caches_resolved_key() {
        let cache = KeyCache::new();
        let first = cache.get_or_resolve("k", || found(1)).unwrap();
        assert!(first.is_some());
        let second = cache.get_or_resolve("k", || found(2)).unwrap();
        assert_eq!(second.unwrap().bytes(), &[1; 16]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn misses_are_not_cached() {
        let cache = KeyCache::new();
        assert!(cache.get_or_resolve("k", || Ok::<_, ()>(None)).unwrap().is_none());
        assert!(cache.is_empty());
        assert!(cache.get_or_resolve("k", || found(3)).unwrap().is_some());
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = KeyCache::new();
        assert!(cache.get_or_resolve("k", || Err("bad material")).is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_resolve("k", || found(4)).unwrap().is_some());
    }

    #[test]
    fn clear_drops_keys() {
        let cache = KeyCache::new();
        cache.get_or_resolve("k", || found(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}

//! Expiring key-value cache for API key validation results

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries above this count trigger a sweep of expired values on insert.
const SWEEP_THRESHOLD: usize = 4096;

/// A small in-process cache with per-entry time-to-live.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl TtlCache {
    pub fn new() -> Self {
        TtlCache::default()
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= SWEEP_THRESHOLD {
            let now = Instant::now();
            entries.retain(|_, (_, expires)| *expires > now);
        }
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_overwrite_refreshes_value() {
        let cache = TtlCache::new();
        cache.set("k", "old".to_string(), Duration::from_secs(60));
        cache.set("k", "new".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("new".to_string()));
    }
}

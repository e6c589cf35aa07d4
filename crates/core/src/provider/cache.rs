//! In-memory result caches with rolling or fixed expiry.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::metrics::CACHE_LOOKUPS;

/// How an entry's expiry behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Each read pushes the expiry out by the window again.
    Rolling(Duration),
    /// Entry expires at insertion time + window, regardless of reads.
    Fixed(Duration),
}

impl Expiry {
    fn window(&self) -> Duration {
        match self {
            Expiry::Rolling(d) | Expiry::Fixed(d) => *d,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// A string-keyed cache owned by a single provider instance.
pub struct ExpiringCache<V> {
    name: &'static str,
    expiry: Expiry,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(name: &'static str, expiry: Expiry) -> Self {
        Self {
            name,
            expiry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let hit = match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                if let Expiry::Rolling(window) = self.expiry {
                    entry.expires_at = now + window;
                }
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };

        let result = if hit.is_some() { "hit" } else { "miss" };
        CACHE_LOOKUPS.with_label_values(&[self.name, result]).inc();
        debug!("cache {} {} for '{}'", self.name, result, key);
        hit
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.expiry.window(),
            },
        );
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).map(|e| e.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, including ones that expired but were not yet purged.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize a free-text query: lowercase, trimmed, inner whitespace collapsed.
pub fn text_key(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize an ISBN: hyphens and whitespace stripped, check digit uppercased.
pub fn isbn_key(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Normalize an ASIN: trimmed and uppercased.
pub fn asin_key(asin: &str) -> String {
    asin.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_fixed_expiry_ignores_reads() {
        let cache = ExpiringCache::new("test", Expiry::Fixed(DAY * 7));
        cache.insert("dune", 1u32);

        tokio::time::advance(DAY * 6).await;
        assert_eq!(cache.get("dune"), Some(1));

        tokio::time::advance(DAY * 2).await;
        assert_eq!(cache.get("dune"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rolling_expiry_extends_on_read() {
        let cache = ExpiringCache::new("test", Expiry::Rolling(DAY * 90));
        cache.insert("OL1A", "author".to_string());

        // Read every 60 days: the entry keeps living past the original 90 days.
        for _ in 0..4 {
            tokio::time::advance(DAY * 60).await;
            assert_eq!(cache.get("OL1A").as_deref(), Some("author"));
        }

        tokio::time::advance(DAY * 91).await;
        assert_eq!(cache.get("OL1A"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ExpiringCache::new("test", Expiry::Fixed(Duration::from_secs(10)));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("b", 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let cache = ExpiringCache::new("test", Expiry::Fixed(DAY));
        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove("k"), Some(2));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_text_key_normalization() {
        assert_eq!(text_key("  The   Left Hand\tof Darkness "), "the left hand of darkness");
        assert_eq!(text_key("DUNE"), text_key("dune"));
    }

    #[test]
    fn test_isbn_key_normalization() {
        assert_eq!(isbn_key("978-0-441-17271-9"), "9780441172719");
        assert_eq!(isbn_key("0 441 17271 x"), "044117271X");
    }

    #[test]
    fn test_asin_key_normalization() {
        assert_eq!(asin_key(" b000fc0pdu "), "B000FC0PDU");
    }
}

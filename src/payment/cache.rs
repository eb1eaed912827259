//! Short-lived cache of unpaid confirmation links.
//!
//! Repeated "top up" taps inside an hour reuse the same invoice instead of
//! creating a fresh YooKassa payment every time the keyboard is opened.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::data::models::ProductOption;

/// How long a cached confirmation link stays reusable.
pub const INVOICE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct CachedInvoice {
    pub external_invoice_id: String,
    pub confirmation_url: String,
    created_at: Instant,
    ttl: Duration,
}

impl CachedInvoice {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

#[derive(Clone, Default)]
pub struct InvoiceCache {
    entries: Arc<DashMap<(i64, ProductOption), CachedInvoice>>,
}

impl InvoiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i64, option: ProductOption) -> Option<CachedInvoice> {
        let key = (user_id, option);
        let expired = match self.entries.get(&key) {
            Some(entry) => {
                if entry.is_expired() {
                    true
                } else {
                    debug!(user_id, option = option.as_str(), "invoice cache hit");
                    return Some(entry.clone());
                }
            }
            None => {
                debug!(user_id, option = option.as_str(), "invoice cache miss");
                return None;
            }
        };
        // The shard guard is dropped before removal.
        if expired {
            self.entries.remove(&key);
            debug!(user_id, option = option.as_str(), "invoice cache entry expired");
        }
        None
    }

    pub fn set(
        &self,
        user_id: i64,
        option: ProductOption,
        external_invoice_id: String,
        confirmation_url: String,
        ttl: Duration,
    ) {
        self.entries.insert(
            (user_id, option),
            CachedInvoice {
                external_invoice_id,
                confirmation_url,
                created_at: Instant::now(),
                ttl,
            },
        );
        debug!(user_id, option = option.as_str(), "invoice cached");
    }

    pub fn invalidate(&self, user_id: i64, option: ProductOption) {
        if self.entries.remove(&(user_id, option)).is_some() {
            debug!(user_id, option = option.as_str(), "invoice cache invalidated");
        }
    }

    /// Drop expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, invoice| !invoice.is_expired());
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_miss_and_evict() {
        let cache = InvoiceCache::new();
        cache.set(
            1,
            ProductOption::Single,
            "inv-1".into(),
            "https://pay.example/1".into(),
            Duration::ZERO,
        );
        assert!(cache.get(1, ProductOption::Single).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn live_entries_hit_per_option() {
        let cache = InvoiceCache::new();
        cache.set(
            1,
            ProductOption::Single,
            "inv-1".into(),
            "https://pay.example/1".into(),
            INVOICE_TTL,
        );
        let hit = cache.get(1, ProductOption::Single).expect("hit");
        assert_eq!(hit.confirmation_url, "https://pay.example/1");
        assert!(cache.get(1, ProductOption::Packet).is_none());
        assert!(cache.get(2, ProductOption::Single).is_none());
    }

    #[test]
    fn cleanup_counts_only_expired() {
        let cache = InvoiceCache::new();
        cache.set(
            1,
            ProductOption::Single,
            "inv-1".into(),
            "https://pay.example/1".into(),
            Duration::ZERO,
        );
        cache.set(
            2,
            ProductOption::Packet,
            "inv-2".into(),
            "https://pay.example/2".into(),
            INVOICE_TTL,
        );
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_clears_the_exact_key() {
        let cache = InvoiceCache::new();
        cache.set(
            1,
            ProductOption::Single,
            "inv-1".into(),
            "https://pay.example/1".into(),
            INVOICE_TTL,
        );
        cache.invalidate(1, ProductOption::Single);
        assert!(cache.get(1, ProductOption::Single).is_none());
    }
}

use serde::{Deserialize, Serialize};

/// One cached query result with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Absolute expiry in ms since the epoch. `None` lives until cleared.
    pub expiry: Option<i64>,
    /// Creation time in ms since the epoch.
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now_ms: i64, ttl_ms: Option<i64>) -> Self {
        Self {
            data,
            expiry: ttl_ms.map(|ttl| now_ms.saturating_add(ttl)),
            timestamp: now_ms,
        }
    }

    /// Expired entries are logically absent, even before they are purged.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry.is_some_and(|expiry| now_ms > expiry)
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.timestamp).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = CacheEntry::new("x", 1_000, None);
        assert_eq!(entry.expiry, None);
        assert!(!entry.is_expired(i64::MAX));
    }

    #[test]
    fn test_entry_expires_strictly_after_deadline() {
        let entry = CacheEntry::new("x", 1_000, Some(500));
        assert_eq!(entry.expiry, Some(1_500));
        assert!(!entry.is_expired(1_499));
        assert!(!entry.is_expired(1_500));
        assert!(entry.is_expired(1_501));
    }

    #[test]
    fn test_age_handles_clock_skew() {
        let entry = CacheEntry::new(1, 2_000, None);
        assert_eq!(entry.age_ms(2_500), 500);
        assert_eq!(entry.age_ms(1_000), 0);
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = CacheEntry::new(vec![1, 2], 10, Some(5));
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"data":[1,2],"expiry":15,"timestamp":10}"#);
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::key::{cache_key, in_namespace, namespace_key, Params};
use super::storage::{SessionStorage, StorageError};
use crate::clock::{Clock, SystemClock};

/// Prefix reserved for cache keys in the shared session store.
pub const DEFAULT_CACHE_PREFIX: &str = "rollcall_cache_";

/// Entry counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub storage_entries: usize,
}

/// Two-tier cache in front of backend queries.
///
/// The memory tier is always read first. The persistent tier is optional:
/// without one, or when it refuses a write, the cache keeps working from
/// memory alone. No operation ever surfaces an error to the caller; the worst
/// a storage failure can cause is an extra backend round-trip.
pub struct SessionCache<S> {
    prefix: String,
    memory: HashMap<String, CacheEntry<Value>>,
    storage: Option<S>,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStorage> SessionCache<S> {
    /// Create a cache over `storage` and purge anything already expired.
    pub fn new(storage: Option<S>) -> Self {
        Self::with_clock(storage, DEFAULT_CACHE_PREFIX, Arc::new(SystemClock))
    }

    /// Cache without a persistent tier.
    pub fn memory_only() -> Self {
        Self::new(None)
    }

    pub fn with_clock(storage: Option<S>, prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let mut cache = Self {
            prefix: prefix.into(),
            memory: HashMap::new(),
            storage,
            clock,
        };
        cache.cleanup();
        cache
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn storage(&self) -> Option<&S> {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> Option<&mut S> {
        self.storage.as_mut()
    }

    /// Drop the memory tier and hand back the persistent one.
    pub fn into_storage(self) -> Option<S> {
        self.storage
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    // ===== Reads =====

    pub fn get<T: DeserializeOwned>(&mut self, namespace: &str, params: &Params) -> Option<T> {
        let key = cache_key(&self.prefix, namespace, params);
        let now = self.now();

        if let Some(entry) = self.memory.get(&key) {
            if entry.is_expired(now) {
                debug!(key = %key, "Memory entry expired");
                self.memory.remove(&key);
                self.forget_stored(&key);
                return None;
            }
            let decoded = serde_json::from_value::<T>(entry.data.clone());
            return match decoded {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached payload has unexpected shape, dropping");
                    self.memory.remove(&key);
                    self.forget_stored(&key);
                    None
                }
            };
        }

        let entry = self.load_stored(&key)?;
        if entry.is_expired(now) {
            debug!(key = %key, "Stored entry expired");
            self.forget_stored(&key);
            return None;
        }

        let decoded = serde_json::from_value::<T>(entry.data.clone());
        match decoded {
            Ok(data) => {
                self.memory.insert(key, entry);
                Some(data)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Stored payload has unexpected shape, dropping");
                self.forget_stored(&key);
                None
            }
        }
    }

    /// Read a raw entry from the persistent tier. Corrupt entries are removed.
    fn load_stored(&mut self, key: &str) -> Option<CacheEntry<Value>> {
        let storage = self.storage.as_ref()?;
        let raw = match storage.get_item(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Session storage read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt session storage entry, dropping");
                self.forget_stored(key);
                None
            }
        }
    }

    fn forget_stored(&mut self, key: &str) {
        if let Some(storage) = self.storage.as_mut() {
            if let Err(e) = storage.remove_item(key) {
                warn!(key = %key, error = %e, "Session storage remove failed");
            }
        }
    }

    // ===== Writes =====

    /// Cache `data` for `namespace` + `params`.
    ///
    /// `None` or a zero `ttl` keeps the entry until it is removed or the
    /// session ends.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        namespace: &str,
        data: &T,
        params: &Params,
        ttl: Option<Duration>,
    ) {
        let key = cache_key(&self.prefix, namespace, params);
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache payload");
                // The previous value is no longer the latest one
                self.memory.remove(&key);
                self.forget_stored(&key);
                return;
            }
        };

        let ttl_ms = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let entry = CacheEntry::new(value, self.now(), ttl_ms);

        let persisted = match self.try_persist(&key, &entry) {
            Ok(()) => Ok(()),
            Err(e) if e.is_quota_exceeded() => {
                debug!(key = %key, error = %e, "Session storage full, cleaning up and retrying");
                self.cleanup();
                self.try_persist(&key, &entry)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = persisted {
            warn!(key = %key, error = %e, "Entry kept in memory only");
            // An older stored value must not resurface after a restart
            self.forget_stored(&key);
        }

        self.memory.insert(key, entry);
    }

    /// Write one entry to the persistent tier. A missing tier is a no-op.
    fn try_persist(&mut self, key: &str, entry: &CacheEntry<Value>) -> Result<(), StorageError> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(());
        };
        let raw = serde_json::to_string(entry)?;
        storage.set_item(key, &raw)
    }

    // ===== Invalidation =====

    pub fn remove(&mut self, namespace: &str, params: &Params) {
        let key = cache_key(&self.prefix, namespace, params);
        self.memory.remove(&key);
        self.forget_stored(&key);
    }

    /// Remove every entry of `namespace`, whatever its params.
    pub fn clear_namespace(&mut self, namespace: &str) {
        let ns_key = namespace_key(&self.prefix, namespace);
        self.memory.retain(|key, _| !in_namespace(key, &ns_key));
        self.remove_stored_where(|key| in_namespace(key, &ns_key));
        debug!(namespace = namespace, "Cleared cache namespace");
    }

    /// Remove every cache entry. Foreign keys in the session store are kept.
    pub fn clear(&mut self) {
        self.memory.clear();
        let prefix = self.prefix.clone();
        self.remove_stored_where(|key| key.starts_with(&prefix));
        debug!("Cleared cache");
    }

    fn stored_keys(&self) -> Vec<String> {
        let Some(storage) = self.storage.as_ref() else {
            return Vec::new();
        };
        match storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| key.starts_with(&self.prefix))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list session storage keys");
                Vec::new()
            }
        }
    }

    fn remove_stored_where(&mut self, matches: impl Fn(&str) -> bool) {
        for key in self.stored_keys() {
            if matches(&key) {
                self.forget_stored(&key);
            }
        }
    }

    /// Purge expired entries from both tiers, and unreadable ones from storage.
    /// Returns how many stored entries were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.now();
        self.memory.retain(|_, entry| !entry.is_expired(now));

        let mut purged = 0usize;
        for key in self.stored_keys() {
            let Some(storage) = self.storage.as_ref() else {
                break;
            };
            let keep = match storage.get_item(&key) {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry<Value>>(&raw)
                    .map(|entry| !entry.is_expired(now))
                    .unwrap_or(false),
                Ok(None) => true,
                Err(e) => {
                    warn!(key = %key, error = %e, "Session storage read failed during cleanup");
                    true
                }
            };
            if !keep {
                self.forget_stored(&key);
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(purged = purged, "Purged stale session storage entries");
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len(),
            storage_entries: self.stored_keys().len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStorage;
    use crate::clock::ManualClock;
    use serde::Deserialize;
    use serde_json::json;

    const START: i64 = 1_700_000_000_000;

    fn cache_with(storage: Option<MemoryStorage>) -> (SessionCache<MemoryStorage>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let cache = SessionCache::with_clock(storage, DEFAULT_CACHE_PREFIX, clock.clone());
        (cache, clock)
    }

    fn date(d: &str) -> Params {
        Params::new().with("date", d)
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        cache.set("today_status", &json!({"has_arrival": true}), &Params::new(), None);

        let got: Option<Value> = cache.get("today_status", &Params::new());
        assert_eq!(got, Some(json!({"has_arrival": true})));
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        let forward = Params::new().with("date", "2024-01-01").with("a", "b");
        let backward = Params::new().with("a", "b").with("date", "2024-01-01");

        cache.set("employees", &vec![1, 2, 3], &forward, None);
        assert_eq!(cache.get::<Vec<i32>>("employees", &backward), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_expiry_boundary() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        cache.set("employees", &"list", &date("2024-03-01"), Some(Duration::from_millis(1_000)));

        clock.advance_ms(999);
        assert_eq!(cache.get::<String>("employees", &date("2024-03-01")).as_deref(), Some("list"));

        clock.advance_ms(2);
        assert_eq!(cache.get::<String>("employees", &date("2024-03-01")), None);
        // Purged from both tiers on access
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_employees_scenario_expires_after_five_minutes() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        let list = json!({"list": [{"id": 1, "name": "Anna"}, {"id": 2, "name": "Boris"}]});
        let params = date("2024-03-01");

        cache.set("employees", &list, &params, Some(Duration::from_millis(300_000)));
        assert_eq!(cache.get::<Value>("employees", &params), Some(list));

        clock.advance_ms(301_000);
        assert_eq!(cache.get::<Value>("employees", &params), None);
    }

    #[test]
    fn test_expired_stored_entry_is_not_promoted() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        cache.set("employees", &1, &date("d"), Some(Duration::from_millis(10)));

        // Restart with the session store intact, then let the entry lapse
        let storage = cache.into_storage();
        let mut cache = SessionCache::with_clock(storage, DEFAULT_CACHE_PREFIX, clock.clone());
        clock.advance_ms(11);
        assert_eq!(cache.get::<i32>("employees", &date("d")), None);
        assert!(cache.storage().unwrap().is_empty());
    }

    #[test]
    fn test_no_ttl_lives_until_removed() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        cache.set("address", &"Red Square", &Params::new().with("lat", 55.75), None);

        clock.advance_ms(365 * 24 * 60 * 60 * 1_000);
        assert_eq!(
            cache.get::<String>("address", &Params::new().with("lat", 55.75)).as_deref(),
            Some("Red Square")
        );

        cache.remove("address", &Params::new().with("lat", 55.75));
        assert_eq!(cache.get::<String>("address", &Params::new().with("lat", 55.75)), None);
    }

    #[test]
    fn test_zero_ttl_means_session_long() {
        let (mut cache, clock) = cache_with(None);
        cache.set("n", &1, &Params::new(), Some(Duration::ZERO));
        clock.advance_ms(60_000);
        assert_eq!(cache.get::<i32>("n", &Params::new()), Some(1));
    }

    #[test]
    fn test_tier_promotion_after_restart() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        cache.set("record_detail", &"A", &Params::new().with("id", 5i64), Some(Duration::from_secs(600)));

        let storage = cache.into_storage();
        let mut cache = SessionCache::with_clock(storage, DEFAULT_CACHE_PREFIX, clock);
        assert_eq!(cache.stats().memory_entries, 0);

        let id = Params::new().with("id", 5i64);
        assert_eq!(cache.get::<String>("record_detail", &id).as_deref(), Some("A"));
        assert_eq!(cache.stats().memory_entries, 1);

        // Pull the entry out from under the persistent tier: the next read
        // must be served from memory.
        let key = cache_key(DEFAULT_CACHE_PREFIX, "record_detail", &id);
        cache.storage_mut().unwrap().remove_item(&key).unwrap();
        assert_eq!(cache.get::<String>("record_detail", &id).as_deref(), Some("A"));
    }

    #[test]
    fn test_clear_namespace_respects_boundary() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        cache.set("employee", &1, &Params::new(), None);
        cache.set("employee", &2, &date("2024-03-01"), None);
        cache.set("employeeX", &3, &Params::new(), None);
        cache.set("employee_detail", &4, &date("2024-03-01"), None);

        cache.clear_namespace("employee");

        assert_eq!(cache.get::<i32>("employee", &Params::new()), None);
        assert_eq!(cache.get::<i32>("employee", &date("2024-03-01")), None);
        assert_eq!(cache.get::<i32>("employeeX", &Params::new()), Some(3));
        assert_eq!(cache.get::<i32>("employee_detail", &date("2024-03-01")), Some(4));
        assert_eq!(cache.stats().storage_entries, 2);
    }

    #[test]
    fn test_clear_namespace_reaches_persistent_tier() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        cache.set("employees", &1, &date("a"), None);
        cache.set("employees", &2, &date("b"), None);

        // New process: entries only exist in storage
        let storage = cache.into_storage();
        let mut cache = SessionCache::with_clock(storage, DEFAULT_CACHE_PREFIX, clock);
        cache.clear_namespace("employees");
        assert_eq!(cache.get::<i32>("employees", &date("a")), None);
        assert_eq!(cache.get::<i32>("employees", &date("b")), None);
    }

    #[test]
    fn test_record_detail_with_and_without_params_are_independent() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        let ttl = Some(Duration::from_millis(600_000));
        let with_id = Params::new().with("id", 5i64);

        cache.set("recordDetail", &json!({"record": "A"}), &Params::new(), ttl);
        cache.set("recordDetail", &json!({"record": "B"}), &with_id, ttl);

        cache.remove("recordDetail", &Params::new());
        assert_eq!(cache.get::<Value>("recordDetail", &Params::new()), None);
        assert_eq!(cache.get::<Value>("recordDetail", &with_id), Some(json!({"record": "B"})));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        cache.remove("nothing", &Params::new());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_clear_keeps_foreign_keys() {
        let mut storage = MemoryStorage::new();
        storage.set_item("telegram_theme", "dark").unwrap();
        let (mut cache, _) = cache_with(Some(storage));
        cache.set("employees", &1, &date("a"), None);
        cache.set("today_status", &2, &Params::new(), None);

        cache.clear();

        assert_eq!(cache.stats(), CacheStats::default());
        let storage = cache.storage().unwrap();
        assert_eq!(storage.get_item("telegram_theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_corrupt_stored_entry_is_a_miss() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        let key = cache_key(DEFAULT_CACHE_PREFIX, "employees", &date("2024-03-01"));
        cache.storage_mut().unwrap().set_item(&key, "{not json").unwrap();

        assert_eq!(cache.get::<Value>("employees", &date("2024-03-01")), None);
        assert_eq!(cache.storage().unwrap().get_item(&key).unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_a_miss() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Status {
            has_arrival: bool,
        }

        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        cache.set("today_status", &"not a status", &Params::new(), None);
        assert!(cache.get::<Status>("today_status", &Params::new()).is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_cleanup_purges_expired_and_garbage() {
        let mut storage = MemoryStorage::new();
        storage.set_item("rollcall_cache_garbage", "###").unwrap();
        storage.set_item("unrelated", "###").unwrap();
        let (mut cache, clock) = cache_with(Some(storage));
        // Construction already swept the garbage entry
        assert_eq!(cache.storage().unwrap().len(), 1);

        cache.set("short", &1, &Params::new(), Some(Duration::from_millis(100)));
        cache.set("long", &2, &Params::new(), Some(Duration::from_millis(10_000)));
        cache.set("forever", &3, &Params::new(), None);
        clock.advance_ms(500);

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(
            cache.stats(),
            CacheStats {
                memory_entries: 2,
                storage_entries: 2
            }
        );
        assert_eq!(cache.storage().unwrap().get_item("unrelated").unwrap().as_deref(), Some("###"));
    }

    #[test]
    fn test_quota_exceeded_triggers_cleanup_and_retry() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::with_quota(200)));
        let filler = "x".repeat(90);
        cache.set("old", &filler, &Params::new(), Some(Duration::from_millis(10)));
        clock.advance_ms(20);

        // Does not fit next to the expired entry, fits once it is purged
        cache.set("new", &filler, &Params::new(), None);

        let key = cache_key(DEFAULT_CACHE_PREFIX, "new", &Params::new());
        assert!(cache.storage().unwrap().get_item(&key).unwrap().is_some());
        assert_eq!(cache.stats().storage_entries, 1);
    }

    #[test]
    fn test_quota_exhausted_degrades_to_memory_only() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::with_quota(64)));
        let big = "y".repeat(500);
        cache.set("big", &big, &Params::new(), None);

        assert_eq!(cache.stats().storage_entries, 0);
        assert_eq!(cache.get::<String>("big", &Params::new()), Some(big.clone()));

        // Lost on restart, since it never reached the persistent tier
        let storage = cache.into_storage();
        let mut cache = SessionCache::with_clock(storage, DEFAULT_CACHE_PREFIX, clock);
        assert_eq!(cache.get::<String>("big", &Params::new()), None);
    }

    #[test]
    fn test_failed_write_drops_older_stored_value() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::with_quota(100)));
        cache.set("n", &"small", &Params::new(), None);
        assert_eq!(cache.stats().storage_entries, 1);

        cache.set("n", &"z".repeat(200), &Params::new(), None);
        assert_eq!(cache.stats().storage_entries, 0);

        let storage = cache.into_storage();
        let mut cache = SessionCache::with_clock(storage, DEFAULT_CACHE_PREFIX, clock);
        assert_eq!(cache.get::<String>("n", &Params::new()), None);
    }

    #[test]
    fn test_memory_only_cache() {
        let (mut cache, clock) = cache_with(None);
        cache.set("employees", &vec!["a"], &date("x"), Some(Duration::from_secs(1)));
        assert_eq!(cache.get::<Vec<String>>("employees", &date("x")), Some(vec!["a".to_string()]));

        cache.clear_namespace("employees");
        assert_eq!(cache.get::<Vec<String>>("employees", &date("x")), None);

        cache.set("a", &1, &Params::new(), Some(Duration::from_secs(1)));
        clock.advance_ms(1_001);
        cache.cleanup();
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_failing_storage_is_absorbed() {
        struct BrokenStorage;

        impl SessionStorage for BrokenStorage {
            fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
                Err(StorageError::Unavailable("disabled".into()))
            }
            fn set_item(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
                Err(StorageError::Unavailable("disabled".into()))
            }
            fn remove_item(&mut self, _key: &str) -> Result<(), StorageError> {
                Err(StorageError::Unavailable("disabled".into()))
            }
            fn keys(&self) -> Result<Vec<String>, StorageError> {
                Err(StorageError::Unavailable("disabled".into()))
            }
        }

        let clock = Arc::new(ManualClock::new(START));
        let mut cache = SessionCache::with_clock(Some(BrokenStorage), "p_", clock);
        cache.set("n", &42, &Params::new(), None);
        assert_eq!(cache.get::<i32>("n", &Params::new()), Some(42));
        assert_eq!(cache.get::<i32>("other", &Params::new()), None);

        cache.remove("n", &Params::new());
        cache.clear_namespace("n");
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_derived_entries_expire_independently() {
        let (mut cache, clock) = cache_with(Some(MemoryStorage::new()));
        cache.set("employees", &json!([{"id": 1}]), &date("d"), Some(Duration::from_secs(300)));
        cache.set(
            "employee_records",
            &json!({"records": []}),
            &Params::new().with("user_id", 1i64).with("date", "d"),
            Some(Duration::from_secs(600)),
        );

        clock.advance_ms(400_000);
        assert_eq!(cache.get::<Value>("employees", &date("d")), None);
        assert!(cache
            .get::<Value>("employee_records", &Params::new().with("date", "d").with("user_id", 1i64))
            .is_some());
    }

    #[test]
    fn test_latest_set_wins() {
        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        cache.set("n", &1, &Params::new(), None);
        cache.set("n", &2, &Params::new(), None);
        assert_eq!(cache.get::<i32>("n", &Params::new()), Some(2));
        assert_eq!(cache.stats().storage_entries, 1);
    }

    #[test]
    fn test_unserializable_set_drops_previous_value() {
        use std::collections::HashMap;

        let (mut cache, _) = cache_with(Some(MemoryStorage::new()));
        cache.set("n", &1, &Params::new(), None);

        // Non-string map keys cannot be encoded as JSON
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        cache.set("n", &bad, &Params::new(), None);

        assert_eq!(cache.get::<i32>("n", &Params::new()), None);
        assert_eq!(cache.stats(), CacheStats::default());
    }
}

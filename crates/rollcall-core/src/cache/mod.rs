//! Session cache for backend query results.
//!
//! This module provides `SessionCache`, a two-tier cache:
//! - a memory tier that lives as long as the process
//! - an optional persistent tier (`SessionStorage`) that survives restarts
//!   within one session but not beyond it
//!
//! Entries are addressed by a namespace plus query parameters, carry their own
//! TTL, and can be invalidated one at a time or a whole namespace at once.

pub mod entry;
pub mod key;
pub mod session;
pub mod storage;

pub use entry::CacheEntry;
pub use key::{ParamValue, Params};
pub use session::{CacheStats, SessionCache, DEFAULT_CACHE_PREFIX};
pub use storage::{FileSessionStorage, MemoryStorage, SessionStorage, StorageError, DEFAULT_QUOTA_BYTES};

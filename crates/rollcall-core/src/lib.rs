//! Rollcall core library.
//!
//! Client-side plumbing for the rollcall attendance backend: a two-tier
//! session cache with per-entry TTLs, a randomized location freshness policy,
//! the REST client, and `AttendanceService`, which ties them together so
//! repeated views are served locally and record creation invalidates what it
//! changes.

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod location;
pub mod models;
pub mod service;

pub use api::{ApiClient, ApiError, AttendanceBackend};
pub use cache::{FileSessionStorage, MemoryStorage, Params, SessionCache, SessionStorage};
pub use clock::{Clock, RandomSource, SystemClock, ThreadRandom};
pub use config::Config;
pub use location::{FreshnessPolicy, LocationFix, LocationProvider, LocationTracker};
pub use service::AttendanceService;

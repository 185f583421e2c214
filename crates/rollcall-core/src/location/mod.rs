//! Geolocation reuse.
//!
//! A fix is reused until `FreshnessPolicy` judges it stale, using a threshold
//! drawn uniformly from 5 to 15 minutes on every check. `LocationTracker`
//! applies the policy in front of a platform `LocationProvider`.

pub mod freshness;
pub mod tracker;

pub use freshness::{FreshnessPolicy, LocationFix};
pub use tracker::{LocationError, LocationProvider, LocationTracker};

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::freshness::{FreshnessPolicy, LocationFix};
use crate::clock::Clock;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Geolocation is not available on this device")]
    Unavailable,

    #[error("Geolocation permission denied")]
    PermissionDenied,

    #[error("Timed out waiting for a position fix")]
    Timeout,
}

/// Platform geolocation collaborator.
pub trait LocationProvider {
    /// Request a new `(latitude, longitude)` reading.
    fn current_position(&self) -> impl Future<Output = Result<(f64, f64), LocationError>> + Send;
}

/// Holds the last fix and decides when to ask the platform for a new one.
pub struct LocationTracker<P> {
    provider: P,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    fix: Option<LocationFix>,
}

impl<P: LocationProvider> LocationTracker<P> {
    pub fn new(provider: P, policy: FreshnessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            policy,
            clock,
            fix: None,
        }
    }

    pub fn fix(&self) -> Option<&LocationFix> {
        self.fix.as_ref()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Reinstate a fix taken earlier, e.g. by a previous process.
    pub fn restore(&mut self, fix: LocationFix) {
        self.fix = Some(fix);
    }

    /// Reuse the current fix if the policy allows it, otherwise acquire.
    pub async fn location(&mut self) -> Result<LocationFix, LocationError> {
        if let Some(fix) = self.fix {
            if !self.policy.is_stale(Some(&fix)) {
                debug!(latitude = fix.latitude, longitude = fix.longitude, "Reusing location fix");
                return Ok(fix);
            }
        }
        self.acquire().await
    }

    /// Always ask the provider; a success replaces the fix wholesale.
    pub async fn acquire(&mut self) -> Result<LocationFix, LocationError> {
        info!("Requesting new location fix");
        let (latitude, longitude) = self.provider.current_position().await?;
        let fix = LocationFix::new(latitude, longitude, self.clock.now_ms());
        self.fix = Some(fix);
        Ok(fix)
    }

    /// Set the fix by hand, stamped with the current time.
    pub fn set_location(&mut self, latitude: f64, longitude: f64) {
        self.fix = Some(LocationFix::new(latitude, longitude, self.clock.now_ms()));
    }

    pub fn clear(&mut self) {
        self.fix = None;
    }
}

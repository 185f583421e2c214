//! Cached access to the attendance backend.
//!
//! `AttendanceService` is what the screens (here: CLI commands) talk to. Every
//! read goes through the session cache first. Bulk reads pre-populate the
//! narrower views they imply, and record creation invalidates the views it
//! changes before the request is even sent, so whatever is shown next is
//! fetched fresh.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::api::{validate_date_range, AttendanceBackend};
use crate::cache::{Params, SessionCache, SessionStorage, StorageError};
use crate::location::{LocationFix, LocationProvider, LocationTracker};
use crate::models::{
    Address, AuthResponse, CreateRecordRequest, CurrentLocationsResponse, EmployeeRecords,
    EmployeesResponse, Record, RecordDetails, RecordType, ReportResponse, TodayStatus,
};

/// Cache namespaces, one per backend view.
pub mod namespace {
    pub const USER: &str = "user";
    pub const EMPLOYEES: &str = "employees";
    pub const EMPLOYEE_RECORDS: &str = "employee_records";
    pub const RECORD_DETAIL: &str = "record_detail";
    pub const TODAY_STATUS: &str = "today_status";
    pub const ADDRESS: &str = "address";
    pub const CURRENT_LOCATIONS: &str = "current_locations";
}

const EMPLOYEES_TTL: Duration = Duration::from_secs(5 * 60);
const EMPLOYEE_RECORDS_TTL: Duration = Duration::from_secs(5 * 60);
const RECORD_DETAIL_TTL: Duration = Duration::from_secs(10 * 60);
const TODAY_STATUS_TTL: Duration = Duration::from_secs(60);
const CURRENT_LOCATIONS_TTL: Duration = Duration::from_secs(30);

/// Maximum concurrent requests when prefetching employee timelines.
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Session store key for the last location fix. Lives outside the cache
/// prefix, so clearing the cache does not forget where the worker is.
pub const LOCATION_FIX_KEY: &str = "rollcall_location_fix";

fn date_params(date: &str) -> Params {
    Params::new().with("date", date)
}

fn employee_records_params(user_id: i64, date: &str) -> Params {
    Params::new().with("user_id", user_id).with("date", date)
}

fn record_params(record_id: i64) -> Params {
    Params::new().with("id", record_id)
}

pub struct AttendanceService<B, S, P> {
    backend: B,
    cache: SessionCache<S>,
    location: LocationTracker<P>,
}

impl<B, S, P> AttendanceService<B, S, P>
where
    B: AttendanceBackend,
    S: SessionStorage,
    P: LocationProvider,
{
    pub fn new(backend: B, cache: SessionCache<S>, location: LocationTracker<P>) -> Self {
        let mut service = Self {
            backend,
            cache,
            location,
        };
        service.restore_location();
        service
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &SessionCache<S> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SessionCache<S> {
        &mut self.cache
    }

    pub fn location(&self) -> &LocationTracker<P> {
        &self.location
    }

    pub fn into_cache(self) -> SessionCache<S> {
        self.cache
    }

    /// Who the init data belongs to. Cached for the whole session.
    pub async fn authenticate(&mut self, telegram_id: i64) -> Result<AuthResponse> {
        let params = Params::new().with("telegram_id", telegram_id);
        if let Some(cached) = self.cache.get::<AuthResponse>(namespace::USER, &params) {
            return Ok(cached);
        }

        let auth = self
            .backend
            .authenticate(telegram_id)
            .await
            .context("Authentication failed")?;
        info!(user_id = auth.user.id, is_admin = auth.is_admin, "Authenticated");
        self.cache.set(namespace::USER, &auth, &params, None);
        Ok(auth)
    }

    // ===== Admin views =====

    /// Status of every employee for `date`.
    ///
    /// A fetched listing also seeds each employee's timeline for that date.
    pub async fn employees_status(&mut self, date: &str) -> Result<EmployeesResponse> {
        let params = date_params(date);
        if let Some(cached) = self.cache.get::<EmployeesResponse>(namespace::EMPLOYEES, &params) {
            debug!(date = date, "Employees status served from cache");
            return Ok(cached);
        }

        let listing = self
            .backend
            .employees_status(date)
            .await
            .with_context(|| format!("Failed to load employees for {}", date))?;
        self.cache.set(namespace::EMPLOYEES, &listing, &params, Some(EMPLOYEES_TTL));

        for employee in &listing.employees {
            self.cache.set(
                namespace::EMPLOYEE_RECORDS,
                &employee.to_employee_records(),
                &employee_records_params(employee.user.id, date),
                Some(EMPLOYEE_RECORDS_TTL),
            );
        }
        debug!(date = date, employees = listing.employees.len(), "Cached employees status");

        Ok(listing)
    }

    /// One employee's records for `date`.
    ///
    /// A fetched timeline also seeds the detail view of each record.
    pub async fn employee_records(&mut self, user_id: i64, date: &str) -> Result<EmployeeRecords> {
        let params = employee_records_params(user_id, date);
        if let Some(cached) = self.cache.get::<EmployeeRecords>(namespace::EMPLOYEE_RECORDS, &params) {
            debug!(user_id = user_id, date = date, "Employee records served from cache");
            return Ok(cached);
        }

        let records = self
            .backend
            .employee_records(user_id, date)
            .await
            .with_context(|| format!("Failed to load records of employee {}", user_id))?;
        self.store_employee_records(user_id, date, &records);
        Ok(records)
    }

    fn store_employee_records(&mut self, user_id: i64, date: &str, records: &EmployeeRecords) {
        self.cache.set(
            namespace::EMPLOYEE_RECORDS,
            records,
            &employee_records_params(user_id, date),
            Some(EMPLOYEE_RECORDS_TTL),
        );
        for details in records.record_details() {
            self.cache.set(
                namespace::RECORD_DETAIL,
                &details,
                &record_params(details.record.id),
                Some(RECORD_DETAIL_TTL),
            );
        }
    }

    pub async fn record_details(&mut self, record_id: i64) -> Result<RecordDetails> {
        let params = record_params(record_id);
        if let Some(cached) = self.cache.get::<RecordDetails>(namespace::RECORD_DETAIL, &params) {
            debug!(record_id = record_id, "Record details served from cache");
            return Ok(cached);
        }

        let details = self
            .backend
            .record_details(record_id)
            .await
            .with_context(|| format!("Failed to load record {}", record_id))?;
        self.cache.set(namespace::RECORD_DETAIL, &details, &params, Some(RECORD_DETAIL_TTL));
        Ok(details)
    }

    /// Fetch, concurrently, every timeline for `date` that is not cached yet.
    /// Returns how many were fetched.
    pub async fn prefetch_employee_records(&mut self, date: &str) -> Result<usize> {
        let listing = self.employees_status(date).await?;

        let missing: Vec<i64> = listing
            .employees
            .iter()
            .map(|e| e.user.id)
            .filter(|&id| {
                self.cache
                    .get::<EmployeeRecords>(namespace::EMPLOYEE_RECORDS, &employee_records_params(id, date))
                    .is_none()
            })
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let backend = &self.backend;
        let results: Vec<(i64, Result<EmployeeRecords>)> = stream::iter(missing)
            .map(|user_id| async move { (user_id, backend.employee_records(user_id, date).await) })
            .buffer_unordered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await;

        let mut fetched = 0;
        for (user_id, result) in results {
            match result {
                Ok(records) => {
                    self.store_employee_records(user_id, date, &records);
                    fetched += 1;
                }
                Err(e) => warn!(user_id = user_id, error = %e, "Failed to prefetch employee records"),
            }
        }
        info!(date = date, fetched = fetched, "Prefetched employee records");
        Ok(fetched)
    }

    pub async fn current_locations(&mut self) -> Result<CurrentLocationsResponse> {
        let params = Params::new();
        if let Some(cached) = self.cache.get(namespace::CURRENT_LOCATIONS, &params) {
            return Ok(cached);
        }

        let locations = self
            .backend
            .current_locations()
            .await
            .context("Failed to load current locations")?;
        self.cache.set(namespace::CURRENT_LOCATIONS, &locations, &params, Some(CURRENT_LOCATIONS_TTL));
        Ok(locations)
    }

    /// Request the discipline report for `date_from..=date_to`.
    ///
    /// Never cached: each call makes the backend deliver a new report.
    pub async fn discipline_report(&mut self, date_from: &str, date_to: &str) -> Result<ReportResponse> {
        validate_date_range(date_from, date_to)?;
        let report = self
            .backend
            .discipline_report(date_from, date_to)
            .await
            .with_context(|| format!("Failed to generate report for {}..{}", date_from, date_to))?;
        info!(date_from = date_from, date_to = date_to, "Discipline report requested");
        Ok(report)
    }

    // ===== Worker views =====

    pub async fn today_status(&mut self) -> Result<TodayStatus> {
        let params = Params::new();
        if let Some(cached) = self.cache.get(namespace::TODAY_STATUS, &params) {
            return Ok(cached);
        }

        let status = self
            .backend
            .today_status()
            .await
            .context("Failed to load today's status")?;
        self.cache.set(namespace::TODAY_STATUS, &status, &params, Some(TODAY_STATUS_TTL));
        Ok(status)
    }

    /// Address for a coordinate pair. Cached for the whole session.
    pub async fn address(&mut self, latitude: f64, longitude: f64) -> Result<Address> {
        let params = Params::new().with("latitude", latitude).with("longitude", longitude);
        if let Some(cached) = self.cache.get(namespace::ADDRESS, &params) {
            return Ok(cached);
        }

        let address = self
            .backend
            .address(latitude, longitude)
            .await
            .context("Failed to resolve address")?;
        self.cache.set(namespace::ADDRESS, &address, &params, None);
        Ok(address)
    }

    /// Current position, reusing the last fix while it is fresh.
    pub async fn current_fix(&mut self) -> Result<LocationFix> {
        let fix = self
            .location
            .location()
            .await
            .context("Could not determine location")?;
        self.persist_location();
        Ok(fix)
    }

    /// Record an arrival or departure at the current position.
    ///
    /// Views that the new record changes are invalidated before the request
    /// goes out. If the request then fails they are simply refetched.
    pub async fn create_record(
        &mut self,
        user_id: i64,
        record_type: RecordType,
        comment: Option<String>,
    ) -> Result<Record> {
        let fix = self.current_fix().await?;

        self.invalidate_attendance();

        let request = CreateRecordRequest {
            user_id,
            record_type,
            latitude: fix.latitude,
            longitude: fix.longitude,
            comment: comment.filter(|c| !c.trim().is_empty()),
        };
        let response = self
            .backend
            .create_record(&request)
            .await
            .with_context(|| format!("Failed to save {} record", record_type))?;

        info!(record_id = response.record.id, record_type = %record_type, "Record created");
        Ok(response.record)
    }

    /// Drop every cached view that a new record makes stale.
    pub fn invalidate_attendance(&mut self) {
        self.cache.remove(namespace::TODAY_STATUS, &Params::new());
        self.cache.clear_namespace(namespace::EMPLOYEES);
        self.cache.clear_namespace(namespace::EMPLOYEE_RECORDS);
        self.cache.clear_namespace(namespace::CURRENT_LOCATIONS);
    }

    // ===== Location persistence =====

    /// Override the position by hand (e.g. coordinates given on the command line).
    pub fn set_location(&mut self, latitude: f64, longitude: f64) {
        self.location.set_location(latitude, longitude);
        self.persist_location();
    }

    fn restore_location(&mut self) {
        let Some(storage) = self.cache.storage() else {
            return;
        };
        let raw = match storage.get_item(LOCATION_FIX_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read saved location");
                return;
            }
        };
        match serde_json::from_str::<LocationFix>(&raw) {
            Ok(fix) => self.location.restore(fix),
            Err(e) => debug!(error = %e, "Ignoring unreadable saved location"),
        }
    }

    fn persist_location(&mut self) {
        let Some(fix) = self.location.fix().copied() else {
            return;
        };
        let Some(storage) = self.cache.storage_mut() else {
            return;
        };
        let result = serde_json::to_string(&fix)
            .map_err(StorageError::from)
            .and_then(|raw| storage.set_item(LOCATION_FIX_KEY, &raw));
        if let Err(e) = result {
            warn!(error = %e, "Failed to save location");
        }
    }

    /// Forget everything this session knows: cached views and the location fix.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.location.clear();
        if let Some(storage) = self.cache.storage_mut() {
            if let Err(e) = storage.remove_item(LOCATION_FIX_KEY) {
                warn!(error = %e, "Failed to remove saved location");
            }
        }
    }
}

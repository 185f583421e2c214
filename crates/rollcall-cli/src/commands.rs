//! Command implementations.
//!
//! Every command opens the same session: the on-disk session store, the
//! cache over it, and the attendance service. Cached views and the last
//! location fix therefore carry over between invocations until the session
//! goes idle.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use tracing::{info, warn};

use rollcall_core::api::validate_date;
use rollcall_core::auth::CredentialStore;
use rollcall_core::location::LocationError;
use rollcall_core::models::RecordType;
use rollcall_core::{
    ApiClient, AttendanceBackend, AttendanceService, Clock, Config, FileSessionStorage,
    FreshnessPolicy, LocationProvider, LocationTracker, SessionCache, SessionStorage, SystemClock,
};

use crate::output;

/// A terminal has no positioning hardware; coordinates come from `--lat`/`--lon`
/// or from the fix saved earlier in the session.
pub struct CommandLineLocation;

impl LocationProvider for CommandLineLocation {
    async fn current_position(&self) -> Result<(f64, f64), LocationError> {
        Err(LocationError::Unavailable)
    }
}

type Service = AttendanceService<ApiClient, FileSessionStorage, CommandLineLocation>;

/// Options for `arrive` and `depart`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordOptions {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheAction {
    Stats,
    Clear,
    Cleanup,
}

fn open_storage(config: &Config) -> Result<Option<FileSessionStorage>> {
    let path = config.session_path()?;
    match FileSessionStorage::open(&path, config.session_quota_bytes) {
        Ok(storage) => Ok(Some(storage)),
        Err(e) => {
            // Still usable, just not across invocations
            warn!(path = %path.display(), error = %e, "Session store unavailable, caching in memory only");
            Ok(None)
        }
    }
}

fn open_cache(config: &Config) -> Result<SessionCache<FileSessionStorage>> {
    let storage = open_storage(config)?;
    Ok(SessionCache::with_clock(storage, config.cache_prefix.clone(), Arc::new(SystemClock)))
}

/// Open a cache and report how many stored entries its opening sweep removed.
fn open_and_sweep<S: SessionStorage>(
    storage: Option<S>,
    prefix: &str,
    clock: Arc<dyn Clock>,
) -> (SessionCache<S>, usize) {
    let before = storage
        .as_ref()
        .and_then(|s| s.keys().ok())
        .map(|keys| keys.iter().filter(|k| k.starts_with(prefix)).count())
        .unwrap_or(0);
    let mut cache = SessionCache::with_clock(storage, prefix, clock);
    // Anything that expired since opening
    cache.cleanup();
    let removed = before.saturating_sub(cache.stats().storage_entries);
    (cache, removed)
}

fn open_service(config: &Config) -> Result<Service> {
    let init_data = CredentialStore::resolve(config.telegram_id)?;
    let client = ApiClient::new(config.api_url.clone())?.with_init_data(init_data);
    let tracker = LocationTracker::new(CommandLineLocation, FreshnessPolicy::default(), Arc::new(SystemClock));
    Ok(AttendanceService::new(client, open_cache(config)?, tracker))
}

fn require_telegram_id(config: &Config) -> Result<i64> {
    config
        .telegram_id
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `rollcall login <telegram-id> <init-data>` first."))
}

fn resolve_date(date: Option<&str>) -> Result<String> {
    match date {
        Some(date) => Ok(validate_date(date)?.format("%Y-%m-%d").to_string()),
        None => Ok(Local::now().format("%Y-%m-%d").to_string()),
    }
}

/// Report range, defaulting to the current month so far.
fn resolve_report_range(date_from: Option<&str>, date_to: Option<&str>) -> Result<(String, String)> {
    let today = Local::now().date_naive();
    let date_from = match date_from {
        Some(date) => resolve_date(Some(date))?,
        None => today.with_day(1).unwrap_or(today).format("%Y-%m-%d").to_string(),
    };
    let date_to = resolve_date(date_to)?;
    Ok((date_from, date_to))
}

pub async fn login(mut config: Config, telegram_id: i64, init_data: String) -> Result<()> {
    let client = ApiClient::new(config.api_url.clone())?.with_init_data(init_data.clone());
    let auth = client
        .authenticate(telegram_id)
        .await
        .context("The backend rejected these credentials")?;

    CredentialStore::store(telegram_id, &init_data)?;
    config.telegram_id = Some(telegram_id);
    config.save()?;

    // A new identity must not see the previous one's cached views
    let mut cache = open_cache(&config)?;
    cache.clear();

    info!(telegram_id = telegram_id, user_id = auth.user.id, "Logged in");
    println!(
        "Logged in as {}{}",
        auth.user.display_name(),
        if auth.is_admin { " (admin)" } else { "" }
    );
    Ok(())
}

pub fn logout(mut config: Config) -> Result<()> {
    if let Some(telegram_id) = config.telegram_id.take() {
        if let Err(e) = CredentialStore::delete(telegram_id) {
            warn!(error = %e, "Could not remove stored init data");
        }
        config.save()?;
    }

    let path = config.session_path()?;
    match FileSessionStorage::open(&path, config.session_quota_bytes) {
        Ok(storage) => storage.end_session().context("Failed to remove session store")?,
        Err(e) => warn!(error = %e, "Could not open session store"),
    }

    println!("Logged out");
    Ok(())
}

pub async fn status(config: Config) -> Result<()> {
    let telegram_id = require_telegram_id(&config)?;
    let mut service = open_service(&config)?;

    let auth = service.authenticate(telegram_id).await?;
    let status = service.today_status().await?;

    println!("{}", auth.user.display_name());
    println!("{}", output::today_status(&status));
    Ok(())
}

pub async fn employees(config: Config, date: Option<&str>) -> Result<()> {
    let date = resolve_date(date)?;
    let mut service = open_service(&config)?;

    let listing = service.employees_status(&date).await?;
    println!("{}", output::employees(&listing));
    Ok(())
}

pub async fn records(config: Config, user_id: i64, date: Option<&str>) -> Result<()> {
    let date = resolve_date(date)?;
    let mut service = open_service(&config)?;

    let records = service.employee_records(user_id, &date).await?;
    println!("{}", output::employee_records(&records));
    Ok(())
}

pub async fn record(config: Config, record_id: i64) -> Result<()> {
    let mut service = open_service(&config)?;

    let details = service.record_details(record_id).await?;
    println!("{}", output::record_details(&details));
    Ok(())
}

pub async fn create(config: Config, record_type: RecordType, options: RecordOptions) -> Result<()> {
    let telegram_id = require_telegram_id(&config)?;
    let mut service = open_service(&config)?;

    match (options.latitude, options.longitude) {
        (Some(lat), Some(lon)) => service.set_location(lat, lon),
        (None, None) => {}
        _ => anyhow::bail!("--lat and --lon must be given together"),
    }

    let user = service.authenticate(telegram_id).await?.user;
    let record = service
        .create_record(user.id, record_type, options.comment)
        .await
        .map_err(|e| match e.downcast_ref::<LocationError>() {
            Some(LocationError::Unavailable) => {
                anyhow::anyhow!("No recent location. Pass --lat and --lon.")
            }
            _ => e,
        })?;

    let place = match (record.latitude, record.longitude) {
        (Some(lat), Some(lon)) => match service.address(lat, lon).await {
            Ok(address) => address.display(),
            Err(e) => {
                warn!(error = %e, "Address lookup failed");
                format!("{:.5}, {:.5}", lat, lon)
            }
        },
        _ => String::new(),
    };

    println!("{} at {}  {}", record_type.label(), record.time_display(), place);
    Ok(())
}

pub async fn report(config: Config, date_from: Option<&str>, date_to: Option<&str>) -> Result<()> {
    let (date_from, date_to) = resolve_report_range(date_from, date_to)?;
    let mut service = open_service(&config)?;

    let report = service.discipline_report(&date_from, &date_to).await?;
    println!("{}", output::report(&date_from, &date_to, &report));
    Ok(())
}

pub async fn locations(config: Config) -> Result<()> {
    let mut service = open_service(&config)?;

    let locations = service.current_locations().await?;
    println!("{}", output::current_locations(&locations));
    Ok(())
}

pub fn cache(config: Config, action: CacheAction) -> Result<()> {
    let storage = open_storage(&config)?;
    let (mut cache, removed) = open_and_sweep(storage, &config.cache_prefix, Arc::new(SystemClock));
    match action {
        CacheAction::Stats => println!("{}", output::cache_stats(&cache.stats())),
        CacheAction::Clear => {
            cache.clear();
            println!("Cache cleared");
        }
        CacheAction::Cleanup => println!("Removed {} stale entries", removed),
    }
    Ok(())
}

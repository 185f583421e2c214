//! API client for the attendance backend.
//!
//! Every request carries the Telegram Mini App init data as
//! `Authorization: tma <init data>`; the backend validates its signature.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiError, AttendanceBackend};
use crate::models::{
    Address, AuthResponse, CreateRecordRequest, CreateRecordResponse, CurrentLocationsResponse,
    EmployeeRecords, EmployeesResponse, RecordDetails, ReportResponse, TodayStatus,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Address lookups go through a geocoder upstream and can be slow.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Scheme name the backend expects in the Authorization header.
const AUTH_SCHEME: &str = "tma";

/// API client for the attendance backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    init_data: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            init_data: None,
        })
    }

    /// Set the raw init data used to authorise requests
    pub fn set_init_data(&mut self, init_data: String) {
        self.init_data = Some(init_data);
    }

    /// Create a new ApiClient with the given init data, sharing the connection pool.
    pub fn with_init_data(&self, init_data: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            init_data: Some(init_data),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref init_data) = self.init_data {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("{} {}", AUTH_SCHEME, init_data))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request built by `build`, retrying rate-limited attempts with
    /// exponential backoff, and decode the JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: &str,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            debug!(method = method, url = url, "Sending request");
            let response = build()
                .headers(self.auth_headers()?)
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path);
        self.execute("GET", &url, || self.client.get(&url).query(query)).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        self.execute("POST", &url, || self.client.post(&url).json(body)).await
    }
}

/// Reject dates the backend would refuse before spending a request on them.
pub fn validate_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))
}

/// Validate both ends of an inclusive range and reject one that runs backwards.
pub fn validate_date_range(date_from: &str, date_to: &str) -> Result<(NaiveDate, NaiveDate)> {
    let from = validate_date(date_from)?;
    let to = validate_date(date_to)?;
    if from > to {
        anyhow::bail!("Start date {} is after end date {}", date_from, date_to);
    }
    Ok((from, to))
}

impl AttendanceBackend for ApiClient {
    async fn authenticate(&self, telegram_id: i64) -> Result<AuthResponse> {
        self.post("/api/auth", &serde_json::json!({ "telegram_id": telegram_id }))
            .await
            .context("Authentication failed")
    }

    async fn employees_status(&self, date: &str) -> Result<EmployeesResponse> {
        validate_date(date)?;
        self.get("/api/employees", &[("date", date.to_string())]).await
    }

    async fn employee_records(&self, user_id: i64, date: &str) -> Result<EmployeeRecords> {
        validate_date(date)?;
        let path = format!("/api/employees/{}/records", user_id);
        self.get(&path, &[("date", date.to_string())]).await
    }

    async fn record_details(&self, record_id: i64) -> Result<RecordDetails> {
        self.get(&format!("/api/records/{}", record_id), &[]).await
    }

    async fn create_record(&self, request: &CreateRecordRequest) -> Result<CreateRecordResponse> {
        self.post("/api/records", request).await
    }

    async fn address(&self, latitude: f64, longitude: f64) -> Result<Address> {
        self.get(
            "/api/address",
            &[("latitude", latitude.to_string()), ("longitude", longitude.to_string())],
        )
        .await
    }

    async fn current_locations(&self) -> Result<CurrentLocationsResponse> {
        self.get("/api/current-locations", &[]).await
    }

    async fn today_status(&self) -> Result<TodayStatus> {
        self.get("/api/user/today-status", &[]).await
    }

    async fn discipline_report(&self, date_from: &str, date_to: &str) -> Result<ReportResponse> {
        validate_date_range(date_from, date_to)?;
        self.get(
            "/api/reports/discipline",
            &[("date_from", date_from.to_string()), ("date_to", date_to.to_string())],
        )
        .await
    }
}

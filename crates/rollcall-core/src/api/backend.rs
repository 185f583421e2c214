use std::future::Future;

use anyhow::Result;

use crate::models::{
    Address, AuthResponse, CreateRecordRequest, CreateRecordResponse, CurrentLocationsResponse,
    EmployeeRecords, EmployeesResponse, RecordDetails, ReportResponse, TodayStatus,
};

/// The attendance backend as seen by the caching service.
///
/// `ApiClient` is the real implementation; tests substitute an in-memory one.
pub trait AttendanceBackend {
    fn authenticate(&self, telegram_id: i64) -> impl Future<Output = Result<AuthResponse>> + Send;

    fn employees_status(&self, date: &str) -> impl Future<Output = Result<EmployeesResponse>> + Send;

    fn employee_records(
        &self,
        user_id: i64,
        date: &str,
    ) -> impl Future<Output = Result<EmployeeRecords>> + Send;

    fn record_details(&self, record_id: i64) -> impl Future<Output = Result<RecordDetails>> + Send;

    fn create_record(
        &self,
        request: &CreateRecordRequest,
    ) -> impl Future<Output = Result<CreateRecordResponse>> + Send;

    fn address(&self, latitude: f64, longitude: f64) -> impl Future<Output = Result<Address>> + Send;

    fn current_locations(&self) -> impl Future<Output = Result<CurrentLocationsResponse>> + Send;

    fn today_status(&self) -> impl Future<Output = Result<TodayStatus>> + Send;

    /// Ask the backend to build the discipline report for an inclusive date
    /// range and send it to the admin's bot chat.
    fn discipline_report(
        &self,
        date_from: &str,
        date_to: &str,
    ) -> impl Future<Output = Result<ReportResponse>> + Send;
}

//! REST API client module for the attendance backend.
//!
//! This module provides the `ApiClient` for the worker and admin endpoints
//! (employee status, record timelines, record details, record creation,
//! address lookup, live locations, discipline reports) and the `AttendanceBackend` trait the
//! caching service is written against.
//!
//! The API authenticates every request with Telegram Mini App init data.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::AttendanceBackend;
pub use client::{validate_date, validate_date_range, ApiClient};
pub use error::ApiError;

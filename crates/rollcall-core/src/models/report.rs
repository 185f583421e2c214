use serde::{Deserialize, Serialize};

/// Response of `GET /api/reports/discipline`.
///
/// The report itself is rendered server side and delivered to the admin's
/// chat with the bot; only a confirmation comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    #[serde(default)]
    pub message: String,
}

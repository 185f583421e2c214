//! Plain-text rendering of backend views for the terminal.

use rollcall_core::cache::CacheStats;
use rollcall_core::models::{
    CurrentLocationsResponse, EmployeeRecords, EmployeesResponse, Record, RecordDetails,
    ReportResponse, StatusRecord, TodayStatus,
};

/// Width of the name column in employee listings
const NAME_WIDTH: usize = 24;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn record_time(record: Option<&Record>) -> String {
    record.map(Record::time_display).unwrap_or_else(|| "--:--".to_string())
}

fn status_line(label: &str, record: Option<&StatusRecord>) -> String {
    match record {
        Some(r) => {
            let time = r.time.as_deref().unwrap_or("--:--");
            match r.address.as_deref() {
                Some(address) => format!("{:<10} {}  {}", label, time, address),
                None => format!("{:<10} {}", label, time),
            }
        }
        None => format!("{:<10} not yet", label),
    }
}

pub fn today_status(status: &TodayStatus) -> String {
    [
        status_line("Arrival", status.arrival_record.as_ref()),
        status_line("Departure", status.departure_record.as_ref()),
    ]
    .join("\n")
}

pub fn employees(listing: &EmployeesResponse) -> String {
    if listing.employees.is_empty() {
        return format!("No employees for {}", listing.date);
    }

    let mut lines = vec![format!("Employees on {}", listing.date)];
    for employee in &listing.employees {
        lines.push(format!(
            "{:>5}  {:<width$}  {:<8}  {}  {}",
            employee.user.id,
            truncate(&employee.user.display_name(), NAME_WIDTH),
            employee.status_label(),
            record_time(employee.arrival_record.as_ref()),
            record_time(employee.departure_record.as_ref()),
            width = NAME_WIDTH,
        ));
    }
    lines.join("\n")
}

pub fn employee_records(records: &EmployeeRecords) -> String {
    let mut lines = vec![records.user.display_name()];
    let timeline = records.timeline();
    if timeline.is_empty() {
        lines.push("  No records".to_string());
    }
    for item in timeline {
        let address = item
            .address
            .as_ref()
            .map(|a| a.display())
            .or_else(|| item.record.address.clone())
            .unwrap_or_default();
        lines.push(format!(
            "  #{:<6} {}  {:<9} {}",
            item.record.id,
            item.record.time_display(),
            item.record.record_type.label(),
            address
        ));
    }
    lines.join("\n")
}

pub fn record_details(details: &RecordDetails) -> String {
    let record = &details.record;
    let mut lines = vec![
        format!("Record #{}", record.id),
        format!("  Employee: {}", details.user.display_name()),
        format!("  Type:     {}", record.record_type.label()),
        format!("  Time:     {}", record.time_display()),
    ];
    if let (Some(lat), Some(lon)) = (record.latitude, record.longitude) {
        lines.push(format!("  Position: {:.5}, {:.5}", lat, lon));
    }
    if let Some(address) = details.address.as_ref().map(|a| a.display()).or_else(|| record.address.clone()) {
        lines.push(format!("  Address:  {}", address));
    }
    if let Some(comment) = record.comment.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("  Comment:  {}", comment));
    }
    if record.has_photo {
        lines.push("  Photo attached".to_string());
    }
    lines.join("\n")
}

pub fn current_locations(response: &CurrentLocationsResponse) -> String {
    if response.locations.is_empty() {
        return "Nobody is on site".to_string();
    }
    response
        .locations
        .iter()
        .map(|loc| {
            format!(
                "{:<width$}  {:.5}, {:.5}  {}",
                truncate(&loc.user.display_name(), NAME_WIDTH),
                loc.latitude,
                loc.longitude,
                loc.address.as_deref().unwrap_or(""),
                width = NAME_WIDTH,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn report(date_from: &str, date_to: &str, response: &ReportResponse) -> String {
    let message = if response.message.is_empty() {
        "Report requested"
    } else {
        response.message.as_str()
    };
    format!(
        "{} ({} to {})\nOpen the chat with the bot to read it.",
        message, date_from, date_to
    )
}

pub fn cache_stats(stats: &CacheStats) -> String {
    format!(
        "Memory entries:  {}\nSession entries: {}",
        stats.memory_entries, stats.storage_entries
    )
}

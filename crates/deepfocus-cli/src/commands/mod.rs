pub mod config;
pub mod flow;
pub mod rank;
pub mod session;
pub mod task;

use chrono::{DateTime, Utc};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Parse an RFC 3339 timestamp given on the command line.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

/// Split a comma-separated flag value, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Date normalization for enrichment rows.

use chrono::NaiveDate;

use crate::weather::error::WeatherError;

/// Accepted input formats, tried in priority order.
const ACCEPTED_FORMATS: &[&str] = &["%d-%m-%Y", "%Y-%m-%d", "%m-%d-%Y"];

/// Normalizes a date string to `YYYY-MM-DD`. The first format that parses
/// wins; if none do, the row carrying this date is excluded from the batch.
pub fn normalize_date(raw: &str) -> Result<String, WeatherError> {
    let trimmed = raw.trim();
    for format in ACCEPTED_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.format("%Y-%m-%d").to_string());
        }
    }
    Err(WeatherError::InvalidDateFormat(raw.to_string()))
}

//! Parsing helpers for AlphaVantage payloads.
//!
//! Field names arrive numbered, e.g. `"10. change percent"`, and every value
//! is a string.

use crate::utils::error::{Result, TrackerError};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Format `val` as snake case.
pub fn snakeify(val: &str) -> String {
    val.trim().replace([' ', '-'], "_").to_lowercase()
}

/// `"10. change percent"` -> `"change_percent"`
pub fn clean_field_name(raw: &str) -> String {
    let name = raw.trim();
    let name = name.rsplit(". ").next().unwrap_or(name);
    snakeify(name)
}

/// Re-key a JSON object by cleaned field names, keeping only string values.
pub fn clean_object(obj: &Map<String, Value>) -> HashMap<String, String> {
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (clean_field_name(k), s.to_string())))
        .collect()
}

/// `"0.8800%"` -> `0.88`
pub fn parse_percent(value: &str) -> Option<f64> {
    value.trim().trim_end_matches('%').trim().parse().ok()
}

pub fn number_field(fields: &HashMap<String, String>, name: &str) -> Result<f64> {
    let raw = required(fields, name)?;
    raw.trim()
        .parse()
        .map_err(|_| invalid_field(name, raw, "not a number"))
}

pub fn percent_field(fields: &HashMap<String, String>, name: &str) -> Result<f64> {
    let raw = required(fields, name)?;
    parse_percent(raw).ok_or_else(|| invalid_field(name, raw, "not a percentage"))
}

pub fn date_field(fields: &HashMap<String, String>, name: &str) -> Result<NaiveDate> {
    let raw = required(fields, name)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| invalid_field(name, raw, "not a YYYY-MM-DD date"))
}

/// Like [`number_field`] but falling back to `default` when absent.
pub fn number_field_or(fields: &HashMap<String, String>, name: &str, default: f64) -> Result<f64> {
    if fields.contains_key(name) {
        number_field(fields, name)
    } else {
        Ok(default)
    }
}

pub fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| TrackerError::validation(format!("missing field '{}'", name)))
}

fn invalid_field(name: &str, raw: &str, reason: &str) -> TrackerError {
    TrackerError::validation(format!("field '{}' value '{}' is {}", name, raw, reason))
}

use crate::utils::error::{Result, TrackerError};
use chrono::NaiveDate;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(TrackerError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// Amounts of shares and money must be finite and strictly positive.
pub fn validate_positive_amount(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrackerError::validation(format!(
            "{} must be a positive number, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Ticker symbols as AlphaVantage accepts them, e.g. `VOO`, `BRK.B`.
pub fn validate_ticker(field_name: &str, ticker: &str) -> Result<()> {
    let valid = !ticker.is_empty()
        && ticker.len() <= 12
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(TrackerError::validation(format!(
            "{} '{}' is not a valid ticker symbol",
            field_name, ticker
        )));
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(field_name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        TrackerError::validation(format!(
            "{} '{}' is not a YYYY-MM-DD date: {}",
            field_name, value, e
        ))
    })
}

pub fn validate_email(field_name: &str, email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(TrackerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: email.to_string(),
            reason: "Not an e-mail address".to_string(),
        });
    }
    Ok(())
}

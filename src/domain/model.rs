use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One trading day of a security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: f64,
    pub dividend_amount: f64,
    pub split_coefficient: f64,
}

/// Daily adjusted price history, always kept in ascending date order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySeries {
    pub symbol: String,
    pub metadata: HashMap<String, String>,
    points: Vec<PricePoint>,
}

impl DailySeries {
    pub fn new(symbol: impl Into<String>, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self {
            symbol: symbol.into(),
            metadata: HashMap::new(),
            points,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Days on or after `date`.
    pub fn since(&self, date: NaiveDate) -> &[PricePoint] {
        let start = self.points.partition_point(|p| p.date < date);
        &self.points[start..]
    }

    /// Closing price on exactly `date`.
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].close)
    }

    pub fn to_csv(&self) -> crate::utils::error::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for point in &self.points {
            writer.serialize(point)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::utils::error::TrackerError::IoError(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Latest quote as returned by the global quote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub price: f64,
    pub volume: f64,
    pub latest_trading_day: NaiveDate,
    pub previous_close: f64,
    pub change: f64,
    /// Percent, i.e. `0.88` is a +0.88% change.
    pub change_percent: f64,
}

impl Quote {
    /// `"+0.88% - 123.45"`
    pub fn summary(&self) -> String {
        let change = if self.change_percent > 0.0 {
            format!("+{}%", self.change_percent)
        } else {
            format!("{}%", self.change_percent)
        };
        format!("{} - {}", change, self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleEvent {
    pub date: NaiveDate,
    pub n_shares: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoldSummary {
    pub short_term_shares: f64,
    pub long_term_shares: f64,
    pub total_price_short: f64,
    pub total_price_long: f64,
    #[serde(default)]
    pub full_history: Vec<SaleEvent>,
}

impl SoldSummary {
    pub fn total_shares(&self) -> f64 {
        self.short_term_shares + self.long_term_shares
    }
}

/// One purchase of a security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub user_id: String,
    pub skey: String,
    pub ticker: String,
    pub n_shares: f64,
    /// Total price paid for the lot.
    pub price: f64,
    pub purchase_date: NaiveDate,
    /// First day the lot is eligible for dividends.
    pub first_dividend_date: NaiveDate,
    #[serde(default)]
    pub reinvest: bool,
    #[serde(default)]
    pub sold: SoldSummary,
}

impl Lot {
    pub fn sort_key(ticker: &str, purchase_date: NaiveDate) -> String {
        format!("{}__{}", ticker, purchase_date.format("%Y-%m-%d"))
    }

    pub fn remaining_shares(&self) -> f64 {
        self.n_shares - self.sold.total_shares()
    }

    pub fn price_per_share(&self) -> f64 {
        self.price / self.n_shares
    }
}

impl fmt::Display for Lot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} - Shares: {} - Price: {} - Price/Share: {:.2} ",
            self.ticker,
            self.skey,
            self.n_shares,
            self.price,
            self.price_per_share()
        )
    }
}

/// Date one calendar year after `date`; Feb 29 maps to Feb 28.
pub fn add_one_calendar_year(date: NaiveDate) -> NaiveDate {
    let year = date.year() + 1;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsRequest {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub start_value: f64,
    pub start_shares: f64,
    #[serde(default)]
    pub reinvest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRequest {
    pub start_date: NaiveDate,
    pub start_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsResult {
    pub stock: String,
    pub value: f64,
    pub percent_change: f64,
}

/// Who receives the report of which user's portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: String,
    pub email: String,
}

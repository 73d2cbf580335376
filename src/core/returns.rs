use crate::core::{MarketData, ReturnsCalculator};
use crate::domain::model::{BaselineRequest, DailySeries, ReturnsRequest, ReturnsResult};
use crate::utils::error::{Result, TrackerError};
use crate::utils::validation::{validate_positive_amount, validate_ticker};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub const DEFAULT_BASELINE_TICKER: &str = "FXAIX";

/// Current value of `start_shares` bought on `start_date`.
///
/// Walks every trading day from `start_date` on: splits multiply the share
/// count, dividends are either bought back at that day's close (`reinvest`)
/// or accumulated as cash. The result is the latest close times the final
/// share count plus any cash paid out.
pub fn calculate_value(
    series: &DailySeries,
    start_date: NaiveDate,
    start_shares: f64,
    reinvest: bool,
) -> Result<f64> {
    let days = series.since(start_date);
    let latest = days.last().ok_or_else(|| TrackerError::NoPriceData {
        symbol: series.symbol.clone(),
        date: start_date.to_string(),
    })?;

    let mut shares = start_shares;
    let mut payout = 0.0;
    for day in days {
        shares *= day.split_coefficient;

        let dividend = day.dividend_amount * shares;
        if reinvest {
            shares += dividend / day.close;
        } else {
            payout += dividend;
        }
    }

    Ok(latest.close * shares + payout)
}

/// Shares of the series that `start_value` would have bought at the close of `start_date`.
pub fn baseline_shares(
    series: &DailySeries,
    start_date: NaiveDate,
    start_value: f64,
) -> Result<f64> {
    let cost = series
        .close_on(start_date)
        .ok_or_else(|| TrackerError::NoPriceData {
            symbol: series.symbol.clone(),
            date: start_date.to_string(),
        })?;
    Ok(start_value / cost)
}

pub fn percent_change(value: f64, start_value: f64) -> f64 {
    (value - start_value) / start_value
}

/// Computes returns locally from market data.
#[derive(Clone)]
pub struct ReturnsService {
    market: Arc<dyn MarketData>,
    baseline_ticker: String,
}

impl ReturnsService {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self::with_baseline(market, DEFAULT_BASELINE_TICKER)
    }

    pub fn with_baseline(market: Arc<dyn MarketData>, baseline_ticker: impl Into<String>) -> Self {
        Self {
            market,
            baseline_ticker: baseline_ticker.into(),
        }
    }

    pub fn baseline_ticker(&self) -> &str {
        &self.baseline_ticker
    }
}

#[async_trait]
impl ReturnsCalculator for ReturnsService {
    async fn security_returns(&self, request: &ReturnsRequest) -> Result<ReturnsResult> {
        validate_ticker("ticker", &request.ticker)?;
        validate_positive_amount("start_value", request.start_value)?;
        validate_positive_amount("start_shares", request.start_shares)?;

        let series = self.market.daily_series(&request.ticker, true).await?;
        let value = calculate_value(
            &series,
            request.start_date,
            request.start_shares,
            request.reinvest,
        )?;
        tracing::debug!(
            "{} from {}: {} -> {:.2}",
            request.ticker,
            request.start_date,
            request.start_value,
            value
        );

        Ok(ReturnsResult {
            stock: request.ticker.clone(),
            value,
            percent_change: percent_change(value, request.start_value),
        })
    }

    async fn baseline_returns(&self, request: &BaselineRequest) -> Result<ReturnsResult> {
        validate_positive_amount("start_value", request.start_value)?;

        let series = self.market.daily_series(&self.baseline_ticker, true).await?;
        let shares = baseline_shares(&series, request.start_date, request.start_value)?;
        let value = calculate_value(&series, request.start_date, shares, true)?;

        Ok(ReturnsResult {
            stock: self.baseline_ticker.clone(),
            value,
            percent_change: percent_change(value, request.start_value),
        })
    }
}

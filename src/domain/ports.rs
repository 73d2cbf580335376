use crate::domain::model::{
    BaselineRequest, DailySeries, Lot, Quote, ReturnsRequest, ReturnsResult,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of daily prices and live quotes.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// `full` requests the whole history instead of the last ~100 days.
    async fn daily_series(&self, symbol: &str, full: bool) -> Result<Arc<DailySeries>>;
    async fn quote(&self, symbol: &str) -> Result<Quote>;
}

/// Persistence for purchase lots, keyed by user and `{ticker}__{purchase_date}`.
pub trait LotStore: Send + Sync {
    fn list(&self, user_id: &str) -> impl std::future::Future<Output = Result<Vec<Lot>>> + Send;
    fn get(
        &self,
        user_id: &str,
        skey: &str,
    ) -> impl std::future::Future<Output = Result<Option<Lot>>> + Send;
    /// Fails with `LotExists` when the key is already taken.
    fn insert_new(&self, lot: &Lot) -> impl std::future::Future<Output = Result<()>> + Send;
    fn put(&self, lot: &Lot) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait ReturnsCalculator: Send + Sync {
    async fn security_returns(&self, request: &ReturnsRequest) -> Result<ReturnsResult>;
    async fn baseline_returns(&self, request: &BaselineRequest) -> Result<ReturnsResult>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

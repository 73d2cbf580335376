pub mod fields;
pub mod ledger;
pub mod report;
pub mod returns;

pub use crate::domain::model::{Lot, ReturnsRequest, ReturnsResult};
pub use crate::domain::ports::{LotStore, MarketData, Notifier, ReturnsCalculator};
pub use crate::utils::error::Result;

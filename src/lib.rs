pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
#[cfg(feature = "server")]
pub mod server;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};

#[cfg(feature = "aws")]
pub use adapters::{notify::SesNotifier, store::dynamo::DynamoLotStore};

pub use adapters::alphavantage::{AlphaVantageClient, CachedMarketData};
pub use adapters::returns_client::RemoteReturns;
pub use adapters::store::{LocalLotStore, MemoryLotStore};
pub use config::TrackerConfig;
pub use core::{
    ledger::{BuyOrder, Ledger, SellOrder},
    returns::ReturnsService,
};
pub use utils::error::{Result, TrackerError};

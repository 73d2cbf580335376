// Adapters layer: concrete implementations for external systems (market data, storage, mail).

pub mod alphavantage;
pub mod notify;
pub mod returns_client;
pub mod store;

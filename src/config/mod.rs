#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "aws")]
pub mod lambda;

use crate::adapters::alphavantage::{
    AlphaVantageClient, CachedMarketData, DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY,
};
use crate::adapters::returns_client::RemoteReturns;
use crate::adapters::store::LocalLotStore;
use crate::core::returns::{ReturnsService, DEFAULT_BASELINE_TICKER};
use crate::core::{MarketData, ReturnsCalculator};
pub use crate::domain::model::Recipient;
use crate::utils::error::{Result, TrackerError};
use crate::utils::validation::{
    validate_email, validate_non_empty_string, validate_path, validate_range, validate_ticker,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub alphavantage: AlphaVantageConfig,
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaVantageConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_delay_secs: u64,
    pub cache_ttl_secs: u64,
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_delay_secs: DEFAULT_REQUEST_DELAY.as_secs(),
            cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Local,
    Dynamodb,
}

impl std::str::FromStr for LedgerBackend {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dynamodb" | "dynamo" => Ok(Self::Dynamodb),
            other => Err(TrackerError::InvalidConfigValueError {
                field: "ledger.backend".to_string(),
                value: other.to_string(),
                reason: "expected 'local' or 'dynamodb'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// JSON file used by the local backend.
    pub path: String,
    pub table_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Local,
            path: "./ledger.json".to_string(),
            table_name: "securities".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Deployed returns service; returns are computed in-process when unset.
    pub returns_api_url: Option<String>,
    pub baseline_ticker: String,
    pub sender: Option<String>,
    pub recipients: Vec<Recipient>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            returns_api_url: None,
            baseline_ticker: DEFAULT_BASELINE_TICKER.to_string(),
            sender: None,
            recipients: Vec::new(),
        }
    }
}

/// `user_a=a@example.com,user_b=b@example.com`
pub fn parse_recipients(value: &str) -> Result<Vec<Recipient>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (user_id, email) =
                entry
                    .split_once('=')
                    .ok_or_else(|| TrackerError::InvalidConfigValueError {
                        field: "REPORT_RECIPIENTS".to_string(),
                        value: entry.to_string(),
                        reason: "expected user_id=email".to_string(),
                    })?;
            Ok(Recipient {
                user_id: user_id.trim().to_string(),
                email: email.trim().to_string(),
            })
        })
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TrackerError::InvalidConfigValueError {
            field: name.to_string(),
            value: value.to_string(),
            reason: "could not be parsed".to_string(),
        })
}

impl TrackerConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        tracing::debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_toml_str(&content, |name| std::env::var(name).ok())
    }

    pub fn from_toml_str(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let processed = substitute_vars(content, lookup)?;
        toml::from_str(&processed)
            .map_err(|e| TrackerError::config(format!("TOML parsing error: {}", e)))
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup("AV_API_KEY") {
            self.alphavantage.api_key = Some(key);
        }
        if let Some(url) = lookup("AV_BASE_URL") {
            self.alphavantage.base_url = url;
        }
        if let Some(delay) = lookup("AV_REQUEST_DELAY_SECS") {
            self.alphavantage.request_delay_secs = parse_env("AV_REQUEST_DELAY_SECS", &delay)?;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(backend) = lookup("LEDGER_BACKEND") {
            self.ledger.backend = backend.parse()?;
        }
        if let Some(path) = lookup("LEDGER_PATH") {
            self.ledger.path = path;
        }
        if let Some(table) = lookup("TABLE_NAME") {
            self.ledger.table_name = table;
        }
        if let Some(url) = lookup("RETURNS_API_URL") {
            self.report.returns_api_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(ticker) = lookup("BASELINE_TICKER") {
            self.report.baseline_ticker = ticker;
        }
        if let Some(sender) = lookup("SENDER_EMAIL") {
            self.report.sender = Some(sender);
        }
        if let Some(recipients) = lookup("REPORT_RECIPIENTS") {
            self.report.recipients = parse_recipients(&recipients)?;
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.alphavantage
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TrackerError::MissingConfigError {
                field: "AV_API_KEY".to_string(),
            })
    }

    pub fn market_data(&self) -> Result<Arc<dyn MarketData>> {
        let client = AlphaVantageClient::with_options(
            self.require_api_key()?,
            self.alphavantage.base_url.clone(),
            Duration::from_secs(self.alphavantage.request_delay_secs),
        );
        Ok(Arc::new(CachedMarketData::new(
            client,
            Duration::from_secs(self.alphavantage.cache_ttl_secs),
        )))
    }

    pub fn returns_service(&self) -> Result<ReturnsService> {
        Ok(ReturnsService::with_baseline(
            self.market_data()?,
            self.report.baseline_ticker.clone(),
        ))
    }

    /// Remote service when `returns_api_url` is set, in-process otherwise.
    pub fn returns_calculator(&self) -> Result<Arc<dyn ReturnsCalculator>> {
        match &self.report.returns_api_url {
            Some(url) => {
                tracing::info!("Using returns service at {}", url);
                Ok(Arc::new(RemoteReturns::new(url.clone())))
            }
            None => Ok(Arc::new(self.returns_service()?)),
        }
    }

    pub fn local_store(&self) -> LocalLotStore {
        LocalLotStore::new(&self.ledger.path)
    }

    /// Extra checks for sending reports by mail.
    pub fn validate_delivery(&self) -> Result<()> {
        let sender = self
            .report
            .sender
            .as_deref()
            .ok_or_else(|| TrackerError::MissingConfigError {
                field: "SENDER_EMAIL".to_string(),
            })?;
        validate_email("report.sender", sender)?;
        if self.report.recipients.is_empty() {
            return Err(TrackerError::MissingConfigError {
                field: "REPORT_RECIPIENTS".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for TrackerConfig {
    fn validate(&self) -> Result<()> {
        validate_url("alphavantage.base_url", &self.alphavantage.base_url)?;
        validate_range(
            "alphavantage.request_delay_secs",
            self.alphavantage.request_delay_secs,
            0,
            600,
        )?;

        match self.ledger.backend {
            LedgerBackend::Local => validate_path("ledger.path", &self.ledger.path)?,
            LedgerBackend::Dynamodb => {
                validate_non_empty_string("ledger.table_name", &self.ledger.table_name)?
            }
        }

        validate_non_empty_string("server.host", &self.server.host)?;
        validate_range("server.port", self.server.port, 1, u16::MAX)?;

        if let Some(url) = &self.report.returns_api_url {
            validate_url("report.returns_api_url", url)?;
        }
        validate_ticker("report.baseline_ticker", &self.report.baseline_ticker)?;
        if let Some(sender) = &self.report.sender {
            validate_email("report.sender", sender)?;
        }
        for recipient in &self.report.recipients {
            validate_non_empty_string("report.recipients.user_id", &recipient.user_id)?;
            validate_email("report.recipients.email", &recipient.email)?;
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}

/// Replace `${VAR}` placeholders; an unset variable is an error.
fn substitute_vars(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| TrackerError::config(e.to_string()))?;

    let mut missing = Vec::new();
    let result = re.replace_all(content, |caps: &regex::Captures| {
        let name = &caps[1];
        lookup(name).unwrap_or_else(|| {
            missing.push(name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        return Err(TrackerError::config(format!(
            "undefined environment variables: {}",
            missing.join(", ")
        )));
    }
    Ok(result.into_owned())
}

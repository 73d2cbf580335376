use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Market data error for {symbol}: {message}")]
    MarketDataError { symbol: String, message: String },

    #[error("No price data for {symbol} on or after {date}")]
    NoPriceData { symbol: String, date: String },

    #[error("Lot already exists for user={user_id}, skey={skey}")]
    LotExists { user_id: String, skey: String },

    #[error("No record for user={user_id}, skey={skey}")]
    LotNotFound { user_id: String, skey: String },

    #[error("Sold more shares than were bought. Sold:{sold} out of bought:{bought}")]
    Oversold { sold: f64, bought: f64 },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Notification error: {message}")]
    NotificationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Input,
    MarketData,
    Ledger,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TrackerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError(_) => ErrorCategory::Network,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::ValidationError { .. } | Self::SerializationError(_) | Self::CsvError(_) => {
                ErrorCategory::Input
            }
            Self::MarketDataError { .. } | Self::NoPriceData { .. } => ErrorCategory::MarketData,
            Self::LotExists { .. } | Self::LotNotFound { .. } | Self::Oversold { .. } => {
                ErrorCategory::Ledger
            }
            Self::IoError(_) | Self::StorageError { .. } | Self::NotificationError { .. } => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::MarketData => ErrorSeverity::Medium,
            ErrorCategory::Input | ErrorCategory::Ledger => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ApiError(_) => {
                "Check network connectivity and that the remote API is reachable"
            }
            Self::MarketDataError { .. } => {
                "The market data API may be rate limiting; wait a minute and retry, and verify AV_API_KEY"
            }
            Self::NoPriceData { .. } => {
                "Use a date on which the market was open, or request the full price history"
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => {
                "Review the configuration file and environment variables"
            }
            Self::ValidationError { .. } => {
                "Check the values passed on the command line or in the request"
            }
            Self::SerializationError(_) | Self::CsvError(_) => "Check the input data format",
            Self::LotExists { .. } => {
                "A lot for this security and purchase date is already recorded"
            }
            Self::LotNotFound { .. } => "Run `tracker list <user>` to see the recorded lots",
            Self::Oversold { .. } => "Reduce the number of shares sold from this lot",
            Self::IoError(_) => "Check file permissions and available disk space",
            Self::StorageError { .. } => "Check the ledger backend credentials and table name",
            Self::NotificationError { .. } => "Check the sender identity and recipient addresses",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ApiError(e) => format!("Could not reach the remote service: {}", e),
            Self::MarketDataError { symbol, .. } => {
                format!("Market data for {} is unavailable right now", symbol)
            }
            other => other.to_string(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

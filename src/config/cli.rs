use crate::utils::validation;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    validation::parse_date("date", value).map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "tracker")]
#[command(about = "Track security purchases and compare their returns against a baseline fund")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every purchase lot of a user
    List { user: String },

    /// Record a purchase
    Buy {
        user: String,
        /// Ticker symbol for the security
        #[arg(long)]
        security: String,
        /// Amount of shares bought
        #[arg(long)]
        n_shares: f64,
        /// Total price paid
        #[arg(long)]
        price: f64,
        /// YYYY-MM-DD of the purchase, defaults to today
        #[arg(long, value_parser = parse_date)]
        purchase_date: Option<NaiveDate>,
        /// First YYYY-MM-DD eligible for dividends, defaults to the purchase date
        #[arg(long, value_parser = parse_date)]
        first_dividend_date: Option<NaiveDate>,
        /// Dividends are reinvested into the same security
        #[arg(long)]
        reinvest: bool,
    },

    /// Record a sale from an existing lot
    Sell {
        user: String,
        #[arg(long)]
        security: String,
        #[arg(long)]
        n_shares: f64,
        /// Total price received
        #[arg(long)]
        price: f64,
        /// YYYY-MM-DD the lot was bought
        #[arg(long, value_parser = parse_date)]
        purchase_date: NaiveDate,
        /// YYYY-MM-DD of the sale, defaults to today
        #[arg(long, value_parser = parse_date)]
        sell_date: Option<NaiveDate>,
    },

    /// Show the latest quote and daily change of a security
    Quote { symbol: String },

    /// Fetch the daily price history of a security
    History {
        symbol: String,
        /// Whole history instead of the last 100 trading days
        #[arg(long)]
        full: bool,
        /// Write the history as CSV to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Current value of an investment and the baseline comparison
    Returns {
        #[arg(long)]
        ticker: String,
        #[arg(long, value_parser = parse_date)]
        start_date: NaiveDate,
        /// Amount invested
        #[arg(long)]
        start_value: f64,
        #[arg(long)]
        start_shares: f64,
        #[arg(long)]
        reinvest: bool,
    },

    /// Print the portfolio report of a user
    Report { user: String },

    /// Serve the returns HTTP API
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

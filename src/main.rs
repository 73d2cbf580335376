use clap::Parser;
use investment_tracker::adapters::notify::LogNotifier;
use investment_tracker::config::LedgerBackend;
use investment_tracker::core::report::{deliver_reports, report_subject};
use investment_tracker::core::{LotStore, ReturnsCalculator};
use investment_tracker::domain::model::{BaselineRequest, Recipient, ReturnsRequest};
use investment_tracker::server::{self, AppState};
use investment_tracker::utils::{logger, validation::Validate};
use investment_tracker::{
    BuyOrder, Cli, Command, Ledger, Result, SellOrder, TrackerConfig, TrackerError,
};
use std::net::SocketAddr;
use std::sync::Arc;

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logger::init_cli_logger(cli.verbose);
    tracing::debug!("CLI arguments: {:?}", cli);

    let config = match TrackerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(e),
    };
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        fail(e);
    }

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(
            "Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        fail(e);
    }
}

fn fail(e: TrackerError) -> ! {
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

async fn run(command: Command, config: TrackerConfig) -> Result<()> {
    match command {
        Command::Quote { symbol } => {
            let quote = config.market_data()?.quote(&symbol).await?;
            println!("{}: {}", quote.symbol, quote.summary());
            Ok(())
        }
        Command::History {
            symbol,
            full,
            output,
        } => {
            let series = config.market_data()?.daily_series(&symbol, full).await?;
            if series.is_empty() {
                tracing::warn!("No daily prices returned for {}", symbol);
            }
            let csv = series.to_csv()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    println!("📁 {} daily prices saved to {}", series.len(), path.display());
                }
                None => print!("{}", csv),
            }
            Ok(())
        }
        Command::Returns {
            ticker,
            start_date,
            start_value,
            start_shares,
            reinvest,
        } => {
            let service = config.returns_service()?;
            let security = service
                .security_returns(&ReturnsRequest {
                    ticker,
                    start_date,
                    start_value,
                    start_shares,
                    reinvest,
                })
                .await?;
            let baseline = service
                .baseline_returns(&BaselineRequest {
                    start_date,
                    start_value,
                })
                .await?;

            println!(
                "{:<6} value {:>12.2}  change {:>8.3}%",
                security.stock,
                security.value,
                security.percent_change * 100.0
            );
            println!(
                "{:<6} value {:>12.2}  change {:>8.3}%",
                baseline.stock,
                baseline.value,
                baseline.percent_change * 100.0
            );
            Ok(())
        }
        Command::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{}:{}", config.server.host, port)
                .parse()
                .map_err(|e| TrackerError::InvalidConfigValueError {
                    field: "server.host".to_string(),
                    value: config.server.host.clone(),
                    reason: format!("{}", e),
                })?;

            let service = config.returns_service()?;
            let baseline_ticker = service.baseline_ticker().to_string();
            let state = Arc::new(AppState::new(Arc::new(service), baseline_ticker));
            tokio::select! {
                result = server::serve(state, addr) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                    Ok(())
                }
            }
        }
        command => match config.ledger.backend {
            LedgerBackend::Local => run_with_store(config.local_store(), command, &config).await,
            #[cfg(feature = "aws")]
            LedgerBackend::Dynamodb => {
                use investment_tracker::config::lambda;
                let sdk_config = lambda::load_aws_config().await;
                let store = lambda::dynamo_store(&sdk_config, &config);
                run_with_store(store, command, &config).await
            }
            #[cfg(not(feature = "aws"))]
            LedgerBackend::Dynamodb => Err(TrackerError::config(
                "the dynamodb ledger needs a build with the `aws` feature",
            )),
        },
    }
}

async fn run_with_store<S: LotStore>(
    store: S,
    command: Command,
    config: &TrackerConfig,
) -> Result<()> {
    match command {
        Command::List { user } => {
            let lots = Ledger::new(store, user).list_all().await?;
            if lots.is_empty() {
                println!("No lots recorded");
            }
            for lot in lots {
                println!("{}", lot);
            }
        }
        Command::Buy {
            user,
            security,
            n_shares,
            price,
            purchase_date,
            first_dividend_date,
            reinvest,
        } => {
            let lot = Ledger::new(store, user)
                .buy(BuyOrder {
                    security,
                    n_shares,
                    price,
                    purchase_date: purchase_date.unwrap_or_else(today),
                    first_dividend_date,
                    reinvest,
                })
                .await?;
            println!("✅ Bought {}", lot);
        }
        Command::Sell {
            user,
            security,
            n_shares,
            price,
            purchase_date,
            sell_date,
        } => {
            let lot = Ledger::new(store, user)
                .sell(SellOrder {
                    security,
                    n_shares,
                    price,
                    purchase_date,
                    sell_date: sell_date.unwrap_or_else(today),
                })
                .await?;
            println!(
                "✅ Sold {} shares, {} remaining in {}",
                n_shares,
                lot.remaining_shares(),
                lot.skey
            );
        }
        Command::Report { user } => {
            let calculator = config.returns_calculator()?;
            let recipient = Recipient {
                email: user.clone(),
                user_id: user,
            };
            deliver_reports(
                &[recipient],
                &report_subject(today()),
                &store,
                calculator.as_ref(),
                &LogNotifier,
            )
            .await?;
        }
        other => {
            return Err(TrackerError::validation(format!(
                "{:?} does not use the ledger",
                other
            )))
        }
    }
    Ok(())
}

use chrono::NaiveDate;
use httpmock::prelude::*;
use investment_tracker::core::report::{build_portfolio, render_report, REPORT_HEADER};
use investment_tracker::core::{LotStore, ReturnsCalculator};
use investment_tracker::domain::model::{BaselineRequest, ReturnsRequest, ReturnsResult};
use investment_tracker::server::{self, AppState};
use investment_tracker::{
    BuyOrder, Ledger, LocalLotStore, RemoteReturns, ReturnsService, SellOrder, TrackerConfig,
    TrackerError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn day(close: &str, dividend: &str) -> Value {
    json!({
        "1. open": close, "2. high": close, "3. low": close, "4. close": close,
        "5. adjusted close": close, "6. volume": "1000000",
        "7. dividend amount": dividend, "8. split coefficient": "1.0"
    })
}

/// AlphaVantage stand-in serving two days of SBUX and of the baseline fund.
fn mock_alphavantage(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/query")
            .query_param("function", "TIME_SERIES_DAILY_ADJUSTED")
            .query_param("symbol", "SBUX");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(json!({
                "Meta Data": {"2. Symbol": "SBUX"},
                "Time Series (Daily)": {
                    "2020-07-20": day("77.00", "0.0000"),
                    "2020-07-21": day("78.00", "0.4100")
                }
            }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/query")
            .query_param("function", "TIME_SERIES_DAILY_ADJUSTED")
            .query_param("symbol", "FXAIX");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(json!({
                "Meta Data": {"2. Symbol": "FXAIX"},
                "Time Series (Daily)": {
                    "2020-07-20": day("100.00", "0.0000"),
                    "2020-07-21": day("110.00", "0.0000")
                }
            }));
    });
}

fn config_for(server: &MockServer) -> TrackerConfig {
    let mut config = TrackerConfig::default();
    config.alphavantage.api_key = Some("demo".to_string());
    config.alphavantage.base_url = server.url("/query");
    config.alphavantage.request_delay_secs = 0;
    config
}

async fn start_service(service: ReturnsService) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(Arc::new(service), "FXAIX"));
    tokio::spawn(server::serve_listener(state, listener));
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_returns_endpoints_over_http() {
    let av = MockServer::start();
    mock_alphavantage(&av);
    let base = start_service(config_for(&av).returns_service().unwrap()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/returns/", base))
        .json(&json!({
            "ticker": "SBUX",
            "start_date": "2020-07-20",
            "start_value": 770.0,
            "start_shares": 10.0,
            "reinvest": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let result: ReturnsResult = response.json().await.unwrap();
    assert_eq!(result.stock, "SBUX");
    assert!((result.value - 784.1).abs() < 1e-9);
    assert!((result.percent_change - 14.1 / 770.0).abs() < 1e-12);

    let response = client
        .post(format!("{}/returns-baseline/", base))
        .json(&json!({"start_date": "2020-07-20", "start_value": 1000.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let result: ReturnsResult = response.json().await.unwrap();
    assert_eq!(result.stock, "FXAIX");
    assert!((result.value - 1100.0).abs() < 1e-9);

    // a weekend has no close to buy at
    let response = client
        .post(format!("{}/returns-baseline/", base))
        .json(&json!({"start_date": "2020-07-18", "start_value": 1000.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .post(format!("{}/returns/", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("Nothing to see!"));
}

#[tokio::test]
async fn test_malformed_upstream_payload_is_bad_gateway() {
    let av = MockServer::start();
    av.mock(|when, then| {
        when.method(GET).path("/query");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(json!({"Time Series (Daily)": {"2020-07-20": {"1. open": "1.0"}}}));
    });
    let base = start_service(config_for(&av).returns_service().unwrap()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/returns/", base))
        .json(&json!({
            "ticker": "SBUX",
            "start_date": "2020-07-20",
            "start_value": 770.0,
            "start_shares": 10.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_remote_returns_against_running_service() {
    let av = MockServer::start();
    mock_alphavantage(&av);
    let base = start_service(config_for(&av).returns_service().unwrap()).await;

    let remote = RemoteReturns::new(format!("{}/", base));
    let result = remote
        .security_returns(&ReturnsRequest {
            ticker: "SBUX".to_string(),
            start_date: date("2020-07-21"),
            start_value: 780.0,
            start_shares: 10.0,
            reinvest: false,
        })
        .await
        .unwrap();
    assert!((result.value - 784.1).abs() < 1e-9);

    let err = remote
        .baseline_returns(&BaselineRequest {
            start_date: date("2020-07-18"),
            start_value: 100.0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::ApiError(_)));
}

#[tokio::test]
async fn test_ledger_and_report_with_local_store() {
    let av = MockServer::start();
    mock_alphavantage(&av);
    let temp_dir = TempDir::new().unwrap();
    let ledger_path = temp_dir.path().join("ledger.json");

    let ledger = Ledger::new(LocalLotStore::new(&ledger_path), "user_0");
    ledger
        .buy(BuyOrder {
            security: "SBUX".to_string(),
            n_shares: 10.0,
            price: 770.0,
            purchase_date: date("2020-07-20"),
            first_dividend_date: None,
            reinvest: true,
        })
        .await
        .unwrap();
    ledger
        .sell(SellOrder {
            security: "SBUX".to_string(),
            n_shares: 5.0,
            price: 390.0,
            purchase_date: date("2020-07-20"),
            sell_date: date("2020-07-21"),
        })
        .await
        .unwrap();

    let oversold = ledger
        .sell(SellOrder {
            security: "SBUX".to_string(),
            n_shares: 6.0,
            price: 470.0,
            purchase_date: date("2020-07-20"),
            sell_date: date("2020-07-21"),
        })
        .await;
    assert!(matches!(oversold, Err(TrackerError::Oversold { .. })));

    // a fresh handle sees what was persisted, without the rejected sale
    let lots = LocalLotStore::new(&ledger_path).list("user_0").await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].remaining_shares(), 5.0);
    assert_eq!(lots[0].sold.full_history.len(), 1);

    let service = config_for(&av).returns_service().unwrap();
    let holdings = build_portfolio(&lots, &service).await.unwrap();
    let report = render_report(&holdings);
    let lines: Vec<&str> = report.lines().collect();

    assert_eq!(lines[0], REPORT_HEADER);
    assert_eq!(
        lines[1],
        "SBUX  |        392.05 |          7.05 |           1.831 |          -8.169"
    );
}

#[tokio::test]
async fn test_duplicate_purchase_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Ledger::new(LocalLotStore::new(temp_dir.path().join("ledger.json")), "user_0");
    let order = BuyOrder {
        security: "VOO".to_string(),
        n_shares: 2.0,
        price: 600.0,
        purchase_date: date("2020-07-21"),
        first_dividend_date: Some(date("2020-07-22")),
        reinvest: false,
    };

    tokio_test::assert_ok!(ledger.buy(order.clone()).await);
    let err = ledger.buy(order).await.unwrap_err();
    assert!(matches!(err, TrackerError::LotExists { .. }));
    assert_eq!(ledger.list_all().await.unwrap().len(), 1);
}

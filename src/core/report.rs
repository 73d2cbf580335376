use crate::core::{LotStore, Notifier, ReturnsCalculator};
use crate::domain::model::{BaselineRequest, Lot, Recipient, ReturnsRequest};
use crate::utils::error::Result;
use chrono::NaiveDate;

pub const REPORT_HEADER: &str =
    "Stock | Current Value |  Net Returns  | Percent Returns | S&P500 Beat";

/// Aggregated position in one security across all open lots.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    /// Cost basis of the shares still held.
    pub start: f64,
    pub end: f64,
    /// Value had the same money gone into the baseline fund.
    pub baseline_end: f64,
}

impl Holding {
    fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            start: 0.0,
            end: 0.0,
            baseline_end: 0.0,
        }
    }

    pub fn net_returns(&self) -> f64 {
        self.end - self.start
    }

    pub fn percent_returns(&self) -> f64 {
        self.net_returns() / self.start * 100.0
    }

    pub fn baseline_percent_returns(&self) -> f64 {
        (self.baseline_end - self.start) / self.start * 100.0
    }

    /// Percentage points by which the holding beat the baseline.
    pub fn baseline_beat(&self) -> f64 {
        self.percent_returns() - self.baseline_percent_returns()
    }
}

/// Price every lot that still has shares and group by ticker, in first-seen order.
pub async fn build_portfolio(
    lots: &[Lot],
    calculator: &dyn ReturnsCalculator,
) -> Result<Vec<Holding>> {
    let mut holdings: Vec<Holding> = Vec::new();

    for lot in lots {
        let remaining = lot.remaining_shares();
        if remaining <= 0.0 {
            tracing::debug!("Skipping closed lot {}", lot.skey);
            continue;
        }
        tracing::info!("Pricing lot {}", lot.skey);

        // cost basis of what is still held
        let price = lot.price * (remaining / lot.n_shares);

        let security = calculator
            .security_returns(&ReturnsRequest {
                ticker: lot.ticker.clone(),
                start_date: lot.first_dividend_date,
                start_value: price,
                start_shares: remaining,
                reinvest: lot.reinvest,
            })
            .await?;
        let baseline = calculator
            .baseline_returns(&BaselineRequest {
                start_date: lot.purchase_date,
                start_value: price,
            })
            .await?;

        let index = match holdings.iter().position(|h| h.ticker == lot.ticker) {
            Some(index) => index,
            None => {
                holdings.push(Holding::new(&lot.ticker));
                holdings.len() - 1
            }
        };
        let holding = &mut holdings[index];
        holding.start += price;
        holding.end += security.value;
        holding.baseline_end += baseline.value;
    }

    Ok(holdings)
}

pub fn render_report(holdings: &[Holding]) -> String {
    let mut message = format!("{}\n", REPORT_HEADER);
    for h in holdings {
        message.push_str(&format!(
            "{:<5} | {:13.2} | {:13.2} | {:15.3} | {:15.3}\n",
            h.ticker,
            h.end,
            h.net_returns(),
            h.percent_returns(),
            h.baseline_beat()
        ));
    }
    message
}

pub fn report_subject(date: NaiveDate) -> String {
    format!("Stock Update - {}", date.format("%Y-%m-%d"))
}

/// Build and send one report per recipient.
///
/// A failure for one recipient does not stop the others; the last error is
/// returned once every recipient was tried.
pub async fn deliver_reports<S: LotStore>(
    recipients: &[Recipient],
    subject: &str,
    store: &S,
    calculator: &dyn ReturnsCalculator,
    notifier: &dyn Notifier,
) -> Result<usize> {
    let mut sent = 0;
    let mut last_error = None;

    for recipient in recipients {
        let result = async {
            let lots = store.list(&recipient.user_id).await?;
            let holdings = build_portfolio(&lots, calculator).await?;
            notifier
                .send(&recipient.email, subject, &render_report(&holdings))
                .await
        }
        .await;

        match result {
            Ok(()) => sent += 1,
            Err(e) => {
                tracing::error!(
                    "Report for {} failed: {} (Category: {:?}, Severity: {:?})",
                    recipient.user_id,
                    e,
                    e.category(),
                    e.severity()
                );
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(sent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryLotStore;
    use crate::domain::model::{ReturnsResult, SoldSummary};
    use crate::utils::error::TrackerError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Security grows 10%, baseline grows 5%; records every request.
    #[derive(Default)]
    struct FlatGrowth {
        security_requests: Mutex<Vec<ReturnsRequest>>,
        baseline_requests: Mutex<Vec<BaselineRequest>>,
    }

    #[async_trait]
    impl ReturnsCalculator for FlatGrowth {
        async fn security_returns(&self, request: &ReturnsRequest) -> Result<ReturnsResult> {
            self.security_requests.lock().unwrap().push(request.clone());
            Ok(ReturnsResult {
                stock: request.ticker.clone(),
                value: request.start_value * 1.1,
                percent_change: 0.1,
            })
        }

        async fn baseline_returns(&self, request: &BaselineRequest) -> Result<ReturnsResult> {
            self.baseline_requests.lock().unwrap().push(request.clone());
            Ok(ReturnsResult {
                stock: "FXAIX".to_string(),
                value: request.start_value * 1.05,
                percent_change: 0.05,
            })
        }
    }

    fn lot(ticker: &str, purchased: &str, n_shares: f64, price: f64, sold: f64) -> Lot {
        Lot {
            user_id: "user_0".to_string(),
            skey: Lot::sort_key(ticker, date(purchased)),
            ticker: ticker.to_string(),
            n_shares,
            price,
            purchase_date: date(purchased),
            first_dividend_date: date("2020-08-01"),
            reinvest: true,
            sold: SoldSummary {
                short_term_shares: sold,
                ..SoldSummary::default()
            },
        }
    }

    #[tokio::test]
    async fn test_portfolio_aggregates_open_lots() {
        let lots = vec![
            lot("SBUX", "2020-07-20", 10.0, 1000.0, 5.0),
            lot("VOO", "2020-07-21", 2.0, 600.0, 2.0),
            lot("SBUX", "2020-07-22", 10.0, 1000.0, 0.0),
        ];
        let calculator = FlatGrowth::default();

        let holdings = build_portfolio(&lots, &calculator).await.unwrap();

        assert_eq!(holdings.len(), 1);
        let sbux = &holdings[0];
        assert_eq!(sbux.ticker, "SBUX");
        assert!((sbux.start - 1500.0).abs() < 1e-9);
        assert!((sbux.end - 1650.0).abs() < 1e-9);
        assert!((sbux.baseline_end - 1575.0).abs() < 1e-9);
        assert!((sbux.percent_returns() - 10.0).abs() < 1e-9);
        assert!((sbux.baseline_beat() - 5.0).abs() < 1e-9);

        let security_requests = calculator.security_requests.lock().unwrap();
        assert_eq!(security_requests[0].start_shares, 5.0);
        assert_eq!(security_requests[0].start_date, date("2020-08-01"));
        assert!(security_requests[0].reinvest);
        let baseline_requests = calculator.baseline_requests.lock().unwrap();
        assert_eq!(baseline_requests[0].start_date, date("2020-07-20"));
    }

    #[test]
    fn test_render_report_layout() {
        let holdings = vec![Holding {
            ticker: "SBUX".to_string(),
            start: 1000.0,
            end: 1100.0,
            baseline_end: 1050.0,
        }];
        let report = render_report(&holdings);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], REPORT_HEADER);
        assert_eq!(
            lines[1],
            "SBUX  |       1100.00 |        100.00 |          10.000 |           5.000"
        );
    }

    #[test]
    fn test_report_subject() {
        assert_eq!(report_subject(date("2020-08-03")), "Stock Update - 2020-08-03");
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
            if recipient.starts_with("bounce") {
                return Err(TrackerError::NotificationError {
                    message: "mailbox unavailable".to_string(),
                });
            }
            self.sent.lock().unwrap().push((
                recipient.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    fn recipient(user_id: &str, email: &str) -> Recipient {
        Recipient {
            user_id: user_id.to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_deliver_reports_per_recipient() {
        let store = MemoryLotStore::new();
        store
            .insert_new(&lot("SBUX", "2020-07-20", 10.0, 1000.0, 0.0))
            .await
            .unwrap();
        let outbox = Outbox::default();
        let recipients = vec![
            recipient("user_0", "a@example.com"),
            recipient("user_1", "b@example.com"),
        ];

        let sent = deliver_reports(
            &recipients,
            "Stock Update - 2020-08-03",
            &store,
            &FlatGrowth::default(),
            &outbox,
        )
        .await
        .unwrap();

        assert_eq!(sent, 2);
        let mails = outbox.sent.lock().unwrap();
        assert_eq!(mails[0].0, "a@example.com");
        assert!(mails[0].2.contains("SBUX"));
        // user_1 has no lots: header only
        assert_eq!(mails[1].2, format!("{}\n", REPORT_HEADER));
    }

    #[tokio::test]
    async fn test_deliver_reports_continues_after_failure() {
        let store = MemoryLotStore::new();
        let outbox = Outbox::default();
        let recipients = vec![
            recipient("user_0", "bounce@example.com"),
            recipient("user_1", "b@example.com"),
        ];

        let err = deliver_reports(&recipients, "subject", &store, &FlatGrowth::default(), &outbox)
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::NotificationError { .. }));
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }
}

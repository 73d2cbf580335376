use crate::core::LotStore;
use crate::domain::model::{add_one_calendar_year, Lot, SaleEvent, SoldSummary};
use crate::utils::error::{Result, TrackerError};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_amount, validate_ticker,
};
use chrono::NaiveDate;

/// Purchase to record with [`Ledger::buy`].
#[derive(Debug, Clone)]
pub struct BuyOrder {
    pub security: String,
    pub n_shares: f64,
    pub price: f64,
    pub purchase_date: NaiveDate,
    /// Defaults to `purchase_date`.
    pub first_dividend_date: Option<NaiveDate>,
    pub reinvest: bool,
}

/// Sale from an existing lot.
#[derive(Debug, Clone)]
pub struct SellOrder {
    pub security: String,
    pub n_shares: f64,
    pub price: f64,
    pub purchase_date: NaiveDate,
    pub sell_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingTerm {
    Short,
    Long,
}

/// A sale is long-term only when it happens strictly after the first
/// anniversary of the purchase.
pub fn holding_term(purchase_date: NaiveDate, sell_date: NaiveDate) -> HoldingTerm {
    if sell_date > add_one_calendar_year(purchase_date) {
        HoldingTerm::Long
    } else {
        HoldingTerm::Short
    }
}

/// Buy/sell tracking of one user's lots.
pub struct Ledger<S: LotStore> {
    store: S,
    user_id: String,
}

impl<S: LotStore> Ledger<S> {
    pub fn new(store: S, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Lot>> {
        self.store.list(&self.user_id).await
    }

    pub async fn buy(&self, order: BuyOrder) -> Result<Lot> {
        validate_non_empty_string("user", &self.user_id)?;
        validate_ticker("security", &order.security)?;
        validate_positive_amount("n_shares", order.n_shares)?;
        validate_positive_amount("price", order.price)?;

        let first_dividend_date = order.first_dividend_date.unwrap_or(order.purchase_date);
        if first_dividend_date < order.purchase_date {
            return Err(TrackerError::validation(
                "first_dividend_date cannot be before purchase_date",
            ));
        }

        let lot = Lot {
            user_id: self.user_id.clone(),
            skey: Lot::sort_key(&order.security, order.purchase_date),
            ticker: order.security,
            n_shares: order.n_shares,
            price: order.price,
            purchase_date: order.purchase_date,
            first_dividend_date,
            reinvest: order.reinvest,
            sold: SoldSummary::default(),
        };

        self.store.insert_new(&lot).await?;
        tracing::info!("Recorded purchase {}", lot);
        Ok(lot)
    }

    pub async fn sell(&self, order: SellOrder) -> Result<Lot> {
        validate_ticker("security", &order.security)?;
        validate_positive_amount("n_shares", order.n_shares)?;
        if !order.price.is_finite() || order.price < 0.0 {
            return Err(TrackerError::validation("price cannot be negative"));
        }
        if order.sell_date < order.purchase_date {
            return Err(TrackerError::validation(
                "sell_date cannot be before purchase_date",
            ));
        }

        let skey = Lot::sort_key(&order.security, order.purchase_date);
        let mut lot = self
            .store
            .get(&self.user_id, &skey)
            .await?
            .ok_or_else(|| TrackerError::LotNotFound {
                user_id: self.user_id.clone(),
                skey: skey.clone(),
            })?;

        let sold = &mut lot.sold;
        match holding_term(order.purchase_date, order.sell_date) {
            HoldingTerm::Long => {
                sold.long_term_shares += order.n_shares;
                sold.total_price_long += order.price;
            }
            HoldingTerm::Short => {
                sold.short_term_shares += order.n_shares;
                sold.total_price_short += order.price;
            }
        }
        sold.full_history.push(SaleEvent {
            date: order.sell_date,
            n_shares: order.n_shares,
            price: order.price,
        });

        let total_sold = lot.sold.total_shares();
        if total_sold > lot.n_shares {
            return Err(TrackerError::Oversold {
                sold: total_sold,
                bought: lot.n_shares,
            });
        }

        self.store.put(&lot).await?;
        tracing::info!(
            "Recorded sale of {} {} from {} ({} remaining)",
            order.n_shares,
            lot.ticker,
            lot.skey,
            lot.remaining_shares()
        );
        Ok(lot)
    }
}

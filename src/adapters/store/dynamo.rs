use crate::core::LotStore;
use crate::domain::model::{Lot, SaleEvent, SoldSummary};
use crate::utils::error::{Result, TrackerError};
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::NaiveDate;
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

/// Lots in a DynamoDB table with partition key `pkey` (user id) and sort key `skey`.
#[derive(Debug, Clone)]
pub struct DynamoLotStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoLotStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

fn storage_error(action: &str, err: impl std::fmt::Display) -> TrackerError {
    TrackerError::StorageError {
        message: format!("DynamoDB {} failed: {}", action, err),
    }
}

impl LotStore for DynamoLotStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Lot>> {
        let mut lots = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("pkey = :pkey")
                .expression_attribute_values(":pkey", AttributeValue::S(user_id.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| storage_error("query", e))?;

            for item in output.items() {
                lots.push(item_to_lot(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::debug!("Loaded {} lots for {}", lots.len(), user_id);
        Ok(lots)
    }

    async fn get(&self, user_id: &str, skey: &str) -> Result<Option<Lot>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("pkey", AttributeValue::S(user_id.to_string()))
            .key("skey", AttributeValue::S(skey.to_string()))
            .send()
            .await
            .map_err(|e| storage_error("get_item", e))?;

        output.item().map(item_to_lot).transpose()
    }

    async fn insert_new(&self, lot: &Lot) -> Result<()> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(lot_to_item(lot)))
            .condition_expression("attribute_not_exists(skey)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match err.into_service_error() {
                PutItemError::ConditionalCheckFailedException(_) => Err(TrackerError::LotExists {
                    user_id: lot.user_id.clone(),
                    skey: lot.skey.clone(),
                }),
                other => Err(storage_error("put_item", other)),
            },
        }
    }

    async fn put(&self, lot: &Lot) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(lot_to_item(lot)))
            .send()
            .await
            .map_err(|e| storage_error("put_item", e))?;
        Ok(())
    }
}

fn n(value: f64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn date_attr(date: NaiveDate) -> AttributeValue {
    s(date.format("%Y-%m-%d").to_string())
}

pub fn lot_to_item(lot: &Lot) -> Item {
    let history = lot
        .sold
        .full_history
        .iter()
        .map(|sale| {
            AttributeValue::M(HashMap::from([
                ("date".to_string(), date_attr(sale.date)),
                ("n_shares".to_string(), n(sale.n_shares)),
                ("price".to_string(), n(sale.price)),
            ]))
        })
        .collect();

    let sold = HashMap::from([
        ("short_term_shares".to_string(), n(lot.sold.short_term_shares)),
        ("long_term_shares".to_string(), n(lot.sold.long_term_shares)),
        ("total_price_short".to_string(), n(lot.sold.total_price_short)),
        ("total_price_long".to_string(), n(lot.sold.total_price_long)),
        ("full_history".to_string(), AttributeValue::L(history)),
    ]);

    HashMap::from([
        ("pkey".to_string(), s(lot.user_id.as_str())),
        ("skey".to_string(), s(lot.skey.as_str())),
        ("ticker".to_string(), s(lot.ticker.as_str())),
        ("n_shares".to_string(), n(lot.n_shares)),
        ("price".to_string(), n(lot.price)),
        ("purchase_date".to_string(), date_attr(lot.purchase_date)),
        ("first_dividend_date".to_string(), date_attr(lot.first_dividend_date)),
        ("reinvest".to_string(), AttributeValue::Bool(lot.reinvest)),
        ("sold".to_string(), AttributeValue::M(sold)),
    ])
}

fn malformed(field: &str) -> TrackerError {
    TrackerError::StorageError {
        message: format!("malformed lot item: field '{}'", field),
    }
}

fn get_s<'a>(item: &'a Item, field: &str) -> Result<&'a str> {
    item.get(field)
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| malformed(field))
}

fn get_n(item: &Item, field: &str) -> Result<f64> {
    item.get(field)
        .and_then(|v| v.as_n().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| malformed(field))
}

fn get_date(item: &Item, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(get_s(item, field)?, "%Y-%m-%d").map_err(|_| malformed(field))
}

pub fn item_to_lot(item: &Item) -> Result<Lot> {
    let purchase_date = get_date(item, "purchase_date")?;
    let first_dividend_date = match item.get("first_dividend_date") {
        Some(_) => get_date(item, "first_dividend_date")?,
        None => purchase_date,
    };

    let sold = match item.get("sold").and_then(|v| v.as_m().ok()) {
        Some(sold) => {
            let mut full_history = Vec::new();
            if let Some(history) = sold.get("full_history").and_then(|v| v.as_l().ok()) {
                for entry in history {
                    let entry = entry.as_m().map_err(|_| malformed("full_history"))?;
                    full_history.push(SaleEvent {
                        date: get_date(entry, "date")?,
                        n_shares: get_n(entry, "n_shares")?,
                        price: get_n(entry, "price")?,
                    });
                }
            }
            SoldSummary {
                short_term_shares: get_n(sold, "short_term_shares")?,
                long_term_shares: get_n(sold, "long_term_shares")?,
                total_price_short: get_n(sold, "total_price_short")?,
                total_price_long: get_n(sold, "total_price_long")?,
                full_history,
            }
        }
        None => SoldSummary::default(),
    };

    Ok(Lot {
        user_id: get_s(item, "pkey")?.to_string(),
        skey: get_s(item, "skey")?.to_string(),
        ticker: get_s(item, "ticker")?.to_string(),
        n_shares: get_n(item, "n_shares")?,
        price: get_n(item, "price")?,
        purchase_date,
        first_dividend_date,
        reinvest: item
            .get("reinvest")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(false),
        sold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_conversion_keeps_sales() {
        let purchase_date = NaiveDate::from_ymd_opt(2020, 7, 20).unwrap();
        let lot = Lot {
            user_id: "user_0".to_string(),
            skey: Lot::sort_key("SBUX", purchase_date),
            ticker: "SBUX".to_string(),
            n_shares: 33.0,
            price: 2442.0,
            purchase_date,
            first_dividend_date: NaiveDate::from_ymd_opt(2020, 8, 5).unwrap(),
            reinvest: true,
            sold: SoldSummary {
                short_term_shares: 3.0,
                long_term_shares: 0.0,
                total_price_short: 270.0,
                total_price_long: 0.0,
                full_history: vec![SaleEvent {
                    date: NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(),
                    n_shares: 3.0,
                    price: 270.0,
                }],
            },
        };

        let item = lot_to_item(&lot);
        assert_eq!(item.get("pkey").unwrap().as_s().unwrap(), "user_0");
        assert_eq!(item_to_lot(&item).unwrap(), lot);
    }

    #[test]
    fn test_legacy_item_without_sold_map() {
        let item = HashMap::from([
            ("pkey".to_string(), s("user_0")),
            ("skey".to_string(), s("VOO__2020-07-21")),
            ("ticker".to_string(), s("VOO")),
            ("n_shares".to_string(), n(2.0)),
            ("price".to_string(), n(600.0)),
            ("purchase_date".to_string(), s("2020-07-21")),
        ]);
        let lot = item_to_lot(&item).unwrap();
        assert_eq!(lot.first_dividend_date, lot.purchase_date);
        assert_eq!(lot.remaining_shares(), 2.0);
        assert!(!lot.reinvest);
    }
}

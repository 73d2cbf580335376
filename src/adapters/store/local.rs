use super::{insert_into, LotTable};
use crate::core::LotStore;
use crate::domain::model::Lot;
use crate::utils::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lots kept in a single JSON file. The file is created on first write.
#[derive(Debug, Clone)]
pub struct LocalLotStore {
    path: PathBuf,
    // serializes read-modify-write cycles within the process
    lock: Arc<Mutex<()>>,
}

impl LocalLotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load(&self) -> Result<LotTable> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LotTable::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &LotTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // write then rename so a crash never leaves a truncated ledger
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(table)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }
}

impl LotStore for LocalLotStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Lot>> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        Ok(table
            .remove(user_id)
            .map(|by_key| by_key.into_values().collect())
            .unwrap_or_default())
    }

    async fn get(&self, user_id: &str, skey: &str) -> Result<Option<Lot>> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        Ok(table
            .get_mut(user_id)
            .and_then(|by_key| by_key.remove(skey)))
    }

    async fn insert_new(&self, lot: &Lot) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        insert_into(&mut table, lot)?;
        self.save(&table).await
    }

    async fn put(&self, lot: &Lot) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        table
            .entry(lot.user_id.clone())
            .or_default()
            .insert(lot.skey.clone(), lot.clone());
        self.save(&table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SoldSummary;
    use crate::utils::error::TrackerError;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn lot(user_id: &str, ticker: &str) -> Lot {
        let purchase_date = NaiveDate::from_ymd_opt(2020, 7, 20).unwrap();
        Lot {
            user_id: user_id.to_string(),
            skey: Lot::sort_key(ticker, purchase_date),
            ticker: ticker.to_string(),
            n_shares: 10.0,
            price: 800.0,
            purchase_date,
            first_dividend_date: purchase_date,
            reinvest: false,
            sold: SoldSummary::default(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalLotStore::new(temp_dir.path().join("ledger.json"));
        assert!(store.list("user_0").await.unwrap().is_empty());
        assert!(store.get("user_0", "SBUX__2020-07-20").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lots_persist_per_user() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("ledger.json");
        let store = LocalLotStore::new(&path);

        store.insert_new(&lot("user_0", "SBUX")).await.unwrap();
        store.insert_new(&lot("user_0", "VOO")).await.unwrap();
        store.insert_new(&lot("user_1", "SBUX")).await.unwrap();

        let reopened = LocalLotStore::new(&path);
        assert_eq!(reopened.list("user_0").await.unwrap().len(), 2);
        assert_eq!(reopened.list("user_1").await.unwrap().len(), 1);

        let err = reopened.insert_new(&lot("user_1", "SBUX")).await.unwrap_err();
        assert!(matches!(err, TrackerError::LotExists { .. }));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalLotStore::new(temp_dir.path().join("ledger.json"));
        let mut record = lot("user_0", "SBUX");
        store.insert_new(&record).await.unwrap();

        record.sold.short_term_shares = 4.0;
        store.put(&record).await.unwrap();

        let stored = store.get("user_0", &record.skey).await.unwrap().unwrap();
        assert_eq!(stored.remaining_shares(), 6.0);
    }
}

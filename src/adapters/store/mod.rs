//! Lot persistence backends.

#[cfg(feature = "aws")]
pub mod dynamo;
pub mod local;

pub use local::LocalLotStore;

use crate::core::LotStore;
use crate::domain::model::Lot;
use crate::utils::error::{Result, TrackerError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lots keyed by user, then by sort key.
pub type LotTable = BTreeMap<String, BTreeMap<String, Lot>>;

/// In-process store for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLotStore {
    lots: Arc<Mutex<LotTable>>,
}

impl MemoryLotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LotStore for MemoryLotStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Lot>> {
        let lots = self.lots.lock().await;
        Ok(lots
            .get(user_id)
            .map(|by_key| by_key.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, user_id: &str, skey: &str) -> Result<Option<Lot>> {
        let lots = self.lots.lock().await;
        Ok(lots.get(user_id).and_then(|by_key| by_key.get(skey)).cloned())
    }

    async fn insert_new(&self, lot: &Lot) -> Result<()> {
        let mut lots = self.lots.lock().await;
        insert_into(&mut lots, lot)
    }

    async fn put(&self, lot: &Lot) -> Result<()> {
        let mut lots = self.lots.lock().await;
        lots.entry(lot.user_id.clone())
            .or_default()
            .insert(lot.skey.clone(), lot.clone());
        Ok(())
    }
}

pub(crate) fn insert_into(table: &mut LotTable, lot: &Lot) -> Result<()> {
    let by_key = table.entry(lot.user_id.clone()).or_default();
    if by_key.contains_key(&lot.skey) {
        return Err(TrackerError::LotExists {
            user_id: lot.user_id.clone(),
            skey: lot.skey.clone(),
        });
    }
    by_key.insert(lot.skey.clone(), lot.clone());
    Ok(())
}

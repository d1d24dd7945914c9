use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::document::SanitizedRecord;
use crate::error::Result;
use crate::traits::PersistenceGateway;
use crate::types::PersistedOrgRecord;

use super::{merge_import, new_record};

/// In-process store keyed by EIN. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryOrgStore {
    records: Mutex<HashMap<String, PersistedOrgRecord>>,
}

impl MemoryOrgStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, external_id: &str) -> Option<PersistedOrgRecord> {
        self.records.lock().await.get(external_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryOrgStore {
    async fn upsert(&self, external_id: &str, record: SanitizedRecord) -> Result<Uuid> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        match records.get_mut(external_id) {
            Some(existing) => {
                merge_import(existing, record, now);
                Ok(existing.id)
            }
            None => {
                let created = new_record(external_id, record, now);
                let id = created.id;
                records.insert(external_id.to_string(), created);
                Ok(id)
            }
        }
    }

    async fn known_ids(&self) -> Result<HashSet<String>> {
        Ok(self.records.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{sanitize, Document};
    use serde_json::json;

    fn clean(value: serde_json::Value) -> SanitizedRecord {
        sanitize(Document::from(value)).unwrap()
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_record_with_history() {
        let store = MemoryOrgStore::new();
        let first = store
            .upsert("22-2222222", clean(json!({"assetAmount": 1})))
            .await
            .unwrap();
        let second = store
            .upsert("22-2222222", clean(json!({"assetAmount": 2})))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);

        let rec = store.get("22-2222222").await.unwrap();
        assert_eq!(rec.record["assetAmount"], json!(2));
        assert_eq!(rec.import_history.len(), 1);
    }

    #[tokio::test]
    async fn known_ids_lists_persisted_eins() {
        let store = MemoryOrgStore::new();
        store.upsert("11-1111111", clean(json!({}))).await.unwrap();
        store.upsert("22-2222222", clean(json!({}))).await.unwrap();

        let ids = store.known_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("11-1111111"));
    }
}

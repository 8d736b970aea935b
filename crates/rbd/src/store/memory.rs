/// 内存存储，用于测试与嵌入式运行

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::Result;

use super::{next_version, KvEntry, KvStore, PutCondition};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (String, u64)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|(value, version)| KvEntry {
            key: key.to_string(),
            value: value.clone(),
            version: *version,
        }))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<Vec<KvEntry>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries.get(key).map(|(value, version)| KvEntry {
                    key: key.clone(),
                    value: value.clone(),
                    version: *version,
                })
            })
            .collect())
    }

    async fn put(&self, key: &str, value: &str, cond: PutCondition) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|(_, version)| *version);
        let next = next_version(key, current, cond)?;
        entries.insert(key.to_string(), (value.to_string(), next));
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        let v1 = store.put("k", "a", PutCondition::IfAbsent).await.unwrap();
        assert_eq!(v1, 1);

        let entry = store.get("k").await.unwrap().unwrap();
        assert_eq!(entry.value, "a");
        assert_eq!(entry.version, 1);

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_if_absent_conflict() {
        let store = MemoryStore::new();
        store.put("k", "a", PutCondition::IfAbsent).await.unwrap();
        let err = store.put("k", "b", PutCondition::IfAbsent).await.unwrap_err();
        assert!(matches!(err, Error::StoreConflict(_)));
    }

    #[tokio::test]
    async fn test_if_version() {
        let store = MemoryStore::new();
        let v1 = store.put("k", "a", PutCondition::Always).await.unwrap();
        let v2 = store.put("k", "b", PutCondition::IfVersion(v1)).await.unwrap();
        assert_eq!(v2, v1 + 1);

        // 过期版本写入被拒绝
        let err = store
            .put("k", "c", PutCondition::IfVersion(v1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreConflict(_)));
        assert_eq!(store.get("k").await.unwrap().unwrap().value, "b");
    }

    #[tokio::test]
    async fn test_get_multi_keeps_order_and_skips_missing() {
        let store = MemoryStore::new();
        store.put("a", "1", PutCondition::Always).await.unwrap();
        store.put("c", "3", PutCondition::Always).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let entries = store.get_multi(&keys).await.unwrap();
        let got: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(got, vec!["a", "c"]);
    }
}

//! In-memory store driver, for tests and single-process non-durable use.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Store, StoreError};

/// `DashMap`-backed [`Store`]. Nothing is persisted across process restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.put("a", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("credential:oauth", b"1".to_vec()).await.unwrap();
        store
            .put("credential:app_installation", b"2".to_vec())
            .await
            .unwrap();
        store.put("universe:alpha", b"3".to_vec()).await.unwrap();

        let mut keys = store.list_keys("credential:").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "credential:app_installation".to_string(),
                "credential:oauth".to_string(),
            ]
        );
    }
}

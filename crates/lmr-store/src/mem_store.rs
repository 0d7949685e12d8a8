use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{ObjectStore, StoreError, StoreResult, check_path};

/// In-memory store for tests and hermetic runs.
#[derive(Clone, Default)]
pub struct MemStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore")
            .field("objects", &self.objects.read().unwrap().len())
            .finish()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        check_path(path)?;
        self.objects
            .write()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        check_path(path)?;
        self.objects
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { path: path.into() })
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn round_trip_and_upsert() {
        let store = MemStore::new();
        store.put("a/b.json", b"one").await.unwrap();
        store.put("a/b.json", b"two").await.unwrap();
        assert_eq!(store.get("a/b.json").await.unwrap(), b"two");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn list_is_sorted_by_key() {
        let store = MemStore::new();
        store.put("p/z.json", b"").await.unwrap();
        store.put("p/a.json", b"").await.unwrap();
        store.put("q/a.json", b"").await.unwrap();
        assert_eq!(store.list("p/").await.unwrap(), vec!["p/a.json", "p/z.json"]);
    }
}

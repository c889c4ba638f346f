//! In-process catalog backed by a map of versioned documents.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::catalog::{Catalog, Document, Predicate};
use crate::error::Result;

/// In-memory [`Catalog`] implementation.
///
/// A single write lock covers every mutation, which makes `insert` and
/// `compare_and_swap` atomic with respect to each other. Reads clone the
/// matching documents out so callers never hold the lock.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    collections: RwLock<HashMap<String, HashMap<String, Document>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection. Test helper.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn find(&self, collection: &str, predicate: Predicate<'_>) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| predicate(&doc.body))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, id: &str, body: Value) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(
            id.to_string(),
            Document {
                id: id.to_string(),
                version: 1,
                body,
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Ok(false);
        };
        if doc.version != expected_version {
            return Ok(false);
        }
        doc.version += 1;
        doc.body = body;
        Ok(true)
    }
}

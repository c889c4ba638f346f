//! The catalog port: durable storage for coordination records.
//!
//! The core never assumes multi-record transactions. All cross-component
//! coordination is expressed as conditional updates on a single versioned
//! document, so any store offering per-document compare-and-swap can back
//! the trait. [`memory::MemoryCatalog`] is the in-process implementation
//! used by tests and embedders.

pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CoordinatorError, Result};
use crate::model::{
    Capability, Content, ContentType, Job, Operation, Site, Trigger, TriggerMaterialization,
    Workflow,
};

/// A stored document: opaque serde body plus the version used for
/// compare-and-swap.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub body: Value,
}

/// Serde-level filter applied by `find`. Backends may push an equivalent
/// filter down to the store; the contract is only which documents come back.
pub type Predicate<'a> = &'a (dyn Fn(&Value) -> bool + Send + Sync);

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn find(&self, collection: &str, predicate: Predicate<'_>) -> Result<Vec<Document>>;

    /// Insert a new document at version 1. Returns false (without writing)
    /// if a document with the same id already exists; this if-absent
    /// semantics is the primitive behind idempotency markers.
    async fn insert(&self, collection: &str, id: &str, body: Value) -> Result<bool>;

    /// Replace a document's body only if its current version matches
    /// `expected_version`, bumping the version on success. Returns false if
    /// the version moved (lost race) or the document is gone.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<bool>;
}

/// A typed record stored in a named catalog collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn record_id(&self) -> String;
}

macro_rules! record_impl {
    ($type:ty, $collection:literal) => {
        impl Record for $type {
            const COLLECTION: &'static str = $collection;

            fn record_id(&self) -> String {
                self.id.to_string()
            }
        }
    };
}

record_impl!(Workflow, "workflows");
record_impl!(Job, "jobs");
record_impl!(Operation, "operations");
record_impl!(Site, "sites");
record_impl!(Capability, "capabilities");
record_impl!(ContentType, "content_types");
record_impl!(Trigger, "triggers");
record_impl!(Content, "contents");
record_impl!(TriggerMaterialization, "trigger_materializations");

/// A decoded record together with the document version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<R> {
    pub version: u64,
    pub record: R,
}

/// Typed convenience layer over the raw document interface.
#[async_trait]
pub trait CatalogExt: Catalog {
    async fn get_record<R: Record>(&self, id: &str) -> Result<Option<Versioned<R>>> {
        match self.get(R::COLLECTION, id).await? {
            Some(doc) => Ok(Some(Versioned {
                version: doc.version,
                record: serde_json::from_value(doc.body)?,
            })),
            None => Ok(None),
        }
    }

    /// Like `get_record`, but a missing document is an error naming the
    /// collection.
    async fn require_record<R: Record>(&self, id: &str) -> Result<Versioned<R>> {
        self.get_record::<R>(id)
            .await?
            .ok_or_else(|| CoordinatorError::not_found(R::COLLECTION, id))
    }

    async fn find_records<R: Record>(&self, predicate: Predicate<'_>) -> Result<Vec<Versioned<R>>> {
        let docs = self.find(R::COLLECTION, predicate).await?;
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            records.push(Versioned {
                version: doc.version,
                record: serde_json::from_value(doc.body)?,
            });
        }
        Ok(records)
    }

    async fn insert_record<R: Record>(&self, record: &R) -> Result<bool> {
        let body = serde_json::to_value(record)?;
        self.insert(R::COLLECTION, &record.record_id(), body).await
    }

    /// Conditional replacement of a record read at `expected_version`.
    async fn swap_record<R: Record>(&self, expected_version: u64, record: &R) -> Result<bool> {
        let body = serde_json::to_value(record)?;
        self.compare_and_swap(R::COLLECTION, &record.record_id(), expected_version, body)
            .await
    }
}

impl<C: Catalog + ?Sized> CatalogExt for C {}

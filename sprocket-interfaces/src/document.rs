//! Document database abstraction.
//!
//! The store assumes exactly two coordination primitives from its
//! backend: per-document atomic writes and unique indexes. Everything
//! here is shaped so a MongoDB adapter is a thin translation layer,
//! while the in-memory backend keeps tests hermetic.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A stored document: a flat string-keyed JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Backend-assigned identity of an inserted document.
pub type DocumentId = Uuid;

/// Durability requested for writes through a collection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConcern {
    /// Journaled before acknowledgment.
    #[default]
    Journaled,
    /// Flushed to stable storage before acknowledgment. Lock writes
    /// require this: a lock observed then lost breaks mutual
    /// exclusion.
    Fsynced,
}

/// Predicate over documents. Built by the store's query helper,
/// evaluated by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    StartsWith(String, String),
    EndsWith(String, String),
    Substring(String, String),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lte(field.into(), value.into())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    /// Evaluate against a document. Backends without a native query
    /// language use this directly.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::Lte(field, value) => doc
                .get(field)
                .is_some_and(|actual| value_lte(actual, value)),
            Filter::In(field, values) => doc
                .get(field)
                .is_some_and(|actual| values.contains(actual)),
            Filter::StartsWith(field, prefix) => str_field(doc, field)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Filter::EndsWith(field, suffix) => str_field(doc, field)
                .is_some_and(|s| s.ends_with(suffix.as_str())),
            Filter::Substring(field, fragment) => str_field(doc, field)
                .is_some_and(|s| s.contains(fragment.as_str())),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

fn str_field<'d>(doc: &'d Document, field: &str) -> Option<&'d str> {
    doc.get(field).and_then(Value::as_str)
}

fn value_lte(actual: &Value, bound: &Value) -> bool {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a <= b,
            _ => a
                .as_f64()
                .zip(b.as_f64())
                .is_some_and(|(a, b)| a <= b),
        },
        (Value::String(a), Value::String(b)) => a <= b,
        _ => false,
    }
}

/// Single-field sort order for `find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }
}

/// Index description for bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, fields: &[&str], unique: bool) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            unique,
        }
    }
}

/// Failures surfaced by a document backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// A unique index rejected the write. The acquisition protocol
    /// treats this as "another node won".
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("no such index: {0}")]
    IndexNotFound(String),

    #[error("backend connection failed: {0}")]
    Connection(String),

    #[error("backend failure: {0}")]
    Internal(String),
}

impl BackendError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, BackendError::DuplicateKey(_))
    }
}

/// Handle to one named collection.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Insert a new document, enforcing unique indexes. Returns the
    /// assigned id; the stored document carries it under `_id`.
    async fn insert(&self, doc: Document) -> Result<DocumentId, BackendError>;

    async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, BackendError>;

    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, BackendError>;

    /// Replace the first matching document wholesale, preserving its
    /// `_id`. With `upsert`, a missing match inserts instead. Returns
    /// the number of documents written.
    async fn replace_one(
        &self,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> Result<u64, BackendError>;

    /// Set the given fields on every matching document. Returns the
    /// match count.
    async fn update_many(&self, filter: &Filter, set: Document) -> Result<u64, BackendError>;

    async fn delete_many(&self, filter: &Filter) -> Result<u64, BackendError>;

    async fn count(&self, filter: &Filter) -> Result<u64, BackendError>;

    /// Distinct string values of a field across matching documents.
    async fn distinct(&self, field: &str, filter: &Filter) -> Result<Vec<String>, BackendError>;

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), BackendError>;

    async fn drop_index(&self, name: &str) -> Result<(), BackendError>;
}

/// A connected document database.
pub trait DocumentBackend: Send + Sync {
    /// Obtain a collection handle with the given write durability.
    /// Handles to the same name share the underlying collection.
    fn collection(&self, name: &str, write_concern: WriteConcern) -> Arc<dyn DocumentCollection>;
}

/// Read a string field from a document.
pub fn doc_get_str<'d>(doc: &'d Document, field: &str) -> Option<&'d str> {
    doc.get(field).and_then(Value::as_str)
}

/// Read an integer field from a document.
pub fn doc_get_i64(doc: &Document, field: &str) -> Option<i64> {
    doc.get(field).and_then(Value::as_i64)
}

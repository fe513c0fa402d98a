//! In-memory document backend.
//!
//! The reference backend for tests and embedded use. Thread-safe via
//! `RwLock`; enforces unique indexes on insert and replace so the
//! acquisition protocol behaves exactly as it would against a real
//! document store. Not suitable for durable production storage.

use async_trait::async_trait;
use serde_json::Value;
use sprocket_interfaces::{
    BackendError, Document, DocumentBackend, DocumentCollection, DocumentId, Filter, IndexSpec,
    Sort, WriteConcern,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::fields;

/// A whole in-memory database; collections materialize on first use.
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentBackend for MemoryBackend {
    fn collection(&self, name: &str, _write_concern: WriteConcern) -> Arc<dyn DocumentCollection> {
        let mut collections = self.collections.lock().expect("collection registry lock");
        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    state: RwLock::new(CollectionState::default()),
                })
            })
            .clone()
    }
}

#[derive(Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

pub struct MemoryCollection {
    name: String,
    state: RwLock<CollectionState>,
}

impl MemoryCollection {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CollectionState>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::Internal(format!("{}: lock poisoned", self.name)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, CollectionState>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::Internal(format!("{}: lock poisoned", self.name)))
    }
}

/// Find the unique index a candidate document would violate, ignoring
/// the document at `skip` during replacement.
fn unique_violation(
    state: &CollectionState,
    candidate: &Document,
    skip: Option<usize>,
) -> Option<String> {
    for index in state.indexes.iter().filter(|i| i.unique) {
        let candidate_key: Vec<&Value> = index
            .fields
            .iter()
            .map(|f| candidate.get(f).unwrap_or(&Value::Null))
            .collect();
        let clash = state.documents.iter().enumerate().any(|(i, doc)| {
            skip != Some(i)
                && index
                    .fields
                    .iter()
                    .zip(&candidate_key)
                    .all(|(f, v)| doc.get(f).unwrap_or(&Value::Null) == *v)
        });
        if clash {
            let values: Vec<String> = candidate_key.iter().map(|v| v.to_string()).collect();
            return Some(format!("{} {{{}}}", index.name, values.join(", ")));
        }
    }
    None
}

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn insert(&self, mut doc: Document) -> Result<DocumentId, BackendError> {
        let mut state = self.write()?;
        if let Some(violated) = unique_violation(&state, &doc, None) {
            return Err(BackendError::DuplicateKey(format!(
                "{}: {}",
                self.name, violated
            )));
        }
        let id = match doc.get(fields::ID).and_then(Value::as_str) {
            Some(existing) => existing
                .parse::<Uuid>()
                .map_err(|_| BackendError::Internal(format!("{}: malformed _id", self.name)))?,
            None => {
                let id = Uuid::new_v4();
                doc.insert(fields::ID.into(), Value::from(id.to_string()));
                id
            }
        };
        state.documents.push(doc);
        Ok(id)
    }

    async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, BackendError> {
        let state = self.read()?;
        let mut matched: Vec<Document> = state
            .documents
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        if let Some(sort) = sort {
            matched.sort_by(|a, b| {
                let ordering = value_cmp(
                    a.get(&sort.field).unwrap_or(&Value::Null),
                    b.get(&sort.field).unwrap_or(&Value::Null),
                );
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, BackendError> {
        let state = self.read()?;
        Ok(state
            .documents
            .iter()
            .find(|doc| filter.matches(doc))
            .cloned())
    }

    async fn replace_one(
        &self,
        filter: &Filter,
        mut doc: Document,
        upsert: bool,
    ) -> Result<u64, BackendError> {
        let mut state = self.write()?;
        match state.documents.iter().position(|d| filter.matches(d)) {
            Some(position) => {
                if let Some(id) = state.documents[position].get(fields::ID).cloned() {
                    doc.insert(fields::ID.into(), id);
                }
                if let Some(violated) = unique_violation(&state, &doc, Some(position)) {
                    return Err(BackendError::DuplicateKey(format!(
                        "{}: {}",
                        self.name, violated
                    )));
                }
                state.documents[position] = doc;
                Ok(1)
            }
            None if upsert => {
                if let Some(violated) = unique_violation(&state, &doc, None) {
                    return Err(BackendError::DuplicateKey(format!(
                        "{}: {}",
                        self.name, violated
                    )));
                }
                if !doc.contains_key(fields::ID) {
                    doc.insert(fields::ID.into(), Value::from(Uuid::new_v4().to_string()));
                }
                state.documents.push(doc);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_many(&self, filter: &Filter, set: Document) -> Result<u64, BackendError> {
        let mut state = self.write()?;
        let mut updated = 0;
        for doc in state.documents.iter_mut().filter(|d| filter.matches(d)) {
            for (field, value) in &set {
                doc.insert(field.clone(), value.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64, BackendError> {
        let mut state = self.write()?;
        let before = state.documents.len();
        state.documents.retain(|doc| !filter.matches(doc));
        Ok((before - state.documents.len()) as u64)
    }

    async fn count(&self, filter: &Filter) -> Result<u64, BackendError> {
        let state = self.read()?;
        Ok(state.documents.iter().filter(|d| filter.matches(d)).count() as u64)
    }

    async fn distinct(&self, field: &str, filter: &Filter) -> Result<Vec<String>, BackendError> {
        let state = self.read()?;
        let mut values: Vec<String> = state
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .filter_map(|d| d.get(field).and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), BackendError> {
        let mut state = self.write()?;
        if !state.indexes.iter().any(|i| i.name == spec.name) {
            state.indexes.push(spec.clone());
        }
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<(), BackendError> {
        let mut state = self.write()?;
        match state.indexes.iter().position(|i| i.name == name) {
            Some(position) => {
                state.indexes.remove(position);
                Ok(())
            }
            None => Err(BackendError::IndexNotFound(format!(
                "{}: {}",
                self.name, name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyed(group: &str, name: &str, extra: &[(&str, Value)]) -> Document {
        let mut doc: Document = [
            (fields::GROUP.to_string(), json!(group)),
            (fields::NAME.to_string(), json!(name)),
        ]
        .into_iter()
        .collect();
        for (k, v) in extra {
            doc.insert((*k).to_string(), v.clone());
        }
        doc
    }

    async fn unique_collection(backend: &MemoryBackend) -> Arc<dyn DocumentCollection> {
        let collection = backend.collection("c", WriteConcern::Journaled);
        collection
            .ensure_index(&IndexSpec::new(
                fields::KEY_INDEX,
                &[fields::GROUP, fields::NAME],
                true,
            ))
            .await
            .unwrap();
        collection
    }

    #[tokio::test]
    async fn insert_enforces_unique_indexes() {
        let backend = MemoryBackend::new();
        let collection = unique_collection(&backend).await;
        collection.insert(keyed("g", "a", &[])).await.unwrap();
        collection.insert(keyed("g", "b", &[])).await.unwrap();
        let err = collection.insert(keyed("g", "a", &[])).await.unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(collection.count(&Filter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn replace_one_preserves_identity() {
        let backend = MemoryBackend::new();
        let collection = unique_collection(&backend).await;
        let id = collection
            .insert(keyed("g", "a", &[("v", json!(1))]))
            .await
            .unwrap();
        let written = collection
            .replace_one(
                &Filter::eq(fields::NAME, "a"),
                keyed("g", "a", &[("v", json!(2))]),
                false,
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
        let doc = collection
            .find_one(&Filter::eq(fields::NAME, "a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("v"), Some(&json!(2)));
        assert_eq!(doc.get(fields::ID), Some(&json!(id.to_string())));
    }

    #[tokio::test]
    async fn replace_one_upserts_when_missing() {
        let backend = MemoryBackend::new();
        let collection = unique_collection(&backend).await;
        let written = collection
            .replace_one(&Filter::eq(fields::NAME, "a"), keyed("g", "a", &[]), false)
            .await
            .unwrap();
        assert_eq!(written, 0);
        let written = collection
            .replace_one(&Filter::eq(fields::NAME, "a"), keyed("g", "a", &[]), true)
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn find_sorts_and_limits() {
        let backend = MemoryBackend::new();
        let collection = backend.collection("c", WriteConcern::Journaled);
        for (name, at) in [("late", 300), ("early", 100), ("middle", 200)] {
            collection
                .insert(keyed("g", name, &[("at", json!(at))]))
                .await
                .unwrap();
        }
        let docs = collection
            .find(&Filter::All, Some(&Sort::ascending("at")), Some(2))
            .await
            .unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|d| d.get(fields::NAME).unwrap().as_str().unwrap())
            .collect();
        assert_eq!(names, ["early", "middle"]);
    }

    #[tokio::test]
    async fn distinct_dedups_and_sorts() {
        let backend = MemoryBackend::new();
        let collection = backend.collection("c", WriteConcern::Journaled);
        for group in ["b", "a", "b"] {
            collection
                .insert(keyed(group, &format!("n{group}"), &[]))
                .await
                .ok();
        }
        let groups = collection
            .distinct(fields::GROUP, &Filter::All)
            .await
            .unwrap();
        assert_eq!(groups, ["a", "b"]);
    }

    #[tokio::test]
    async fn same_name_resolves_to_same_collection() {
        let backend = MemoryBackend::new();
        let first = backend.collection("shared", WriteConcern::Journaled);
        let second = backend.collection("shared", WriteConcern::Fsynced);
        first.insert(keyed("g", "a", &[])).await.unwrap();
        assert_eq!(second.count(&Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn drop_index_reports_missing() {
        let backend = MemoryBackend::new();
        let collection = unique_collection(&backend).await;
        collection.drop_index(fields::KEY_INDEX).await.unwrap();
        let err = collection.drop_index(fields::KEY_INDEX).await.unwrap_err();
        assert!(matches!(err, BackendError::IndexNotFound(_)));
    }
}

//! Job detail and the string-keyed job data map.

use crate::key::{JobKey, DEFAULT_GROUP};
use serde_json::Value;
use std::collections::BTreeMap;

/// String-keyed payload attached to jobs and triggers.
///
/// Tracks a dirty flag so completion handling can decide whether the
/// map needs re-storing. Loading from storage clears the flag; any
/// mutation sets it.
#[derive(Debug, Clone, Default)]
pub struct JobDataMap {
    entries: BTreeMap<String, Value>,
    dirty: bool,
}

impl JobDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, Value>) -> Self {
        Self { entries, dirty: false }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.dirty = true;
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn extend(&mut self, other: &JobDataMap) {
        if !other.is_empty() {
            self.dirty = true;
            self.entries
                .extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty_flag(&mut self) {
        self.dirty = false;
    }

    /// True when every value is a JSON string, which permits inline
    /// scalar storage instead of an opaque blob.
    pub fn is_all_strings(&self) -> bool {
        self.entries.values().all(|v| v.is_string())
    }
}

impl PartialEq for JobDataMap {
    fn eq(&self, other: &Self) -> bool {
        // The dirty flag is bookkeeping, not content.
        self.entries == other.entries
    }
}

impl FromIterator<(String, Value)> for JobDataMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            dirty: false,
        }
    }
}

/// A stored job: identity, implementation tag, flags, and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetail {
    key: JobKey,
    type_tag: String,
    description: Option<String>,
    durable: bool,
    disallow_concurrent_execution: bool,
    persist_job_data_after_execution: bool,
    data: JobDataMap,
}

impl JobDetail {
    pub fn builder(type_tag: impl Into<String>) -> JobBuilder {
        JobBuilder::new(type_tag)
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn disallow_concurrent_execution(&self) -> bool {
        self.disallow_concurrent_execution
    }

    pub fn persist_job_data_after_execution(&self) -> bool {
        self.persist_job_data_after_execution
    }

    pub fn data(&self) -> &JobDataMap {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut JobDataMap {
        &mut self.data
    }
}

/// Fluent construction of [`JobDetail`] values.
pub struct JobBuilder {
    key: Option<JobKey>,
    type_tag: String,
    description: Option<String>,
    durable: bool,
    disallow_concurrent_execution: bool,
    persist_job_data_after_execution: bool,
    data: JobDataMap,
}

impl JobBuilder {
    fn new(type_tag: impl Into<String>) -> Self {
        Self {
            key: None,
            type_tag: type_tag.into(),
            description: None,
            durable: false,
            disallow_concurrent_execution: false,
            persist_job_data_after_execution: false,
            data: JobDataMap::new(),
        }
    }

    pub fn with_identity(mut self, name: impl Into<String>, group: impl Into<String>) -> Self {
        self.key = Some(JobKey::new(name, group));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn store_durably(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn disallow_concurrent_execution(mut self, disallow: bool) -> Self {
        self.disallow_concurrent_execution = disallow;
        self
    }

    pub fn persist_job_data_after_execution(mut self, persist: bool) -> Self {
        self.persist_job_data_after_execution = persist;
        self
    }

    pub fn using_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key, value);
        self
    }

    pub fn using_data_map(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> JobDetail {
        let mut data = self.data;
        data.clear_dirty_flag();
        JobDetail {
            key: self
                .key
                .unwrap_or_else(|| JobKey::new(format!("job-{}", &self.type_tag), DEFAULT_GROUP)),
            type_tag: self.type_tag,
            description: self.description,
            durable: self.durable,
            disallow_concurrent_execution: self.disallow_concurrent_execution,
            persist_job_data_after_execution: self.persist_job_data_after_execution,
            data,
        }
    }
}

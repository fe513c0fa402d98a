//! Translation of group matchers and keys into backend filters, plus
//! the group lookup queries built on them.

use crate::fields;
use serde_json::Value;
use sprocket_core::{GroupMatcher, JobKey, TriggerKey};
use sprocket_interfaces::{BackendError, DocumentCollection, Filter};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Predicate selecting one `(group, name)` key.
pub(crate) fn key_filter(group: &str, name: &str) -> Filter {
    Filter::and([
        Filter::eq(fields::GROUP, group),
        Filter::eq(fields::NAME, name),
    ])
}

pub(crate) fn job_key_filter(key: &JobKey) -> Filter {
    key_filter(&key.group, &key.name)
}

pub(crate) fn trigger_key_filter(key: &TriggerKey) -> Filter {
    key_filter(&key.group, &key.name)
}

/// Predicate on the `group` field for a matcher. Builds the filter
/// only; execution is the caller's business.
pub(crate) fn matcher_filter(matcher: &GroupMatcher) -> Filter {
    match matcher {
        GroupMatcher::Anything => Filter::All,
        GroupMatcher::Equals(group) => Filter::eq(fields::GROUP, group.clone()),
        GroupMatcher::StartsWith(prefix) => {
            Filter::StartsWith(fields::GROUP.to_string(), prefix.clone())
        }
        GroupMatcher::EndsWith(suffix) => {
            Filter::EndsWith(fields::GROUP.to_string(), suffix.clone())
        }
        GroupMatcher::Contains(fragment) => {
            Filter::Substring(fields::GROUP.to_string(), fragment.clone())
        }
    }
}

/// Predicate selecting documents in any of the given groups.
pub(crate) fn in_groups<I, S>(groups: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Filter::In(
        fields::GROUP.to_string(),
        groups.into_iter().map(|g| Value::from(g.into())).collect(),
    )
}

/// Group lookups over one collection.
pub(crate) struct GroupQueries {
    collection: Arc<dyn DocumentCollection>,
}

impl GroupQueries {
    pub(crate) fn new(collection: Arc<dyn DocumentCollection>) -> Self {
        Self { collection }
    }

    pub(crate) async fn groups_that_match(
        &self,
        matcher: &GroupMatcher,
    ) -> Result<BTreeSet<String>, BackendError> {
        let groups = self
            .collection
            .distinct(fields::GROUP, &matcher_filter(matcher))
            .await?;
        Ok(groups.into_iter().collect())
    }

    pub(crate) async fn all_groups(&self) -> Result<BTreeSet<String>, BackendError> {
        self.groups_that_match(&GroupMatcher::Anything).await
    }

    /// Groups of the documents referencing one job id.
    pub(crate) async fn groups_for_job_id(
        &self,
        job_id: &Value,
    ) -> Result<BTreeSet<String>, BackendError> {
        let filter = Filter::Eq(fields::JOB_ID.to_string(), job_id.clone());
        Ok(self
            .collection
            .distinct(fields::GROUP, &filter)
            .await?
            .into_iter()
            .collect())
    }

    /// Groups of the documents referencing any of the job ids.
    pub(crate) async fn groups_for_job_ids(
        &self,
        job_ids: Vec<Value>,
    ) -> Result<BTreeSet<String>, BackendError> {
        if job_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let filter = Filter::In(fields::JOB_ID.to_string(), job_ids);
        Ok(self
            .collection
            .distinct(fields::GROUP, &filter)
            .await?
            .into_iter()
            .collect())
    }
}

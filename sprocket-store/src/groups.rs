//! Paused-group bookkeeping.

use crate::fields;
use crate::query;
use serde_json::Value;
use sprocket_interfaces::{BackendError, DocumentCollection, Filter};
use std::collections::HashSet;
use std::sync::Arc;

/// Membership set of paused groups, backed by one marker collection.
/// Jobs and triggers each get their own tracker.
pub(crate) struct PausedGroupTracker {
    collection: Arc<dyn DocumentCollection>,
}

impl PausedGroupTracker {
    pub(crate) fn new(collection: Arc<dyn DocumentCollection>) -> Self {
        Self { collection }
    }

    /// Record groups as paused. Marking an already-paused group is a
    /// no-op.
    pub(crate) async fn mark<I, S>(&self, groups: I) -> Result<(), BackendError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for group in groups {
            let group = group.as_ref();
            let marker = [(fields::GROUP.to_string(), Value::from(group))]
                .into_iter()
                .collect();
            self.collection
                .replace_one(&Filter::eq(fields::GROUP, group), marker, true)
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn unmark<I, S>(&self, groups: I) -> Result<(), BackendError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collection
            .delete_many(&query::in_groups(groups))
            .await?;
        Ok(())
    }

    pub(crate) async fn paused(&self) -> Result<HashSet<String>, BackendError> {
        let groups = self.collection.distinct(fields::GROUP, &Filter::All).await?;
        Ok(groups.into_iter().collect())
    }

    pub(crate) async fn clear(&self) -> Result<(), BackendError> {
        self.collection.delete_many(&Filter::All).await?;
        Ok(())
    }
}

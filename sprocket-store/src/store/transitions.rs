//! Pause and resume transitions.
//!
//! Pausing by matcher also records the matched groups in the
//! paused-group sets; resuming unmarks them. A trigger stored into a
//! paused group afterwards is not auto-paused here — the runtime may
//! consult the paused sets and apply its own policy.

use super::DocumentJobStore;
use crate::error::{StoreError, StoreResult};
use crate::fields;
use crate::query;
use serde_json::Value;
use sprocket_core::{GroupMatcher, JobKey, StoredTriggerState, TriggerKey};
use sprocket_interfaces::{Document, Filter};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

fn state_update(state: StoredTriggerState) -> Document {
    [(fields::STATE.to_string(), Value::from(state.as_str()))]
        .into_iter()
        .collect()
}

impl DocumentJobStore {
    async fn set_trigger_state(
        &self,
        filter: &Filter,
        state: StoredTriggerState,
    ) -> StoreResult<u64> {
        Ok(self.triggers.update_many(filter, state_update(state)).await?)
    }

    pub async fn pause_trigger(&self, key: &TriggerKey) -> StoreResult<()> {
        self.set_trigger_state(&query::trigger_key_filter(key), StoredTriggerState::Paused)
            .await?;
        Ok(())
    }

    /// Resuming clears the state back to waiting without consulting
    /// the paused-group set, so a resumed trigger in a paused group
    /// runs anyway.
    pub async fn resume_trigger(&self, key: &TriggerKey) -> StoreResult<()> {
        self.set_trigger_state(&query::trigger_key_filter(key), StoredTriggerState::Waiting)
            .await?;
        Ok(())
    }

    /// Pause every matching trigger and record the matched groups as
    /// paused. Returns the groups.
    pub async fn pause_triggers(&self, matcher: &GroupMatcher) -> StoreResult<BTreeSet<String>> {
        self.set_trigger_state(&query::matcher_filter(matcher), StoredTriggerState::Paused)
            .await?;
        let groups = self.trigger_group_queries().groups_that_match(matcher).await?;
        self.mark_trigger_groups_paused(&groups).await;
        Ok(groups)
    }

    pub async fn resume_triggers(&self, matcher: &GroupMatcher) -> StoreResult<BTreeSet<String>> {
        self.set_trigger_state(&query::matcher_filter(matcher), StoredTriggerState::Waiting)
            .await?;
        let groups = self.trigger_group_queries().groups_that_match(matcher).await?;
        if let Err(err) = self.paused_trigger_groups.unmark(groups.iter().cloned()).await {
            warn!(error = %err, "failed to unmark resumed trigger groups");
        }
        Ok(groups)
    }

    pub async fn pause_all(&self) -> StoreResult<()> {
        self.set_trigger_state(&Filter::All, StoredTriggerState::Paused)
            .await?;
        let groups = self.trigger_group_queries().all_groups().await?;
        self.mark_trigger_groups_paused(&groups).await;
        Ok(())
    }

    pub async fn resume_all(&self) -> StoreResult<()> {
        self.set_trigger_state(&Filter::All, StoredTriggerState::Waiting)
            .await?;
        let groups = self.trigger_group_queries().all_groups().await?;
        if let Err(err) = self.paused_trigger_groups.unmark(groups).await {
            warn!(error = %err, "failed to unmark resumed trigger groups");
        }
        Ok(())
    }

    /// Pause every trigger of one job; the triggers' groups are
    /// recorded in the paused-trigger-group set.
    pub async fn pause_job(&self, key: &JobKey) -> StoreResult<()> {
        let job_id = self.require_job_id(key).await?;
        let groups = self.trigger_group_queries().groups_for_job_id(&job_id).await?;
        self.set_trigger_state(
            &Filter::Eq(fields::JOB_ID.to_string(), job_id),
            StoredTriggerState::Paused,
        )
        .await?;
        self.mark_trigger_groups_paused(&groups).await;
        Ok(())
    }

    pub async fn resume_job(&self, key: &JobKey) -> StoreResult<()> {
        let job_id = self.require_job_id(key).await?;
        self.set_trigger_state(
            &Filter::Eq(fields::JOB_ID.to_string(), job_id),
            StoredTriggerState::Waiting,
        )
        .await?;
        Ok(())
    }

    /// Pause the triggers of every matching job. The affected groups
    /// are derived from the matched jobs' triggers and recorded in the
    /// paused-job-group set. Returns the groups.
    pub async fn pause_jobs(&self, matcher: &GroupMatcher) -> StoreResult<BTreeSet<String>> {
        let groups = self.trigger_groups_for_matched_jobs(matcher).await?;
        self.set_trigger_state(&query::in_groups(groups.iter().cloned()), StoredTriggerState::Paused)
            .await?;
        if let Err(err) = self.paused_job_groups.mark(groups.iter()).await {
            warn!(error = %err, "failed to mark paused job groups");
        }
        Ok(groups)
    }

    pub async fn resume_jobs(&self, matcher: &GroupMatcher) -> StoreResult<BTreeSet<String>> {
        let groups = self.trigger_groups_for_matched_jobs(matcher).await?;
        self.set_trigger_state(
            &query::in_groups(groups.iter().cloned()),
            StoredTriggerState::Waiting,
        )
        .await?;
        if let Err(err) = self.paused_job_groups.unmark(groups.iter().cloned()).await {
            warn!(error = %err, "failed to unmark resumed job groups");
        }
        Ok(groups)
    }

    pub async fn paused_trigger_groups(&self) -> StoreResult<HashSet<String>> {
        Ok(self.paused_trigger_groups.paused().await?)
    }

    pub async fn paused_job_groups(&self) -> StoreResult<HashSet<String>> {
        Ok(self.paused_job_groups.paused().await?)
    }

    async fn require_job_id(&self, key: &JobKey) -> StoreResult<Value> {
        let doc = self
            .find_job_document(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {key}")))?;
        doc.get(fields::ID)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {key}")))
    }

    async fn mark_trigger_groups_paused(&self, groups: &BTreeSet<String>) {
        if let Err(err) = self.paused_trigger_groups.mark(groups.iter()).await {
            warn!(error = %err, "failed to mark paused trigger groups");
        }
    }

    async fn trigger_groups_for_matched_jobs(
        &self,
        matcher: &GroupMatcher,
    ) -> StoreResult<BTreeSet<String>> {
        let job_docs = self
            .jobs
            .find(&query::matcher_filter(matcher), None, None)
            .await?;
        let ids: Vec<Value> = job_docs
            .iter()
            .filter_map(|d| d.get(fields::ID).cloned())
            .collect();
        Ok(self.trigger_group_queries().groups_for_job_ids(ids).await?)
    }
}

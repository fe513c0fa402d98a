//! The document-backed job store.
//!
//! One `DocumentJobStore` is a scheduler node's handle onto the shared
//! schedule: jobs, triggers, calendars, paused groups, and the locks
//! collection through which nodes compete for due triggers. All
//! cross-node coordination rides on unique-index contention; there is
//! no coordinator.

mod acquisition;
mod firing;
mod transitions;

use crate::bootstrap;
use crate::codec::DocumentCodec;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::fields;
use crate::groups::PausedGroupTracker;
use crate::helpers;
use crate::query::{self, GroupQueries};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sprocket_core::{
    Calendar, GroupMatcher, JobDetail, JobKey, OperableTrigger, TriggerKey, TriggerState,
    TypeRegistry,
};
use sprocket_interfaces::{
    doc_get_str, BackendError, BlobCodec, Clock, Document, DocumentBackend, DocumentCollection,
    DocumentId, Filter, JsonBlobCodec, NoopSignaler, SchedulerSignaler, SystemClock, WriteConcern,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Dials a document backend from connection configuration. Wire
/// transport belongs to the embedder; the store never opens
/// connections itself.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(
        &self,
        config: &StoreConfig,
    ) -> Result<Arc<dyn DocumentBackend>, BackendError>;
}

impl std::fmt::Debug for DocumentJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentJobStore")
            .field("instance_id", &self.config.instance_id)
            .finish_non_exhaustive()
    }
}

/// Shared-schedule persistence for one scheduler node.
pub struct DocumentJobStore {
    config: StoreConfig,
    jobs: Arc<dyn DocumentCollection>,
    triggers: Arc<dyn DocumentCollection>,
    calendars: Arc<dyn DocumentCollection>,
    locks: Arc<dyn DocumentCollection>,
    paused_trigger_groups: PausedGroupTracker,
    paused_job_groups: PausedGroupTracker,
    codec: DocumentCodec,
    signaler: Arc<dyn SchedulerSignaler>,
    clock: Arc<dyn Clock>,
}

impl DocumentJobStore {
    pub fn builder(config: StoreConfig) -> JobStoreBuilder {
        JobStoreBuilder::new(config)
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ----------------------------------------------------------------
    // Jobs
    // ----------------------------------------------------------------

    /// Upsert a job by key. An existing job is left untouched unless
    /// `replace` is set; either way the stored job's id is returned.
    pub async fn store_job(&self, job: &JobDetail, replace: bool) -> StoreResult<DocumentId> {
        debug!(job = %job.key(), replace, "storing job");
        let filter = query::job_key_filter(job.key());
        let doc = self.codec.encode_job(job)?;
        match self.jobs.find_one(&filter).await? {
            Some(existing) => {
                if replace {
                    self.jobs.replace_one(&filter, doc, false).await?;
                }
                document_id(&existing)
            }
            None => match self.jobs.insert(doc).await {
                Ok(id) => Ok(id),
                Err(err) if err.is_duplicate_key() => {
                    // Lost a race to another writer; theirs wins.
                    let existing = self.jobs.find_one(&filter).await?.ok_or(err)?;
                    document_id(&existing)
                }
                Err(err) => Err(err.into()),
            },
        }
    }

    /// Store a job and its first trigger together. The job is not
    /// replaced if it already exists.
    pub async fn store_job_and_trigger(
        &self,
        job: &JobDetail,
        trigger: &dyn OperableTrigger,
    ) -> StoreResult<DocumentId> {
        let job_id = self.store_job(job, false).await?;
        debug!(job = %job.key(), trigger = %trigger.core().key, "storing job and trigger");
        self.store_trigger_with_job_id(trigger, Value::from(job_id.to_string()), false)
            .await?;
        Ok(job_id)
    }

    pub async fn store_jobs_and_triggers(
        &self,
        _bundles: &[(JobDetail, Vec<Box<dyn OperableTrigger>>)],
        _replace: bool,
    ) -> StoreResult<()> {
        Err(StoreError::Unsupported("bulk job and trigger storage"))
    }

    pub async fn retrieve_job(&self, key: &JobKey) -> StoreResult<Option<JobDetail>> {
        match self.find_job_document(key).await? {
            Some(doc) => Ok(Some(self.codec.decode_job(&doc)?)),
            None => Ok(None),
        }
    }

    /// Remove a job and every trigger referencing it. Returns whether
    /// a job was removed.
    pub async fn remove_job(&self, key: &JobKey) -> StoreResult<bool> {
        let Some(doc) = self.find_job_document(key).await? else {
            return Ok(false);
        };
        let job_id = id_value(&doc)?;
        self.jobs.delete_many(&query::job_key_filter(key)).await?;
        self.triggers
            .delete_many(&Filter::Eq(fields::JOB_ID.to_string(), job_id))
            .await?;
        debug!(job = %key, "removed job and its triggers");
        Ok(true)
    }

    pub async fn remove_jobs(&self, keys: &[JobKey]) -> StoreResult<bool> {
        let mut all_removed = true;
        for key in keys {
            all_removed &= self.remove_job(key).await?;
        }
        Ok(all_removed)
    }

    pub async fn check_job_exists(&self, key: &JobKey) -> StoreResult<bool> {
        Ok(self.jobs.count(&query::job_key_filter(key)).await? > 0)
    }

    // ----------------------------------------------------------------
    // Triggers
    // ----------------------------------------------------------------

    /// Store a trigger for an existing job. The trigger enters the
    /// waiting state.
    pub async fn store_trigger(
        &self,
        trigger: &dyn OperableTrigger,
        replace: bool,
    ) -> StoreResult<()> {
        let job_key = &trigger.core().job_key;
        let job_doc = self.find_job_document(job_key).await?.ok_or_else(|| {
            StoreError::NotFound(format!(
                "job {job_key} referenced by trigger {}",
                trigger.core().key
            ))
        })?;
        self.store_trigger_with_job_id(trigger, id_value(&job_doc)?, replace)
            .await
    }

    pub(crate) async fn store_trigger_with_job_id(
        &self,
        trigger: &dyn OperableTrigger,
        job_id: Value,
        replace: bool,
    ) -> StoreResult<()> {
        let key = &trigger.core().key;
        let doc = self.codec.encode_trigger(trigger, job_id)?;
        if replace {
            self.triggers
                .replace_one(&query::trigger_key_filter(key), doc, false)
                .await?;
            Ok(())
        } else {
            match self.triggers.insert(doc).await {
                Ok(_) => Ok(()),
                Err(err) if err.is_duplicate_key() => {
                    Err(StoreError::AlreadyExists(format!("trigger {key}")))
                }
                Err(err) => Err(err.into()),
            }
        }
    }

    pub async fn retrieve_trigger(
        &self,
        key: &TriggerKey,
    ) -> StoreResult<Option<Box<dyn OperableTrigger>>> {
        match self.find_trigger_document(key).await? {
            Some(doc) => self.decode_trigger_document(&doc).await,
            None => Ok(None),
        }
    }

    /// Remove a trigger. When the removed trigger was the last one
    /// referencing a non-durable job, the job goes too.
    pub async fn remove_trigger(&self, key: &TriggerKey) -> StoreResult<bool> {
        let Some(doc) = self.find_trigger_document(key).await? else {
            return Ok(false);
        };
        match doc.get(fields::JOB_ID) {
            Some(job_id) => {
                // A failed orphan sweep must not mask the removal.
                if let Err(err) = self.remove_orphaned_job(job_id).await {
                    warn!(trigger = %key, error = %err, "orphaned job cleanup failed");
                }
            }
            None => debug!(trigger = %key, "trigger has no associated job"),
        }
        self.triggers
            .delete_many(&query::trigger_key_filter(key))
            .await?;
        Ok(true)
    }

    async fn remove_orphaned_job(&self, job_id: &Value) -> StoreResult<()> {
        let id_filter = Filter::Eq(fields::ID.to_string(), job_id.clone());
        let Some(job_doc) = self.jobs.find_one(&id_filter).await? else {
            return Ok(());
        };
        let durable = matches!(job_doc.get(fields::DURABLE), Some(Value::Bool(true)))
            || doc_get_str(&job_doc, fields::DURABLE) == Some("true");
        if durable {
            return Ok(());
        }
        let referencing = self
            .triggers
            .count(&Filter::Eq(fields::JOB_ID.to_string(), job_id.clone()))
            .await?;
        if referencing == 1 {
            self.jobs.delete_many(&id_filter).await?;
            debug!("removed orphaned non-durable job");
        }
        Ok(())
    }

    pub async fn remove_triggers(&self, keys: &[TriggerKey]) -> StoreResult<bool> {
        let mut all_removed = true;
        for key in keys {
            all_removed &= self.remove_trigger(key).await?;
        }
        Ok(all_removed)
    }

    /// Swap a trigger for a new one bound to the same job. The old
    /// trigger's data map carries over unless the new trigger brings
    /// its own. On a failed store the old trigger is re-inserted.
    pub async fn replace_trigger(
        &self,
        key: &TriggerKey,
        mut new_trigger: Box<dyn OperableTrigger>,
    ) -> StoreResult<()> {
        let old = self
            .retrieve_trigger(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("trigger {key}")))?;
        if old.core().job_key != new_trigger.core().job_key {
            return Err(StoreError::JobMismatch {
                trigger: key.to_string(),
                expected: old.core().job_key.to_string(),
                offered: new_trigger.core().job_key.to_string(),
            });
        }

        if new_trigger.core().data.is_empty() {
            new_trigger.core_mut().data = old.core().data.clone();
        }

        // Plain delete: the orphan rule must not fire while the job
        // briefly has no triggers.
        self.triggers
            .delete_many(&query::trigger_key_filter(key))
            .await?;

        match self.store_trigger(new_trigger.as_ref(), false).await {
            Ok(()) => Ok(()),
            Err(primary) => {
                if let Err(rollback) = self.store_trigger(old.as_ref(), false).await {
                    error!(
                        trigger = %key,
                        error = %rollback,
                        "rollback re-insert failed, trigger is lost"
                    );
                }
                Err(primary)
            }
        }
    }

    pub async fn check_trigger_exists(&self, key: &TriggerKey) -> StoreResult<bool> {
        Ok(self.triggers.count(&query::trigger_key_filter(key)).await? > 0)
    }

    pub async fn get_trigger_state(&self, key: &TriggerKey) -> StoreResult<TriggerState> {
        let doc = self.find_trigger_document(key).await?;
        Ok(TriggerState::from_stored(
            doc.as_ref().and_then(|d| doc_get_str(d, fields::STATE)),
        ))
    }

    pub async fn get_triggers_for_job(
        &self,
        key: &JobKey,
    ) -> StoreResult<Vec<Box<dyn OperableTrigger>>> {
        let Some(job_doc) = self.find_job_document(key).await? else {
            return Ok(Vec::new());
        };
        let job_id = id_value(&job_doc)?;
        let docs = self
            .triggers
            .find(
                &Filter::Eq(fields::JOB_ID.to_string(), job_id),
                None,
                None,
            )
            .await?;
        let mut triggers = Vec::with_capacity(docs.len());
        for doc in &docs {
            if let Some(trigger) = self.decode_trigger_document(doc).await? {
                triggers.push(trigger);
            }
        }
        Ok(triggers)
    }

    // ----------------------------------------------------------------
    // Calendars
    // ----------------------------------------------------------------

    pub async fn store_calendar(
        &self,
        name: &str,
        calendar: &Calendar,
        replace: bool,
        update_triggers: bool,
    ) -> StoreResult<()> {
        if update_triggers {
            return Err(StoreError::Unsupported(
                "updating triggers on calendar store",
            ));
        }
        let doc = self.codec.encode_calendar(name, calendar)?;
        if replace {
            self.calendars
                .replace_one(&Filter::eq(fields::NAME, name), doc, true)
                .await?;
            Ok(())
        } else {
            match self.calendars.insert(doc).await {
                Ok(_) => Ok(()),
                Err(err) if err.is_duplicate_key() => {
                    Err(StoreError::AlreadyExists(format!("calendar {name}")))
                }
                Err(err) => Err(err.into()),
            }
        }
    }

    pub async fn remove_calendar(&self, name: &str) -> StoreResult<bool> {
        let removed = self
            .calendars
            .delete_many(&Filter::eq(fields::NAME, name))
            .await?;
        Ok(removed > 0)
    }

    pub async fn retrieve_calendar(&self, _name: &str) -> StoreResult<Calendar> {
        Err(StoreError::Unsupported("calendar retrieval"))
    }

    pub async fn get_calendar_names(&self) -> StoreResult<Vec<String>> {
        Err(StoreError::Unsupported("calendar name listing"))
    }

    /// Internal calendar load used by the fire and misfire paths.
    pub(crate) async fn load_calendar(&self, name: &str) -> StoreResult<Option<Calendar>> {
        match self
            .calendars
            .find_one(&Filter::eq(fields::NAME, name))
            .await?
        {
            Some(doc) => Ok(Some(self.codec.decode_calendar(&doc)?)),
            None => Ok(None),
        }
    }

    // ----------------------------------------------------------------
    // Queries and counts
    // ----------------------------------------------------------------

    pub async fn get_job_keys(&self, matcher: &GroupMatcher) -> StoreResult<HashSet<JobKey>> {
        let docs = self
            .jobs
            .find(&query::matcher_filter(matcher), None, None)
            .await?;
        Ok(docs
            .iter()
            .filter_map(|d| {
                Some(JobKey::new(
                    doc_get_str(d, fields::NAME)?,
                    doc_get_str(d, fields::GROUP)?,
                ))
            })
            .collect())
    }

    pub async fn get_trigger_keys(
        &self,
        matcher: &GroupMatcher,
    ) -> StoreResult<HashSet<TriggerKey>> {
        let docs = self
            .triggers
            .find(&query::matcher_filter(matcher), None, None)
            .await?;
        Ok(docs
            .iter()
            .filter_map(|d| {
                Some(TriggerKey::new(
                    doc_get_str(d, fields::NAME)?,
                    doc_get_str(d, fields::GROUP)?,
                ))
            })
            .collect())
    }

    pub async fn get_job_group_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.jobs.distinct(fields::GROUP, &Filter::All).await?)
    }

    pub async fn get_trigger_group_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.triggers.distinct(fields::GROUP, &Filter::All).await?)
    }

    pub async fn number_of_jobs(&self) -> StoreResult<u64> {
        Ok(self.jobs.count(&Filter::All).await?)
    }

    pub async fn number_of_triggers(&self) -> StoreResult<u64> {
        Ok(self.triggers.count(&Filter::All).await?)
    }

    pub async fn number_of_calendars(&self) -> StoreResult<u64> {
        Ok(self.calendars.count(&Filter::All).await?)
    }

    pub async fn number_of_locks(&self) -> StoreResult<u64> {
        Ok(self.locks.count(&Filter::All).await?)
    }

    /// Wipe the schedule: jobs, triggers, calendars, and paused-group
    /// markers. Locks are untouched; they belong to live protocol
    /// rounds and expire on their own.
    pub async fn clear_all_scheduling_data(&self) -> StoreResult<()> {
        self.jobs.delete_many(&Filter::All).await?;
        self.triggers.delete_many(&Filter::All).await?;
        self.calendars.delete_many(&Filter::All).await?;
        self.paused_trigger_groups.clear().await?;
        self.paused_job_groups.clear().await?;
        Ok(())
    }

    // ----------------------------------------------------------------
    // Internals shared across protocol modules
    // ----------------------------------------------------------------

    pub(crate) async fn find_job_document(&self, key: &JobKey) -> StoreResult<Option<Document>> {
        Ok(self.jobs.find_one(&query::job_key_filter(key)).await?)
    }

    pub(crate) async fn find_trigger_document(
        &self,
        key: &TriggerKey,
    ) -> StoreResult<Option<Document>> {
        Ok(self
            .triggers
            .find_one(&query::trigger_key_filter(key))
            .await?)
    }

    /// Decode a trigger document, resolving its job reference. An
    /// orphaned trigger (job deleted underneath it) decodes to `None`
    /// so readers can degrade gracefully.
    pub(crate) async fn decode_trigger_document(
        &self,
        doc: &Document,
    ) -> StoreResult<Option<Box<dyn OperableTrigger>>> {
        let Some(job_id) = doc.get(fields::JOB_ID) else {
            return Ok(None);
        };
        let Some(job_doc) = self
            .jobs
            .find_one(&Filter::Eq(fields::ID.to_string(), job_id.clone()))
            .await?
        else {
            return Ok(None);
        };
        let job_key = JobKey::new(
            doc_get_str(&job_doc, fields::NAME).unwrap_or_default(),
            doc_get_str(&job_doc, fields::GROUP).unwrap_or_default(),
        );
        Ok(Some(self.codec.decode_trigger(doc, job_key)?))
    }

    pub(crate) fn trigger_group_queries(&self) -> GroupQueries {
        GroupQueries::new(self.triggers.clone())
    }
}

fn document_id(doc: &Document) -> StoreResult<DocumentId> {
    doc_get_str(doc, fields::ID)
        .and_then(|raw| raw.parse::<Uuid>().ok())
        .ok_or_else(|| {
            StoreError::Storage(BackendError::Internal(
                "stored document has no usable _id".to_string(),
            ))
        })
}

fn id_value(doc: &Document) -> StoreResult<Value> {
    doc.get(fields::ID).cloned().ok_or_else(|| {
        StoreError::Storage(BackendError::Internal(
            "stored document has no _id".to_string(),
        ))
    })
}

/// Staged construction of a [`DocumentJobStore`].
///
/// Exactly one backend source must be supplied: an already-connected
/// backend, or a connector that dials from the configuration's
/// connection parameters. Mixing the two is a configuration error.
pub struct JobStoreBuilder {
    config: StoreConfig,
    backend: Option<Arc<dyn DocumentBackend>>,
    connector: Option<Box<dyn BackendConnector>>,
    registry: TypeRegistry,
    signaler: Arc<dyn SchedulerSignaler>,
    blob_codec: Arc<dyn BlobCodec>,
    clock: Arc<dyn Clock>,
}

impl JobStoreBuilder {
    fn new(config: StoreConfig) -> Self {
        Self {
            config,
            backend: None,
            connector: None,
            registry: TypeRegistry::with_builtin_triggers(),
            signaler: Arc::new(NoopSignaler),
            blob_codec: Arc::new(JsonBlobCodec),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn DocumentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn connector(mut self, connector: impl BackendConnector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn signaler(mut self, signaler: Arc<dyn SchedulerSignaler>) -> Self {
        self.signaler = signaler;
        self
    }

    pub fn blob_codec(mut self, blob_codec: Arc<dyn BlobCodec>) -> Self {
        self.blob_codec = blob_codec;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn build(self) -> StoreResult<DocumentJobStore> {
        let config = self.config;
        config.validate()?;

        let backend = match (self.backend, self.connector) {
            (Some(_), Some(_)) => {
                return Err(StoreError::Config(
                    "configure either an injected backend or a connector, not both".to_string(),
                ))
            }
            (Some(backend), None) => {
                if config.has_connection_parameters() {
                    return Err(StoreError::Config(
                        "configure either an injected backend or connection parameters, not both"
                            .to_string(),
                    ));
                }
                backend
            }
            (None, Some(connector)) => {
                if config.uri.is_none() && config.addresses.is_empty() {
                    return Err(StoreError::Config(
                        "at least one server address or a connection URI must be specified"
                            .to_string(),
                    ));
                }
                connector
                    .connect(&config)
                    .await
                    .map_err(|err| StoreError::Config(format!("could not connect: {err}")))?
            }
            (None, None) => {
                return Err(StoreError::Config(
                    "no document backend: inject one or supply a connector".to_string(),
                ))
            }
        };

        let jobs = backend.collection(&config.collection_name("jobs"), WriteConcern::Journaled);
        let triggers =
            backend.collection(&config.collection_name("triggers"), WriteConcern::Journaled);
        let calendars =
            backend.collection(&config.collection_name("calendars"), WriteConcern::Journaled);
        // Losing an acknowledged lock would let two nodes fire one
        // trigger, so locks get the strongest concern the store has.
        let locks = backend.collection(&config.collection_name("locks"), WriteConcern::Fsynced);
        let paused_trigger_groups = PausedGroupTracker::new(backend.collection(
            &config.collection_name("paused_trigger_groups"),
            WriteConcern::Journaled,
        ));
        let paused_job_groups = PausedGroupTracker::new(backend.collection(
            &config.collection_name("paused_job_groups"),
            WriteConcern::Journaled,
        ));

        bootstrap::initialize_collections(&jobs, &triggers, &locks, &calendars, &config.instance_id)
            .await?;

        Ok(DocumentJobStore {
            codec: DocumentCodec::new(self.blob_codec, self.registry, helpers::default_helpers()),
            config,
            jobs,
            triggers,
            calendars,
            locks,
            paused_trigger_groups,
            paused_job_groups,
            signaler: self.signaler,
            clock: self.clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::testing;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;
    use sprocket_core::{Calendar, GroupMatcher, JobKey, SimpleTrigger, TriggerKey};
    use sprocket_interfaces::{IndexSpec, Sort};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ----------------------------------------------------------------
    // Fault injection for rollback coverage
    // ----------------------------------------------------------------

    struct FlakyBackend {
        inner: MemoryBackend,
        failing_trigger_inserts: Arc<AtomicUsize>,
    }

    impl DocumentBackend for FlakyBackend {
        fn collection(
            &self,
            name: &str,
            write_concern: WriteConcern,
        ) -> Arc<dyn DocumentCollection> {
            let inner = self.inner.collection(name, write_concern);
            if name.ends_with("_triggers") {
                Arc::new(FlakyCollection {
                    inner,
                    failing_inserts: self.failing_trigger_inserts.clone(),
                })
            } else {
                inner
            }
        }
    }

    struct FlakyCollection {
        inner: Arc<dyn DocumentCollection>,
        failing_inserts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentCollection for FlakyCollection {
        async fn insert(&self, doc: Document) -> Result<DocumentId, BackendError> {
            let remaining = self.failing_inserts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
                return Err(BackendError::Internal("injected write failure".to_string()));
            }
            self.inner.insert(doc).await
        }

        async fn find(
            &self,
            filter: &Filter,
            sort: Option<&Sort>,
            limit: Option<u64>,
        ) -> Result<Vec<Document>, BackendError> {
            self.inner.find(filter, sort, limit).await
        }

        async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, BackendError> {
            self.inner.find_one(filter).await
        }

        async fn replace_one(
            &self,
            filter: &Filter,
            doc: Document,
            upsert: bool,
        ) -> Result<u64, BackendError> {
            self.inner.replace_one(filter, doc, upsert).await
        }

        async fn update_many(&self, filter: &Filter, set: Document) -> Result<u64, BackendError> {
            self.inner.update_many(filter, set).await
        }

        async fn delete_many(&self, filter: &Filter) -> Result<u64, BackendError> {
            self.inner.delete_many(filter).await
        }

        async fn count(&self, filter: &Filter) -> Result<u64, BackendError> {
            self.inner.count(filter).await
        }

        async fn distinct(&self, field: &str, filter: &Filter) -> Result<Vec<String>, BackendError> {
            self.inner.distinct(field, filter).await
        }

        async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), BackendError> {
            self.inner.ensure_index(spec).await
        }

        async fn drop_index(&self, name: &str) -> Result<(), BackendError> {
            self.inner.drop_index(name).await
        }
    }

    async fn flaky_store() -> (DocumentJobStore, Arc<AtomicUsize>) {
        let failing_trigger_inserts = Arc::new(AtomicUsize::new(0));
        let backend = FlakyBackend {
            inner: MemoryBackend::new(),
            failing_trigger_inserts: failing_trigger_inserts.clone(),
        };
        let store = DocumentJobStore::builder(StoreConfig::for_instance("node-a"))
            .backend(Arc::new(backend))
            .build()
            .await
            .unwrap();
        (store, failing_trigger_inserts)
    }

    // ----------------------------------------------------------------
    // Jobs
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn store_job_without_replace_is_idempotent() {
        let store = testing::memory_store("node-a").await;
        let original = JobDetail::builder("report")
            .with_identity("j", "g")
            .with_description("first")
            .build();
        let first_id = store.store_job(&original, false).await.unwrap();

        let altered = JobDetail::builder("report")
            .with_identity("j", "g")
            .with_description("second")
            .build();
        let second_id = store.store_job(&altered, false).await.unwrap();
        assert_eq!(first_id, second_id);
        let stored = store.retrieve_job(original.key()).await.unwrap().unwrap();
        assert_eq!(stored.description(), Some("first"));
    }

    #[tokio::test]
    async fn store_job_with_replace_overwrites_and_keeps_id() {
        let store = testing::memory_store("node-a").await;
        let original = JobDetail::builder("report").with_identity("j", "g").build();
        let id = store.store_job(&original, false).await.unwrap();

        let altered = JobDetail::builder("report")
            .with_identity("j", "g")
            .with_description("replaced")
            .store_durably(true)
            .build();
        let replaced_id = store.store_job(&altered, true).await.unwrap();
        assert_eq!(id, replaced_id);
        let stored = store.retrieve_job(original.key()).await.unwrap().unwrap();
        assert_eq!(stored.description(), Some("replaced"));
        assert!(stored.is_durable());
    }

    #[tokio::test]
    async fn remove_job_takes_its_triggers_along() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, trigger) = testing::job_and_simple_trigger("j", "t1", "g", now);
        store.store_job_and_trigger(&job, &trigger).await.unwrap();
        let second = testing::simple_trigger("t2", "g", job.key().clone(), now);
        store.store_trigger(&second, false).await.unwrap();

        assert!(store.remove_job(job.key()).await.unwrap());
        assert_eq!(store.number_of_jobs().await.unwrap(), 0);
        assert_eq!(store.number_of_triggers().await.unwrap(), 0);
        assert!(!store.remove_job(job.key()).await.unwrap());
    }

    // ----------------------------------------------------------------
    // Triggers and the orphan rule
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn store_trigger_requires_an_existing_job() {
        let store = testing::memory_store("node-a").await;
        let trigger = testing::simple_trigger("t", "g", JobKey::new("ghost", "g"), store.now());
        let err = store.store_trigger(&trigger, false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn duplicate_trigger_without_replace_already_exists() {
        let store = testing::memory_store("node-a").await;
        let (job, trigger) = testing::job_and_simple_trigger("j", "t", "g", store.now());
        store.store_job_and_trigger(&job, &trigger).await.unwrap();
        let err = store.store_trigger(&trigger, false).await.unwrap_err();
        assert!(err.is_already_exists());
        store.store_trigger(&trigger, true).await.unwrap();
    }

    #[tokio::test]
    async fn last_trigger_removal_sweeps_non_durable_job() {
        // Two triggers on a non-durable job: removing the first leaves
        // the job, removing the second takes it along.
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, t1) = testing::job_and_simple_trigger("j", "t1", "g", now);
        store.store_job_and_trigger(&job, &t1).await.unwrap();
        let t2 = testing::simple_trigger("t2", "g", job.key().clone(), now);
        store.store_trigger(&t2, false).await.unwrap();

        assert!(store.remove_trigger(&t1.core.key).await.unwrap());
        assert!(store.check_job_exists(job.key()).await.unwrap());

        assert!(store.remove_trigger(&t2.core.key).await.unwrap());
        assert!(!store.check_job_exists(job.key()).await.unwrap());
    }

    #[tokio::test]
    async fn durable_job_survives_its_last_trigger() {
        let store = testing::memory_store("node-a").await;
        let job = JobDetail::builder("keeper")
            .with_identity("j", "g")
            .store_durably(true)
            .build();
        store.store_job(&job, false).await.unwrap();
        let trigger = testing::simple_trigger("t", "g", job.key().clone(), store.now());
        store.store_trigger(&trigger, false).await.unwrap();

        assert!(store.remove_trigger(&trigger.core.key).await.unwrap());
        assert!(store.check_job_exists(job.key()).await.unwrap());
    }

    #[tokio::test]
    async fn orphaned_trigger_reads_degrade_to_absent() {
        let store = testing::memory_store("node-a").await;
        let (job, trigger) = testing::job_and_simple_trigger("j", "t", "g", store.now());
        store.store_job_and_trigger(&job, &trigger).await.unwrap();
        // Delete the job out from under the trigger, bypassing
        // remove_job's sweep.
        store
            .jobs
            .delete_many(&query::job_key_filter(job.key()))
            .await
            .unwrap();

        assert!(store
            .retrieve_trigger(&trigger.core.key)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_triggers_for_job(job.key())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn replace_trigger_requires_same_job() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job_a, trigger) = testing::job_and_simple_trigger("ja", "t", "g", now);
        store.store_job_and_trigger(&job_a, &trigger).await.unwrap();
        let (job_b, _) = testing::job_and_simple_trigger("jb", "unused", "g", now);
        store.store_job(&job_b, false).await.unwrap();

        let replacement = testing::simple_trigger("t", "g", job_b.key().clone(), now);
        let err = store
            .replace_trigger(&trigger.core.key, Box::new(replacement))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JobMismatch { .. }));
    }

    #[tokio::test]
    async fn replace_trigger_missing_is_not_found() {
        let store = testing::memory_store("node-a").await;
        let (job, _) = testing::job_and_simple_trigger("j", "t", "g", store.now());
        store.store_job(&job, false).await.unwrap();
        let replacement = testing::simple_trigger("t", "g", job.key().clone(), store.now());
        let err = store
            .replace_trigger(&TriggerKey::new("t", "g"), Box::new(replacement))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn replace_trigger_carries_data_map_forward() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, mut old) = testing::job_and_simple_trigger("j", "t", "g", now);
        old.core.data.insert("carried", json!("yes"));
        store.store_job_and_trigger(&job, &old).await.unwrap();

        let replacement = testing::simple_trigger("t", "g", job.key().clone(), now + Duration::seconds(5));
        store
            .replace_trigger(&old.core.key, Box::new(replacement))
            .await
            .unwrap();
        let stored = store.retrieve_trigger(&old.core.key).await.unwrap().unwrap();
        assert_eq!(stored.core().data.get("carried"), Some(&json!("yes")));
        assert_eq!(
            stored.core().next_fire_time,
            Some(now + Duration::seconds(5))
        );
    }

    #[tokio::test]
    async fn replace_trigger_keeps_caller_supplied_data() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, mut old) = testing::job_and_simple_trigger("j", "t", "g", now);
        old.core.data.insert("carried", json!("old"));
        store.store_job_and_trigger(&job, &old).await.unwrap();

        let mut replacement = testing::simple_trigger("t", "g", job.key().clone(), now);
        replacement.core.data.insert("own", json!("new"));
        store
            .replace_trigger(&old.core.key, Box::new(replacement))
            .await
            .unwrap();
        let stored = store.retrieve_trigger(&old.core.key).await.unwrap().unwrap();
        assert_eq!(stored.core().data.get("own"), Some(&json!("new")));
        assert_eq!(stored.core().data.get("carried"), None);
    }

    #[tokio::test]
    async fn failed_replace_restores_the_original_trigger() {
        let (store, failing_inserts) = flaky_store().await;
        let now = store.now();
        let (job, mut old) = testing::job_and_simple_trigger("j", "t", "g", now);
        old.core.data.insert("marker", json!("original"));
        store.store_job_and_trigger(&job, &old).await.unwrap();

        failing_inserts.store(1, Ordering::SeqCst);
        let replacement = testing::simple_trigger("t", "g", job.key().clone(), now);
        let err = store
            .replace_trigger(&old.core.key, Box::new(replacement))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        let restored = store.retrieve_trigger(&old.core.key).await.unwrap().unwrap();
        assert_eq!(restored.core().data.get("marker"), Some(&json!("original")));
    }

    #[tokio::test]
    async fn rollback_is_best_effort_when_reinsert_also_fails() {
        let (store, failing_inserts) = flaky_store().await;
        let now = store.now();
        let (job, old) = testing::job_and_simple_trigger("j", "t", "g", now);
        store.store_job_and_trigger(&job, &old).await.unwrap();

        failing_inserts.store(2, Ordering::SeqCst);
        let replacement = testing::simple_trigger("t", "g", job.key().clone(), now);
        let err = store
            .replace_trigger(&old.core.key, Box::new(replacement))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(store.retrieve_trigger(&old.core.key).await.unwrap().is_none());
    }

    // ----------------------------------------------------------------
    // Calendars
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn calendar_store_and_remove() {
        let store = testing::memory_store("node-a").await;
        let calendar = Calendar::new("holidays", vec![1, 2, 3]);
        store
            .store_calendar("holidays", &calendar, false, false)
            .await
            .unwrap();
        assert_eq!(store.number_of_calendars().await.unwrap(), 1);

        let err = store
            .store_calendar("holidays", &calendar, false, false)
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        store
            .store_calendar("holidays", &calendar, true, false)
            .await
            .unwrap();

        assert!(store.remove_calendar("holidays").await.unwrap());
        assert!(!store.remove_calendar("holidays").await.unwrap());
    }

    #[tokio::test]
    async fn unsupported_calendar_surfaces() {
        let store = testing::memory_store("node-a").await;
        let calendar = Calendar::new("c", Vec::new());
        assert!(matches!(
            store.store_calendar("c", &calendar, true, true).await,
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            store.retrieve_calendar("c").await,
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            store.get_calendar_names().await,
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            store.store_jobs_and_triggers(&[], false).await,
            Err(StoreError::Unsupported(_))
        ));
    }

    // ----------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn key_queries_follow_group_matchers() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        for group in ["etl-prod", "etl-staging", "reports"] {
            let (job, trigger) =
                testing::job_and_simple_trigger(&format!("j-{group}"), &format!("t-{group}"), group, now);
            store.store_job_and_trigger(&job, &trigger).await.unwrap();
        }

        let all = store.get_job_keys(&GroupMatcher::any_group()).await.unwrap();
        assert_eq!(all.len(), 3);
        let etl = store
            .get_trigger_keys(&GroupMatcher::group_starts_with("etl-"))
            .await
            .unwrap();
        assert_eq!(etl.len(), 2);
        let none = store
            .get_job_keys(&GroupMatcher::group_equals("missing"))
            .await
            .unwrap();
        assert!(none.is_empty());

        let mut groups = store.get_trigger_group_names().await.unwrap();
        groups.sort();
        assert_eq!(groups, ["etl-prod", "etl-staging", "reports"]);
    }

    #[tokio::test]
    async fn triggers_for_job_returns_each_reference() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, t1) = testing::job_and_simple_trigger("j", "t1", "g", now);
        store.store_job_and_trigger(&job, &t1).await.unwrap();
        let t2 = testing::simple_trigger("t2", "g", job.key().clone(), now);
        store.store_trigger(&t2, false).await.unwrap();

        let triggers = store.get_triggers_for_job(job.key()).await.unwrap();
        assert_eq!(triggers.len(), 2);
        assert!(store
            .get_triggers_for_job(&JobKey::named("missing"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn clear_all_scheduling_data_leaves_locks() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, trigger) = testing::job_and_simple_trigger("j", "t", "g", now - Duration::seconds(1));
        store.store_job_and_trigger(&job, &trigger).await.unwrap();
        store
            .store_calendar("c", &Calendar::new("c", vec![1]), false, false)
            .await
            .unwrap();
        store
            .pause_triggers(&GroupMatcher::group_equals("g"))
            .await
            .unwrap();
        store.resume_trigger(&trigger.core.key).await.unwrap();
        let acquired = store
            .acquire_next_triggers(now, 1, Duration::zero())
            .await
            .unwrap();
        assert_eq!(acquired.len(), 1);

        store.clear_all_scheduling_data().await.unwrap();
        assert_eq!(store.number_of_jobs().await.unwrap(), 0);
        assert_eq!(store.number_of_triggers().await.unwrap(), 0);
        assert_eq!(store.number_of_calendars().await.unwrap(), 0);
        assert!(store.paused_trigger_groups().await.unwrap().is_empty());
        assert_eq!(store.number_of_locks().await.unwrap(), 1);
    }

    // ----------------------------------------------------------------
    // Builder configuration
    // ----------------------------------------------------------------

    struct StaticConnector(Arc<MemoryBackend>);

    #[async_trait]
    impl BackendConnector for StaticConnector {
        async fn connect(
            &self,
            _config: &StoreConfig,
        ) -> Result<Arc<dyn DocumentBackend>, BackendError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn injected_backend_conflicts_with_connection_parameters() {
        let mut config = StoreConfig::for_instance("node-a");
        config.uri = Some("mongodb://db:27017".to_string());
        let err = DocumentJobStore::builder(config)
            .backend(Arc::new(MemoryBackend::new()))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn connector_requires_uri_or_addresses() {
        let err = DocumentJobStore::builder(StoreConfig::for_instance("node-a"))
            .connector(StaticConnector(Arc::new(MemoryBackend::new())))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn connector_dials_with_uri() {
        let mut config = StoreConfig::for_instance("node-a");
        config.uri = Some("mongodb://db:27017".to_string());
        let store = DocumentJobStore::builder(config)
            .connector(StaticConnector(Arc::new(MemoryBackend::new())))
            .build()
            .await
            .unwrap();
        assert_eq!(store.instance_id(), "node-a");
    }

    #[tokio::test]
    async fn some_backend_source_is_required() {
        let err = DocumentJobStore::builder(StoreConfig::for_instance("node-a"))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn backend_and_connector_together_are_rejected() {
        let err = DocumentJobStore::builder(StoreConfig::for_instance("node-a"))
            .backend(Arc::new(MemoryBackend::new()))
            .connector(StaticConnector(Arc::new(MemoryBackend::new())))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    // ----------------------------------------------------------------
    // Property tests
    // ----------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum ScheduleOp {
        StoreJob { job: usize, durable: bool },
        StoreTrigger { job: usize, trigger: usize },
        RemoveJob { job: usize },
        RemoveTrigger { trigger: usize },
    }

    fn arb_op() -> impl Strategy<Value = ScheduleOp> {
        prop_oneof![
            (0..3usize, any::<bool>())
                .prop_map(|(job, durable)| ScheduleOp::StoreJob { job, durable }),
            (0..3usize, 0..5usize)
                .prop_map(|(job, trigger)| ScheduleOp::StoreTrigger { job, trigger }),
            (0..3usize).prop_map(|job| ScheduleOp::RemoveJob { job }),
            (0..5usize).prop_map(|trigger| ScheduleOp::RemoveTrigger { trigger }),
        ]
    }

    fn job_key(index: usize) -> JobKey {
        JobKey::new(format!("j{index}"), "g")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Any sequence of schedule edits leaves unique keys, intact
        /// job references, and the orphan rule honored.
        #[test]
        fn schedule_edits_preserve_invariants(ops in prop::collection::vec(arb_op(), 1..40)) {
            tokio_test::block_on(async move {
                let store = testing::memory_store("node-a").await;
                let now = store.now();
                for op in ops {
                    match op {
                        ScheduleOp::StoreJob { job, durable } => {
                            let detail = JobDetail::builder("probe")
                                .with_identity(format!("j{job}"), "g")
                                .store_durably(durable)
                                .build();
                            store.store_job(&detail, false).await.unwrap();
                        }
                        ScheduleOp::StoreTrigger { job, trigger } => {
                            let trigger = testing::simple_trigger(
                                &format!("t{trigger}"),
                                "g",
                                job_key(job),
                                now,
                            );
                            match store.store_trigger(&trigger, false).await {
                                Ok(())
                                | Err(StoreError::NotFound(_))
                                | Err(StoreError::AlreadyExists(_)) => {}
                                Err(other) => panic!("unexpected error: {other}"),
                            }
                        }
                        ScheduleOp::RemoveJob { job } => {
                            store.remove_job(&job_key(job)).await.unwrap();
                        }
                        ScheduleOp::RemoveTrigger { trigger } => {
                            store
                                .remove_trigger(&TriggerKey::new(format!("t{trigger}"), "g"))
                                .await
                                .unwrap();
                        }
                    }
                }

                // I1: key sets and raw counts agree.
                let trigger_keys =
                    store.get_trigger_keys(&GroupMatcher::any_group()).await.unwrap();
                assert_eq!(trigger_keys.len() as u64, store.number_of_triggers().await.unwrap());
                let jobs = store.get_job_keys(&GroupMatcher::any_group()).await.unwrap();
                assert_eq!(jobs.len() as u64, store.number_of_jobs().await.unwrap());

                // I2/I7: every stored trigger resolves to its job and
                // carries a next fire time.
                for key in &trigger_keys {
                    let trigger = store
                        .retrieve_trigger(key)
                        .await
                        .unwrap()
                        .unwrap_or_else(|| panic!("trigger {key} is orphaned"));
                    assert!(trigger.core().next_fire_time.is_some());
                    assert!(jobs.contains(&trigger.core().job_key));
                }
            });
        }

        /// Storing then retrieving a job preserves its data map,
        /// durability, and type tag across both data-map layouts.
        #[test]
        fn job_round_trip_is_lossless(
            entries in prop::collection::btree_map(
                "[a-z]{1,8}",
                prop_oneof![
                    "[ -~]{0,12}".prop_map(|s| json!(s)),
                    any::<i64>().prop_map(|n| json!(n)),
                    any::<bool>().prop_map(|b| json!(b)),
                ],
                0..6,
            ),
            durable in any::<bool>(),
        ) {
            tokio_test::block_on(async move {
                let store = testing::memory_store("node-a").await;
                let mut builder = JobDetail::builder("roundtrip")
                    .with_identity("j", "g")
                    .store_durably(durable);
                for (key, value) in &entries {
                    builder = builder.using_data(key.clone(), value.clone());
                }
                let job = builder.build();

                store.store_job(&job, false).await.unwrap();
                let stored = store.retrieve_job(job.key()).await.unwrap().unwrap();
                assert_eq!(stored, job);
                assert!(!stored.data().is_dirty());
            });
        }
    }

    // A compile-time check more than a runtime one: the store is
    // usable from concurrently running tasks.
    #[tokio::test]
    async fn store_is_shareable_across_tasks() {
        let store = Arc::new(testing::memory_store("node-a").await);
        let now = store.now();
        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let (job, trigger) = testing::job_and_simple_trigger(
                    &format!("j{i}"),
                    &format!("t{i}"),
                    "g",
                    now,
                );
                store.store_job_and_trigger(&job, &trigger).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.number_of_jobs().await.unwrap(), 4);
        assert_eq!(store.number_of_triggers().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn trigger_round_trip_preserves_simple_shape() {
        let store = testing::memory_store("node-a").await;
        let now = store.now();
        let (job, mut trigger) = testing::job_and_simple_trigger("j", "t", "g", now);
        trigger.repeat_count = 10;
        trigger.repeat_interval_ms = 15_000;
        trigger.core.priority = 8;
        store.store_job_and_trigger(&job, &trigger).await.unwrap();

        let stored = store.retrieve_trigger(&trigger.core.key).await.unwrap().unwrap();
        let stored = stored
            .as_any()
            .downcast_ref::<SimpleTrigger>()
            .expect("simple trigger");
        assert_eq!(stored, &trigger);
    }
}

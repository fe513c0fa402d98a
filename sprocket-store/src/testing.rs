//! Test support: a shared-backend cluster harness, a recording
//! signaler, and schedule builders. Usable by embedders for their own
//! integration tests as well.

use crate::config::StoreConfig;
use crate::fields;
use crate::memory::MemoryBackend;
use crate::query;
use crate::store::DocumentJobStore;
use chrono::{DateTime, TimeZone, Utc};
use sprocket_core::{JobDetail, JobKey, OperableTrigger, SimpleTrigger, TriggerKey};
use sprocket_interfaces::{
    doc_get_str, DocumentBackend, ManualClock, SchedulerSignaler, WriteConcern,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Signaler that records every notification for later assertions.
#[derive(Default)]
pub struct RecordingSignaler {
    misfired: Mutex<Vec<TriggerKey>>,
    finalized: Mutex<Vec<TriggerKey>>,
    scheduling_changes: AtomicUsize,
}

impl RecordingSignaler {
    pub fn misfire_count(&self) -> usize {
        self.misfired.lock().expect("signaler lock").len()
    }

    pub fn finalized_count(&self) -> usize {
        self.finalized.lock().expect("signaler lock").len()
    }

    pub fn change_count(&self) -> usize {
        self.scheduling_changes.load(Ordering::SeqCst)
    }
}

impl SchedulerSignaler for RecordingSignaler {
    fn notify_trigger_misfired(&self, trigger: Box<dyn OperableTrigger>) {
        self.misfired
            .lock()
            .expect("signaler lock")
            .push(trigger.core().key.clone());
    }

    fn notify_trigger_finalized(&self, trigger: &dyn OperableTrigger) {
        self.finalized
            .lock()
            .expect("signaler lock")
            .push(trigger.core().key.clone());
    }

    fn signal_scheduling_change(&self, _candidate_next_fire_time: Option<DateTime<Utc>>) {
        self.scheduling_changes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A shared in-memory backend plus a manual clock: the fixture for
/// multi-node scenarios. Each `store(instance_id)` call is one
/// scheduler node bootstrapping against the shared database.
pub struct Cluster {
    pub backend: Arc<MemoryBackend>,
    pub clock: Arc<ManualClock>,
    config: StoreConfig,
}

impl Cluster {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut StoreConfig)) -> Self {
        let mut config = StoreConfig::default();
        customize(&mut config);
        Self {
            backend: Arc::new(MemoryBackend::new()),
            clock: Arc::new(ManualClock::starting_at(
                Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            )),
            config,
        }
    }

    pub async fn store(&self, instance_id: &str) -> DocumentJobStore {
        self.build(instance_id, None).await
    }

    pub async fn store_with_signaler(
        &self,
        instance_id: &str,
        signaler: Arc<dyn SchedulerSignaler>,
    ) -> DocumentJobStore {
        self.build(instance_id, Some(signaler)).await
    }

    async fn build(
        &self,
        instance_id: &str,
        signaler: Option<Arc<dyn SchedulerSignaler>>,
    ) -> DocumentJobStore {
        let mut config = self.config.clone();
        config.instance_id = instance_id.to_string();
        let mut builder = DocumentJobStore::builder(config)
            .backend(self.backend.clone())
            .clock(self.clock.clone());
        if let Some(signaler) = signaler {
            builder = builder.signaler(signaler);
        }
        builder.build().await.expect("store bootstrap")
    }

    /// Instance id holding the lock for `(group, name)`, if any.
    pub async fn lock_owner(&self, group: &str, name: &str) -> Option<String> {
        let locks = self
            .backend
            .collection(&self.config.collection_name("locks"), WriteConcern::Fsynced);
        locks
            .find_one(&query::key_filter(group, name))
            .await
            .expect("lock lookup")
            .and_then(|doc| doc_get_str(&doc, fields::INSTANCE_ID).map(str::to_string))
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

/// One store over its own private backend.
pub async fn memory_store(instance_id: &str) -> DocumentJobStore {
    Cluster::new().store(instance_id).await
}

/// A one-shot simple trigger due at `fire_at`.
pub fn simple_trigger(
    name: &str,
    group: &str,
    job_key: JobKey,
    fire_at: DateTime<Utc>,
) -> SimpleTrigger {
    let mut trigger = SimpleTrigger::new(TriggerKey::new(name, group), job_key);
    trigger.core.start_time = fire_at;
    trigger.core.next_fire_time = Some(fire_at);
    trigger
}

/// A non-durable job and a one-shot trigger for it, both in `group`.
pub fn job_and_simple_trigger(
    job_name: &str,
    trigger_name: &str,
    group: &str,
    fire_at: DateTime<Utc>,
) -> (JobDetail, SimpleTrigger) {
    let job = JobDetail::builder("test-job")
        .with_identity(job_name, group)
        .build();
    let trigger = simple_trigger(trigger_name, group, job.key().clone(), fire_at);
    (job, trigger)
}

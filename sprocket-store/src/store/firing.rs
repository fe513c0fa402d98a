//! Fired-trigger bookkeeping and completion handling.

use super::acquisition::lock_document;
use super::DocumentJobStore;
use crate::error::StoreResult;
use crate::fields;
use crate::query;
use sprocket_core::{
    CompletedExecutionInstruction, JobDetail, JobKey, OperableTrigger, TriggerFiredBundle,
};
use sprocket_interfaces::Filter;
use tracing::debug;

fn job_lock_name(key: &JobKey) -> String {
    format!("{}{}", fields::JOB_CONCURRENT_LOCK_PREFIX, key.name)
}

fn job_lock_filter(key: &JobKey) -> Filter {
    query::key_filter(&key.group, &job_lock_name(key))
}

impl DocumentJobStore {
    /// Record that the runtime is about to execute the given acquired
    /// triggers. Each trigger is advanced and re-stored, and a fire
    /// bundle is emitted for it — unless its job disallows concurrent
    /// execution and is already running somewhere in the cluster, in
    /// which case the trigger's claim is released and no bundle is
    /// emitted; the next acquisition cycle retries it.
    pub async fn triggers_fired(
        &self,
        triggers: &mut [Box<dyn OperableTrigger>],
    ) -> StoreResult<Vec<TriggerFiredBundle>> {
        let mut results = Vec::new();

        for trigger in triggers.iter_mut() {
            let key = trigger.core().key.clone();
            debug!(trigger = %key, "trigger fired");

            let calendar = match trigger.core().calendar_name.clone() {
                Some(name) => match self.load_calendar(&name).await? {
                    Some(calendar) => Some(calendar),
                    None => {
                        debug!(trigger = %key, calendar = %name, "named calendar missing, skipping");
                        continue;
                    }
                },
                None => None,
            };

            let previous_fire_time = trigger.core().previous_fire_time;
            trigger.triggered(calendar.as_ref());

            let job = match self.retrieve_job(&trigger.core().job_key).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    debug!(trigger = %key, "job deleted before firing, skipping");
                    continue;
                }
                Err(err) => {
                    self.remove_trigger_lock(&key).await?;
                    return Err(err);
                }
            };

            if job.disallow_concurrent_execution() {
                let lock = lock_document(
                    &job.key().group,
                    &job_lock_name(job.key()),
                    &self.config.instance_id,
                    self.now(),
                );
                match self.locks.insert(lock).await {
                    Ok(_) => debug!(job = %job.key(), "job concurrency lock taken"),
                    Err(err) if err.is_duplicate_key() => {
                        debug!(job = %job.key(), "job disallows concurrent execution and is already running");
                        self.remove_trigger_lock(&key).await?;
                        let filter = job_lock_filter(job.key());
                        if let Some(existing) = self.locks.find_one(&filter).await? {
                            if self.lock_expired(&existing, self.config.job_timeout_ms) {
                                debug!(job = %job.key(), "removing expired job concurrency lock");
                                self.locks.delete_many(&filter).await?;
                            }
                        }
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            results.push(TriggerFiredBundle {
                job: job.clone(),
                trigger: trigger.clone_trigger(),
                calendar,
                fire_time: self.now(),
                scheduled_fire_time: trigger.core().previous_fire_time,
                previous_fire_time,
                next_fire_time: trigger.core().next_fire_time,
            });
            self.store_trigger(trigger.as_ref(), true).await?;
        }

        Ok(results)
    }

    /// Apply the runtime's completion instruction for a finished job
    /// execution, then surrender the trigger's claim.
    pub async fn triggered_job_complete(
        &self,
        trigger: &dyn OperableTrigger,
        job: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> StoreResult<()> {
        let key = &trigger.core().key;
        debug!(trigger = %key, ?instruction, "trigger completed");

        if job.persist_job_data_after_execution() && job.data().is_dirty() {
            debug!(job = %job.key(), "job data map dirty, re-storing");
            self.store_job(job, true).await?;
        }

        if job.disallow_concurrent_execution() {
            debug!(job = %job.key(), "removing job concurrency lock");
            self.locks.delete_many(&job_lock_filter(job.key())).await?;
        }

        // The trigger may have been deleted while the job ran.
        if let Some(reloaded) = self.retrieve_trigger(key).await? {
            match instruction {
                CompletedExecutionInstruction::DeleteTrigger => {
                    if trigger.core().next_fire_time.is_none() {
                        // A reschedule during execution gives the
                        // stored trigger a next fire time and cancels
                        // the delete.
                        if reloaded.core().next_fire_time.is_none() {
                            self.remove_trigger(key).await?;
                        }
                    } else {
                        self.remove_trigger(key).await?;
                        self.signaler.signal_scheduling_change(None);
                    }
                }
                CompletedExecutionInstruction::SetTriggerComplete
                | CompletedExecutionInstruction::SetTriggerError
                | CompletedExecutionInstruction::SetAllJobTriggersComplete
                | CompletedExecutionInstruction::SetAllJobTriggersError => {
                    self.signaler.signal_scheduling_change(None);
                }
                CompletedExecutionInstruction::NoInstruction
                | CompletedExecutionInstruction::ReExecuteJob => {}
            }
        }

        self.remove_trigger_lock(key).await
    }
}

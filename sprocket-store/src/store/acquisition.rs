//! Due-trigger acquisition.
//!
//! Competing nodes claim due triggers by inserting lock documents into
//! the fsync-durable locks collection; the unique `(group, name)`
//! index arbitrates. A lock older than the trigger timeout is presumed
//! to belong to a dead node and may be reclaimed by anyone.

use super::DocumentJobStore;
use crate::error::StoreResult;
use crate::fields;
use crate::query;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sprocket_core::{misfire_instruction, OperableTrigger, StoredTriggerState, TriggerKey};
use sprocket_interfaces::{doc_get_i64, Document, Filter, Sort};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub(crate) fn lock_document(
    group: &str,
    name: &str,
    instance_id: &str,
    at: DateTime<Utc>,
) -> Document {
    [
        (fields::GROUP.to_string(), Value::from(group)),
        (fields::NAME.to_string(), Value::from(name)),
        (fields::INSTANCE_ID.to_string(), Value::from(instance_id)),
        (fields::LOCK_TIME.to_string(), Value::from(at.timestamp_millis())),
    ]
    .into_iter()
    .collect()
}

impl DocumentJobStore {
    /// Claim up to `max_count` triggers due no later than
    /// `no_later_than + time_window`. Triggers due at any earlier time
    /// qualify too. The returned batch is sorted by next fire time
    /// ascending; finer ordering (priority) is the runtime's concern.
    pub async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: Duration,
    ) -> StoreResult<Vec<Box<dyn OperableTrigger>>> {
        let not_after = no_later_than + time_window;
        debug!(max_count, %not_after, "looking for acquirable triggers");

        let mut acquired: BTreeMap<TriggerKey, Box<dyn OperableTrigger>> = BTreeMap::new();
        let due_filter = Filter::and([
            Filter::eq(fields::STATE, StoredTriggerState::Waiting.as_str()),
            Filter::lte(fields::NEXT_FIRE_TIME, not_after.timestamp_millis()),
        ]);

        'scan: loop {
            let candidates = self
                .triggers
                .find(
                    &due_filter,
                    Some(&Sort::ascending(fields::NEXT_FIRE_TIME)),
                    None,
                )
                .await?;

            for doc in &candidates {
                if acquired.len() >= max_count {
                    break 'scan;
                }
                let Some(mut trigger) = self.decode_trigger_document(doc).await? else {
                    continue;
                };
                let key = trigger.core().key.clone();
                if acquired.contains_key(&key) {
                    debug!(trigger = %key, "already acquired in this batch");
                    continue;
                }
                if trigger.core().next_fire_time.is_none() {
                    debug!(trigger = %key, "no next fire time, removing trigger");
                    self.remove_trigger(&key).await?;
                    continue;
                }
                if self.apply_misfire(&mut trigger).await? {
                    match trigger.core().next_fire_time {
                        None => {
                            debug!(trigger = %key, "no next fire time after misfire, removing");
                            self.remove_trigger(&key).await?;
                            continue;
                        }
                        // Rescheduled past the window; another pass
                        // will pick it up when it comes due.
                        Some(next) if next > not_after => {
                            debug!(trigger = %key, %next, "misfired trigger rescheduled past window");
                            continue;
                        }
                        Some(_) => {}
                    }
                }

                let lock =
                    lock_document(&key.group, &key.name, &self.config.instance_id, self.now());
                match self.locks.insert(lock).await {
                    Ok(_) => {
                        info!(trigger = %key, instance = %self.config.instance_id, "acquired trigger");
                        acquired.insert(key, trigger);
                    }
                    Err(err) if err.is_duplicate_key() => {
                        debug!(trigger = %key, "trigger is locked by another scheduler");
                        let lock_filter = query::key_filter(&key.group, &key.name);
                        match self.locks.find_one(&lock_filter).await? {
                            Some(existing)
                                if self.lock_expired(&existing, self.config.trigger_timeout_ms) =>
                            {
                                warn!(trigger = %key, "expired trigger lock found, reclaiming");
                                self.remove_trigger_lock(&key).await?;
                                // Restart the scan for the remaining
                                // slots; what we already hold stays
                                // held.
                                continue 'scan;
                            }
                            // Held and fresh, or deleted under us:
                            // leave this trigger to its owner.
                            _ => continue,
                        }
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            break;
        }

        let mut batch: Vec<Box<dyn OperableTrigger>> = acquired.into_values().collect();
        batch.sort_by_key(|t| t.core().next_fire_time);
        Ok(batch)
    }

    /// Hand back a claimed trigger. The lock is deleted regardless of
    /// which instance holds it, so any node can clear a stuck claim.
    pub async fn release_acquired_trigger(
        &self,
        trigger: &dyn OperableTrigger,
    ) -> StoreResult<()> {
        self.remove_trigger_lock(&trigger.core().key).await
    }

    pub(crate) async fn remove_trigger_lock(&self, key: &TriggerKey) -> StoreResult<()> {
        debug!(trigger = %key, instance = %self.config.instance_id, "removing trigger lock");
        self.locks
            .delete_many(&query::key_filter(&key.group, &key.name))
            .await?;
        Ok(())
    }

    pub(crate) fn lock_expired(&self, lock: &Document, timeout_ms: u64) -> bool {
        let Some(locked_at) = doc_get_i64(lock, fields::LOCK_TIME) else {
            return true;
        };
        let elapsed = self.now().timestamp_millis() - locked_at;
        elapsed > timeout_ms as i64
    }

    /// Reconcile a trigger whose fire time slipped past the misfire
    /// threshold. Returns whether the trigger was updated; the caller
    /// re-reads the next fire time afterwards.
    pub(crate) async fn apply_misfire(
        &self,
        trigger: &mut Box<dyn OperableTrigger>,
    ) -> StoreResult<bool> {
        let now = self.now();
        let threshold = self.config.misfire_threshold_ms;
        let misfire_time = if threshold > 0 {
            now - Duration::milliseconds(threshold as i64)
        } else {
            now
        };

        let Some(scheduled) = trigger.core().next_fire_time else {
            return Ok(false);
        };
        if scheduled > misfire_time
            || trigger.core().misfire_instruction == misfire_instruction::IGNORE_MISFIRE_POLICY
        {
            return Ok(false);
        }

        debug!(trigger = %trigger.core().key, %scheduled, "trigger misfired");
        let calendar = match trigger.core().calendar_name.clone() {
            Some(name) => self.load_calendar(&name).await?,
            None => None,
        };

        self.signaler.notify_trigger_misfired(trigger.clone_trigger());
        trigger.update_after_misfire(now, calendar.as_ref());

        match trigger.core().next_fire_time {
            None => self.signaler.notify_trigger_finalized(trigger.as_ref()),
            Some(next) if next == scheduled => return Ok(false),
            Some(_) => {}
        }

        self.store_trigger(trigger.as_ref(), true).await?;
        Ok(true)
    }
}

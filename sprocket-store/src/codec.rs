//! Encoding and decoding between domain values and store documents.

use crate::error::{StoreError, StoreResult};
use crate::fields;
use crate::helpers::TriggerPersistenceHelper;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sprocket_core::{
    Calendar, JobDataMap, JobDetail, JobKey, OperableTrigger, StoredTriggerState, TriggerKey,
    TypeRegistry, DEFAULT_PRIORITY,
};
use sprocket_interfaces::{doc_get_i64, doc_get_str, BlobCodec, Document};
use std::sync::Arc;

pub(crate) fn datetime_to_millis(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_millis())
}

pub(crate) fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn doc_get_datetime(doc: &Document, field: &str) -> Option<DateTime<Utc>> {
    doc_get_i64(doc, field).and_then(millis_to_datetime)
}

fn require_str<'d>(doc: &'d Document, field: &str) -> StoreResult<&'d str> {
    doc_get_str(doc, field).ok_or_else(|| StoreError::Serialization {
        key: field.to_string(),
        reason: "missing or non-string document field".to_string(),
    })
}

/// Translates jobs, triggers, and calendars to and from documents.
/// Shape-specific trigger attributes pass through the persistence
/// helpers; opaque payloads pass through the blob codec.
pub(crate) struct DocumentCodec {
    blobs: Arc<dyn BlobCodec>,
    registry: TypeRegistry,
    helpers: Vec<Box<dyn TriggerPersistenceHelper>>,
}

impl DocumentCodec {
    pub(crate) fn new(
        blobs: Arc<dyn BlobCodec>,
        registry: TypeRegistry,
        helpers: Vec<Box<dyn TriggerPersistenceHelper>>,
    ) -> Self {
        Self {
            blobs,
            registry,
            helpers,
        }
    }

    pub(crate) fn encode_job(&self, job: &JobDetail) -> StoreResult<Document> {
        let mut doc = Document::new();
        doc.insert(fields::GROUP.into(), Value::from(job.key().group.clone()));
        doc.insert(fields::NAME.into(), Value::from(job.key().name.clone()));
        doc.insert(fields::TYPE_TAG.into(), Value::from(job.type_tag()));
        if let Some(description) = job.description() {
            doc.insert(fields::DESCRIPTION.into(), Value::from(description));
        }
        doc.insert(fields::DURABLE.into(), Value::from(job.is_durable()));
        doc.insert(
            fields::DISALLOW_CONCURRENT.into(),
            Value::from(job.disallow_concurrent_execution()),
        );
        doc.insert(
            fields::PERSIST_DATA.into(),
            Value::from(job.persist_job_data_after_execution()),
        );
        self.encode_job_data(job.data(), &mut doc)?;
        Ok(doc)
    }

    /// A map of plain strings is stored as inline scalar fields; any
    /// other map becomes one opaque blob field. Inline storage is
    /// skipped when a data key would shadow a reserved field.
    fn encode_job_data(&self, data: &JobDataMap, doc: &mut Document) -> StoreResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let shadows_reserved = data
            .entries()
            .keys()
            .any(|k| fields::JOB_RESERVED.contains(&k.as_str()));
        if data.is_all_strings() && !shadows_reserved {
            for (key, value) in data.entries() {
                doc.insert(key.clone(), value.clone());
            }
        } else {
            let blob = self.blobs.encode_map(data.entries())?;
            doc.insert(fields::DATA_MAP.into(), Value::from(blob));
        }
        Ok(())
    }

    pub(crate) fn decode_job(&self, doc: &Document) -> StoreResult<JobDetail> {
        let key = JobKey::new(require_str(doc, fields::NAME)?, require_str(doc, fields::GROUP)?);
        let type_tag = doc_get_str(doc, fields::TYPE_TAG)
            .or_else(|| doc_get_str(doc, fields::LEGACY_JOB_CLASS))
            .ok_or_else(|| StoreError::Serialization {
                key: fields::TYPE_TAG.to_string(),
                reason: format!("job {key} has no type tag"),
            })?;

        let mut builder = JobDetail::builder(type_tag)
            .with_identity(key.name.clone(), key.group.clone())
            .store_durably(decode_flag(doc, fields::DURABLE)?)
            .disallow_concurrent_execution(decode_flag(doc, fields::DISALLOW_CONCURRENT)?)
            .persist_job_data_after_execution(decode_flag(doc, fields::PERSIST_DATA)?);
        if let Some(description) = doc_get_str(doc, fields::DESCRIPTION) {
            builder = builder.with_description(description);
        }

        let data = match doc_get_str(doc, fields::DATA_MAP) {
            Some(blob) => JobDataMap::from_entries(self.blobs.decode_map(blob)?),
            None => doc
                .iter()
                .filter(|(k, _)| !fields::JOB_RESERVED.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(builder.using_data_map(data).build())
    }

    pub(crate) fn encode_trigger(
        &self,
        trigger: &dyn OperableTrigger,
        job_id: Value,
    ) -> StoreResult<Document> {
        let core = trigger.core();
        let mut doc = Document::new();
        // Stored triggers always re-enter the waiting state; pausing
        // happens through explicit state transitions afterwards.
        doc.insert(
            fields::STATE.into(),
            Value::from(StoredTriggerState::Waiting.as_str()),
        );
        doc.insert(fields::GROUP.into(), Value::from(core.key.group.clone()));
        doc.insert(fields::NAME.into(), Value::from(core.key.name.clone()));
        doc.insert(fields::JOB_ID.into(), job_id);
        doc.insert(fields::TYPE_TAG.into(), Value::from(trigger.type_tag()));
        if let Some(description) = &core.description {
            doc.insert(fields::DESCRIPTION.into(), Value::from(description.clone()));
        }
        if let Some(calendar_name) = &core.calendar_name {
            doc.insert(
                fields::CALENDAR_NAME.into(),
                Value::from(calendar_name.clone()),
            );
        }
        if let Some(fire_instance_id) = &core.fire_instance_id {
            doc.insert(
                fields::FIRE_INSTANCE_ID.into(),
                Value::from(fire_instance_id.clone()),
            );
        }
        doc.insert(
            fields::MISFIRE_INSTRUCTION.into(),
            Value::from(core.misfire_instruction),
        );
        doc.insert(fields::PRIORITY.into(), Value::from(core.priority));
        doc.insert(fields::START_TIME.into(), datetime_to_millis(core.start_time));
        if let Some(end) = core.end_time {
            doc.insert(fields::END_TIME.into(), datetime_to_millis(end));
        }
        if let Some(next) = core.next_fire_time {
            doc.insert(fields::NEXT_FIRE_TIME.into(), datetime_to_millis(next));
        }
        if let Some(previous) = core.previous_fire_time {
            doc.insert(
                fields::PREVIOUS_FIRE_TIME.into(),
                datetime_to_millis(previous),
            );
        }
        if let Some(final_fire) = core.final_fire_time {
            doc.insert(fields::FINAL_FIRE_TIME.into(), datetime_to_millis(final_fire));
        }
        if !core.data.is_empty() {
            let blob = self.blobs.encode_map(core.data.entries())?;
            doc.insert(fields::DATA_MAP.into(), Value::from(blob));
        }
        self.helper_for(trigger)?.inject_for_storage(trigger, &mut doc);
        Ok(doc)
    }

    pub(crate) fn decode_trigger(
        &self,
        doc: &Document,
        job_key: JobKey,
    ) -> StoreResult<Box<dyn OperableTrigger>> {
        let key = TriggerKey::new(require_str(doc, fields::NAME)?, require_str(doc, fields::GROUP)?);
        let type_tag = require_str(doc, fields::TYPE_TAG)?;
        let mut trigger = self
            .registry
            .create_trigger(type_tag, key.clone(), job_key)
            .ok_or_else(|| {
                StoreError::NotFound(format!("trigger type tag '{type_tag}' for {key}"))
            })?;

        {
            let core = trigger.core_mut();
            core.description = doc_get_str(doc, fields::DESCRIPTION).map(str::to_string);
            core.calendar_name = doc_get_str(doc, fields::CALENDAR_NAME).map(str::to_string);
            core.fire_instance_id = doc_get_str(doc, fields::FIRE_INSTANCE_ID).map(str::to_string);
            core.misfire_instruction = doc_get_i64(doc, fields::MISFIRE_INSTRUCTION)
                .map(|v| v as i32)
                .unwrap_or_default();
            core.priority = doc_get_i64(doc, fields::PRIORITY)
                .map(|v| v as i32)
                .unwrap_or(DEFAULT_PRIORITY);
            if let Some(start) = doc_get_datetime(doc, fields::START_TIME) {
                core.start_time = start;
            }
            core.end_time = doc_get_datetime(doc, fields::END_TIME);
            core.next_fire_time = doc_get_datetime(doc, fields::NEXT_FIRE_TIME);
            core.previous_fire_time = doc_get_datetime(doc, fields::PREVIOUS_FIRE_TIME);
            core.final_fire_time = doc_get_datetime(doc, fields::FINAL_FIRE_TIME);
            if let Some(blob) = doc_get_str(doc, fields::DATA_MAP) {
                core.data = JobDataMap::from_entries(self.blobs.decode_map(blob)?);
            }
        }
        self.helper_for(trigger.as_ref())?
            .hydrate_after_construct(trigger.as_mut(), doc);
        Ok(trigger)
    }

    pub(crate) fn encode_calendar(&self, name: &str, calendar: &Calendar) -> StoreResult<Document> {
        let mut doc = Document::new();
        doc.insert(fields::NAME.into(), Value::from(name));
        doc.insert(
            fields::SERIALIZED_CALENDAR.into(),
            Value::from(self.blobs.encode_calendar(calendar)?),
        );
        Ok(doc)
    }

    pub(crate) fn decode_calendar(&self, doc: &Document) -> StoreResult<Calendar> {
        let name = require_str(doc, fields::NAME)?;
        let blob = require_str(doc, fields::SERIALIZED_CALENDAR)?;
        Ok(self.blobs.decode_calendar(name, blob)?)
    }

    fn helper_for(
        &self,
        trigger: &dyn OperableTrigger,
    ) -> StoreResult<&dyn TriggerPersistenceHelper> {
        self.helpers
            .iter()
            .find(|h| h.can_handle(trigger))
            .map(|h| h.as_ref())
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "persistence helper for trigger type '{}'",
                    trigger.type_tag()
                ))
            })
    }
}

fn decode_flag(doc: &Document, field: &str) -> StoreResult<bool> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        // Tolerate the stringly-typed form older writers produced.
        Some(Value::String(s)) => Ok(s == "true"),
        Some(other) => Err(StoreError::Serialization {
            key: field.to_string(),
            reason: format!("unexpected value {other} for boolean field"),
        }),
    }
}

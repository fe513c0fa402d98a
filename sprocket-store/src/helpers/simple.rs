use super::TriggerPersistenceHelper;
use crate::fields;
use serde_json::Value;
use sprocket_core::{OperableTrigger, SimpleTrigger};
use sprocket_interfaces::{doc_get_i64, Document};

/// Fixed-interval triggers: repeat count, interval, and times fired.
pub struct SimpleHelper;

impl TriggerPersistenceHelper for SimpleHelper {
    fn can_handle(&self, trigger: &dyn OperableTrigger) -> bool {
        trigger.as_any().is::<SimpleTrigger>()
    }

    fn inject_for_storage(&self, trigger: &dyn OperableTrigger, doc: &mut Document) {
        let Some(simple) = trigger.as_any().downcast_ref::<SimpleTrigger>() else {
            return;
        };
        doc.insert(fields::REPEAT_COUNT.into(), Value::from(simple.repeat_count));
        doc.insert(
            fields::REPEAT_INTERVAL.into(),
            Value::from(simple.repeat_interval_ms),
        );
        doc.insert(
            fields::TIMES_TRIGGERED.into(),
            Value::from(simple.times_triggered),
        );
    }

    fn hydrate_after_construct(&self, trigger: &mut dyn OperableTrigger, doc: &Document) {
        let Some(simple) = trigger.as_any_mut().downcast_mut::<SimpleTrigger>() else {
            return;
        };
        simple.repeat_count = doc_get_i64(doc, fields::REPEAT_COUNT).unwrap_or_default() as i32;
        simple.repeat_interval_ms = doc_get_i64(doc, fields::REPEAT_INTERVAL).unwrap_or_default();
        simple.times_triggered =
            doc_get_i64(doc, fields::TIMES_TRIGGERED).unwrap_or_default() as i32;
    }
}

use super::TriggerPersistenceHelper;
use crate::fields;
use serde_json::Value;
use sprocket_core::{CalendarIntervalTrigger, IntervalUnit, OperableTrigger};
use sprocket_interfaces::{doc_get_i64, doc_get_str, Document};

/// Calendar-unit interval triggers: interval size and unit.
pub struct CalendarIntervalHelper;

impl TriggerPersistenceHelper for CalendarIntervalHelper {
    fn can_handle(&self, trigger: &dyn OperableTrigger) -> bool {
        trigger.as_any().is::<CalendarIntervalTrigger>()
    }

    fn inject_for_storage(&self, trigger: &dyn OperableTrigger, doc: &mut Document) {
        let Some(interval) = trigger.as_any().downcast_ref::<CalendarIntervalTrigger>() else {
            return;
        };
        doc.insert(
            fields::REPEAT_INTERVAL.into(),
            Value::from(interval.repeat_interval),
        );
        doc.insert(
            fields::REPEAT_INTERVAL_UNIT.into(),
            Value::from(interval.repeat_interval_unit.as_str()),
        );
    }

    fn hydrate_after_construct(&self, trigger: &mut dyn OperableTrigger, doc: &Document) {
        let Some(interval) = trigger
            .as_any_mut()
            .downcast_mut::<CalendarIntervalTrigger>()
        else {
            return;
        };
        interval.repeat_interval =
            doc_get_i64(doc, fields::REPEAT_INTERVAL).unwrap_or(1) as i32;
        interval.repeat_interval_unit = doc_get_str(doc, fields::REPEAT_INTERVAL_UNIT)
            .and_then(IntervalUnit::parse)
            .unwrap_or(IntervalUnit::Day);
    }
}

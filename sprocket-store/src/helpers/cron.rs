use super::TriggerPersistenceHelper;
use crate::fields;
use serde_json::Value;
use sprocket_core::{CronTrigger, OperableTrigger};
use sprocket_interfaces::{doc_get_str, Document};

/// Cron triggers: expression and optional time zone name.
pub struct CronHelper;

impl TriggerPersistenceHelper for CronHelper {
    fn can_handle(&self, trigger: &dyn OperableTrigger) -> bool {
        trigger.as_any().is::<CronTrigger>()
    }

    fn inject_for_storage(&self, trigger: &dyn OperableTrigger, doc: &mut Document) {
        let Some(cron) = trigger.as_any().downcast_ref::<CronTrigger>() else {
            return;
        };
        doc.insert(
            fields::CRON_EXPRESSION.into(),
            Value::from(cron.cron_expression.clone()),
        );
        if let Some(zone) = &cron.time_zone {
            doc.insert(fields::TIME_ZONE.into(), Value::from(zone.clone()));
        }
    }

    fn hydrate_after_construct(&self, trigger: &mut dyn OperableTrigger, doc: &Document) {
        let Some(cron) = trigger.as_any_mut().downcast_mut::<CronTrigger>() else {
            return;
        };
        cron.cron_expression = doc_get_str(doc, fields::CRON_EXPRESSION)
            .unwrap_or_default()
            .to_string();
        cron.time_zone = doc_get_str(doc, fields::TIME_ZONE).map(str::to_string);
    }
}

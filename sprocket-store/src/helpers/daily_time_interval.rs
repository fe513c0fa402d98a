use super::TriggerPersistenceHelper;
use crate::fields;
use chrono::NaiveTime;
use serde_json::Value;
use sprocket_core::{DailyTimeIntervalTrigger, IntervalUnit, OperableTrigger};
use sprocket_interfaces::{doc_get_i64, doc_get_str, Document};

const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Daily time-window triggers: window bounds, interval, and weekdays.
pub struct DailyTimeIntervalHelper;

impl TriggerPersistenceHelper for DailyTimeIntervalHelper {
    fn can_handle(&self, trigger: &dyn OperableTrigger) -> bool {
        trigger.as_any().is::<DailyTimeIntervalTrigger>()
    }

    fn inject_for_storage(&self, trigger: &dyn OperableTrigger, doc: &mut Document) {
        let Some(daily) = trigger.as_any().downcast_ref::<DailyTimeIntervalTrigger>() else {
            return;
        };
        doc.insert(
            fields::START_TIME_OF_DAY.into(),
            Value::from(daily.start_time_of_day.format(TIME_OF_DAY_FORMAT).to_string()),
        );
        doc.insert(
            fields::END_TIME_OF_DAY.into(),
            Value::from(daily.end_time_of_day.format(TIME_OF_DAY_FORMAT).to_string()),
        );
        doc.insert(
            fields::REPEAT_INTERVAL.into(),
            Value::from(daily.repeat_interval),
        );
        doc.insert(
            fields::REPEAT_INTERVAL_UNIT.into(),
            Value::from(daily.repeat_interval_unit.as_str()),
        );
        doc.insert(
            fields::DAYS_OF_WEEK.into(),
            Value::from(daily.days_of_week.iter().copied().collect::<Vec<u32>>()),
        );
    }

    fn hydrate_after_construct(&self, trigger: &mut dyn OperableTrigger, doc: &Document) {
        let Some(daily) = trigger
            .as_any_mut()
            .downcast_mut::<DailyTimeIntervalTrigger>()
        else {
            return;
        };
        if let Some(start) = parse_time_of_day(doc, fields::START_TIME_OF_DAY) {
            daily.start_time_of_day = start;
        }
        if let Some(end) = parse_time_of_day(doc, fields::END_TIME_OF_DAY) {
            daily.end_time_of_day = end;
        }
        daily.repeat_interval = doc_get_i64(doc, fields::REPEAT_INTERVAL).unwrap_or(1) as i32;
        daily.repeat_interval_unit = doc_get_str(doc, fields::REPEAT_INTERVAL_UNIT)
            .and_then(IntervalUnit::parse)
            .unwrap_or(IntervalUnit::Hour);
        if let Some(days) = doc.get(fields::DAYS_OF_WEEK).and_then(Value::as_array) {
            daily.days_of_week = days
                .iter()
                .filter_map(Value::as_u64)
                .map(|d| d as u32)
                .filter(|d| (1..=7).contains(d))
                .collect();
        }
    }
}

fn parse_time_of_day(doc: &Document, field: &str) -> Option<NaiveTime> {
    doc_get_str(doc, field)
        .and_then(|s| NaiveTime::parse_from_str(s, TIME_OF_DAY_FORMAT).ok())
}

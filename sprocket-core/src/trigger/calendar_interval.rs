//! Calendar-unit interval trigger.

use super::{IntervalUnit, OperableTrigger, TriggerCore};
use crate::calendar::Calendar;
use crate::key::{JobKey, TriggerKey};
use chrono::{DateTime, Duration, Months, Utc};
use std::any::Any;

pub const TYPE_TAG: &str = "calendar-interval";

/// Fires every `repeat_interval` units from the start time, where the
/// unit may be a calendar unit (month, year) that does not map to a
/// fixed millisecond span.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarIntervalTrigger {
    pub core: TriggerCore,
    pub repeat_interval: i32,
    pub repeat_interval_unit: IntervalUnit,
}

impl CalendarIntervalTrigger {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self {
            core: TriggerCore::new(key, job_key),
            repeat_interval: 1,
            repeat_interval_unit: IntervalUnit::Day,
        }
    }

    pub fn with_interval(mut self, repeat_interval: i32, unit: IntervalUnit) -> Self {
        self.repeat_interval = repeat_interval;
        self.repeat_interval_unit = unit;
        self
    }

    fn advance(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = self.repeat_interval.max(1);
        match self.repeat_interval_unit {
            IntervalUnit::Millisecond => Some(from + Duration::milliseconds(n as i64)),
            IntervalUnit::Second => Some(from + Duration::seconds(n as i64)),
            IntervalUnit::Minute => Some(from + Duration::minutes(n as i64)),
            IntervalUnit::Hour => Some(from + Duration::hours(n as i64)),
            IntervalUnit::Day => Some(from + Duration::days(n as i64)),
            IntervalUnit::Week => Some(from + Duration::weeks(n as i64)),
            IntervalUnit::Month => from.checked_add_months(Months::new(n as u32)),
            IntervalUnit::Year => from.checked_add_months(Months::new(n as u32 * 12)),
        }
    }
}

impl OperableTrigger for CalendarIntervalTrigger {
    fn core(&self) -> &TriggerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TriggerCore {
        &mut self.core
    }

    fn type_tag(&self) -> &'static str {
        TYPE_TAG
    }

    fn compute_next_fire(
        &self,
        after: DateTime<Utc>,
        _calendar: Option<&Calendar>,
    ) -> Option<DateTime<Utc>> {
        if self.core.end_time.is_some_and(|end| after >= end) {
            return None;
        }
        let mut candidate = self.core.start_time;
        while candidate <= after {
            candidate = self.advance(candidate)?;
        }
        match self.core.end_time {
            Some(end) if candidate > end => None,
            _ => Some(candidate),
        }
    }

    fn clone_trigger(&self) -> Box<dyn OperableTrigger> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//! Daily time-window interval trigger.

use super::{IntervalUnit, OperableTrigger, TriggerCore};
use crate::calendar::Calendar;
use crate::key::{JobKey, TriggerKey};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use std::any::Any;
use std::collections::BTreeSet;

pub const TYPE_TAG: &str = "daily-time-interval";

/// Fires within a daily `[start_time_of_day, end_time_of_day]` window
/// on the configured weekdays, stepping by the repeat interval.
/// Weekdays are numbered 1 (Monday) through 7 (Sunday).
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTimeIntervalTrigger {
    pub core: TriggerCore,
    pub start_time_of_day: NaiveTime,
    pub end_time_of_day: NaiveTime,
    pub repeat_interval: i32,
    pub repeat_interval_unit: IntervalUnit,
    pub days_of_week: BTreeSet<u32>,
}

impl DailyTimeIntervalTrigger {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self {
            core: TriggerCore::new(key, job_key),
            start_time_of_day: NaiveTime::MIN,
            end_time_of_day: NaiveTime::from_hms_opt(23, 59, 59).expect("valid time"),
            repeat_interval: 1,
            repeat_interval_unit: IntervalUnit::Hour,
            days_of_week: (1..=7).collect(),
        }
    }

    pub fn with_window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.start_time_of_day = start;
        self.end_time_of_day = end;
        self
    }

    pub fn with_interval(mut self, repeat_interval: i32, unit: IntervalUnit) -> Self {
        self.repeat_interval = repeat_interval;
        self.repeat_interval_unit = unit;
        self
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = u32>) -> Self {
        self.days_of_week = days.into_iter().collect();
        self
    }

    fn step(&self) -> Duration {
        let n = self.repeat_interval.max(1) as i64;
        match self.repeat_interval_unit {
            IntervalUnit::Second => Duration::seconds(n),
            IntervalUnit::Minute => Duration::minutes(n),
            _ => Duration::hours(n),
        }
    }
}

impl OperableTrigger for DailyTimeIntervalTrigger {
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
        if self.days_of_week.is_empty() {
            return None;
        }
        let step = self.step();
        if step <= Duration::zero() {
            return None;
        }
        let floor = after.max(self.core.start_time - Duration::milliseconds(1));
        let mut date = floor.date_naive();
        // A year of days bounds the scan even for a single weekday.
        for _ in 0..370 {
            if self.days_of_week.contains(&date.weekday().number_from_monday()) {
                let mut slot = date.and_time(self.start_time_of_day).and_utc();
                let window_end = date.and_time(self.end_time_of_day).and_utc();
                while slot <= window_end {
                    if slot > floor {
                        return match self.core.end_time {
                            Some(end) if slot > end => None,
                            _ => Some(slot),
                        };
                    }
                    slot += step;
                }
            }
            date = date.succ_opt()?;
        }
        None
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

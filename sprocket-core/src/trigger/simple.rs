//! Fixed-interval trigger with an optional repeat count.

use super::{OperableTrigger, TriggerCore};
use crate::calendar::Calendar;
use crate::key::{JobKey, TriggerKey};
use chrono::{DateTime, Duration, Utc};
use std::any::Any;

/// Repeat forever.
pub const REPEAT_INDEFINITELY: i32 = -1;

pub const TYPE_TAG: &str = "simple";

/// Fires at `start_time` and then every `repeat_interval_ms` until the
/// repeat count is exhausted or `end_time` passes.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTrigger {
    pub core: TriggerCore,
    pub repeat_count: i32,
    pub repeat_interval_ms: i64,
    pub times_triggered: i32,
}

impl SimpleTrigger {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self {
            core: TriggerCore::new(key, job_key),
            repeat_count: 0,
            repeat_interval_ms: 0,
            times_triggered: 0,
        }
    }

    pub fn with_schedule(mut self, repeat_count: i32, repeat_interval_ms: i64) -> Self {
        self.repeat_count = repeat_count;
        self.repeat_interval_ms = repeat_interval_ms;
        self
    }
}

impl OperableTrigger for SimpleTrigger {
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
        let start = self.core.start_time;
        if self.core.end_time.is_some_and(|end| after >= end) {
            return None;
        }
        if after < start {
            return self.candidate_within_bounds(start);
        }
        if self.repeat_interval_ms <= 0 {
            // One-shot: the start time was the only fire.
            return None;
        }
        let elapsed = (after - start).num_milliseconds();
        let periods = elapsed / self.repeat_interval_ms + 1;
        if self.repeat_count != REPEAT_INDEFINITELY && periods > self.repeat_count as i64 {
            return None;
        }
        let candidate = start + Duration::milliseconds(periods * self.repeat_interval_ms);
        self.candidate_within_bounds(candidate)
    }

    fn triggered(&mut self, calendar: Option<&Calendar>) {
        self.times_triggered += 1;
        let fired_at = self.core.next_fire_time;
        let next = fired_at.and_then(|at| self.compute_next_fire(at, calendar));
        self.core.previous_fire_time = fired_at;
        self.core.next_fire_time = next;
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

impl SimpleTrigger {
    fn candidate_within_bounds(&self, candidate: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.core.end_time {
            Some(end) if candidate > end => None,
            _ => Some(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base(repeat_count: i32, interval_ms: i64) -> SimpleTrigger {
        let mut t = SimpleTrigger::new(TriggerKey::named("t"), JobKey::named("j"))
            .with_schedule(repeat_count, interval_ms);
        t.core.start_time = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        t.core.next_fire_time = Some(t.core.start_time);
        t
    }

    #[test]
    fn fires_on_interval_until_count_exhausted() {
        let t = base(2, 1_000);
        let start = t.core.start_time;
        assert_eq!(t.compute_next_fire(start, None), Some(start + Duration::seconds(1)));
        assert_eq!(
            t.compute_next_fire(start + Duration::seconds(1), None),
            Some(start + Duration::seconds(2))
        );
        assert_eq!(t.compute_next_fire(start + Duration::seconds(2), None), None);
    }

    #[test]
    fn one_shot_has_no_followup() {
        let t = base(0, 0);
        assert_eq!(t.compute_next_fire(t.core.start_time, None), None);
    }

    #[test]
    fn end_time_cuts_the_series_short() {
        let mut t = base(REPEAT_INDEFINITELY, 60_000);
        t.core.end_time = Some(t.core.start_time + Duration::seconds(90));
        assert_eq!(
            t.compute_next_fire(t.core.start_time, None),
            Some(t.core.start_time + Duration::seconds(60))
        );
        assert_eq!(t.compute_next_fire(t.core.start_time + Duration::seconds(61), None), None);
    }

    #[test]
    fn triggered_advances_previous_and_next() {
        let mut t = base(REPEAT_INDEFINITELY, 1_000);
        let first = t.core.next_fire_time.unwrap();
        t.triggered(None);
        assert_eq!(t.core.previous_fire_time, Some(first));
        assert_eq!(t.core.next_fire_time, Some(first + Duration::seconds(1)));
        assert_eq!(t.times_triggered, 1);
    }
}

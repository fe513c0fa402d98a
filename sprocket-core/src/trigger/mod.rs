//! The operable trigger contract and its built-in shapes.
//!
//! The store treats triggers as values: it persists their common core
//! plus shape-specific attributes, and calls back into them to advance
//! fire times. New shapes plug in through the type registry and a
//! persistence helper; nothing in the store knows concrete shapes.

pub mod calendar_interval;
pub mod cron;
pub mod daily_time_interval;
pub mod simple;

use crate::calendar::Calendar;
use crate::job::JobDataMap;
use crate::key::{JobKey, TriggerKey};
use crate::state::misfire_instruction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Priority assigned when the caller does not set one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// State common to every trigger shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCore {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub description: Option<String>,
    pub calendar_name: Option<String>,
    pub fire_instance_id: Option<String>,
    pub misfire_instruction: i32,
    pub priority: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub final_fire_time: Option<DateTime<Utc>>,
    pub data: JobDataMap,
}

impl TriggerCore {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self {
            key,
            job_key,
            description: None,
            calendar_name: None,
            fire_instance_id: None,
            misfire_instruction: misfire_instruction::SMART_POLICY,
            priority: DEFAULT_PRIORITY,
            start_time: DateTime::<Utc>::UNIX_EPOCH,
            end_time: None,
            next_fire_time: None,
            previous_fire_time: None,
            final_fire_time: None,
            data: JobDataMap::new(),
        }
    }

    /// True when the instant falls outside `[start_time, end_time]`.
    pub fn outside_bounds(&self, at: DateTime<Utc>) -> bool {
        at < self.start_time || self.end_time.is_some_and(|end| at > end)
    }
}

/// A trigger the store can persist and advance.
///
/// `triggered` and `update_after_misfire` mutate the trigger in place;
/// the store persists the result. Calendars arrive opaque and shapes
/// are free to ignore them.
pub trait OperableTrigger: fmt::Debug + Send + Sync {
    fn core(&self) -> &TriggerCore;

    fn core_mut(&mut self) -> &mut TriggerCore;

    /// Tag the type registry resolves back to a factory.
    fn type_tag(&self) -> &'static str;

    /// The next fire time strictly after `after`, honoring start and
    /// end bounds.
    fn compute_next_fire(
        &self,
        after: DateTime<Utc>,
        calendar: Option<&Calendar>,
    ) -> Option<DateTime<Utc>>;

    /// Advance bookkeeping for a fire: the pending `next_fire_time`
    /// becomes `previous_fire_time` and the following one is computed.
    fn triggered(&mut self, calendar: Option<&Calendar>) {
        let fired_at = self.core().next_fire_time;
        let next = fired_at.and_then(|at| self.compute_next_fire(at, calendar));
        let core = self.core_mut();
        core.previous_fire_time = fired_at;
        core.next_fire_time = next;
    }

    /// Reconcile a missed fire according to the misfire instruction.
    fn update_after_misfire(&mut self, now: DateTime<Utc>, calendar: Option<&Calendar>) {
        match self.core().misfire_instruction {
            misfire_instruction::IGNORE_MISFIRE_POLICY => {}
            misfire_instruction::DO_NOTHING => {
                let next = self.compute_next_fire(now, calendar);
                self.core_mut().next_fire_time = next;
            }
            // Smart policy and fire-now both bring the trigger due
            // immediately; the schedule resumes from there. A trigger
            // already past its end time is finalized instead.
            _ => {
                let next = if self.core().end_time.is_some_and(|end| now > end) {
                    None
                } else {
                    Some(now)
                };
                self.core_mut().next_fire_time = next;
            }
        }
    }

    fn clone_trigger(&self) -> Box<dyn OperableTrigger>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn OperableTrigger> {
    fn clone(&self) -> Self {
        self.clone_trigger()
    }
}

/// Calendar-style units for the interval trigger shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            IntervalUnit::Millisecond => "MILLISECOND",
            IntervalUnit::Second => "SECOND",
            IntervalUnit::Minute => "MINUTE",
            IntervalUnit::Hour => "HOUR",
            IntervalUnit::Day => "DAY",
            IntervalUnit::Week => "WEEK",
            IntervalUnit::Month => "MONTH",
            IntervalUnit::Year => "YEAR",
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "MILLISECOND" => Some(IntervalUnit::Millisecond),
            "SECOND" => Some(IntervalUnit::Second),
            "MINUTE" => Some(IntervalUnit::Minute),
            "HOUR" => Some(IntervalUnit::Hour),
            "DAY" => Some(IntervalUnit::Day),
            "WEEK" => Some(IntervalUnit::Week),
            "MONTH" => Some(IntervalUnit::Month),
            "YEAR" => Some(IntervalUnit::Year),
            _ => None,
        }
    }
}

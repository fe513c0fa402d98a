//! Cron-expression trigger.

use super::{OperableTrigger, TriggerCore};
use crate::calendar::Calendar;
use crate::key::{JobKey, TriggerKey};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::any::Any;
use std::str::FromStr;

pub const TYPE_TAG: &str = "cron";

/// Fires on the instants produced by a cron expression, evaluated in
/// UTC. An unparseable expression yields no fire times; validation is
/// the caller's concern at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CronTrigger {
    pub core: TriggerCore,
    pub cron_expression: String,
    pub time_zone: Option<String>,
}

impl CronTrigger {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self {
            core: TriggerCore::new(key, job_key),
            cron_expression: String::new(),
            time_zone: None,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = expression.into();
        self
    }
}

impl OperableTrigger for CronTrigger {
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
        let schedule = Schedule::from_str(&self.cron_expression).ok()?;
        let floor = after.max(self.core.start_time - chrono::Duration::milliseconds(1));
        let next = schedule.after(&floor).next()?;
        match self.core.end_time {
            Some(end) if next > end => None,
            _ => Some(next),
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

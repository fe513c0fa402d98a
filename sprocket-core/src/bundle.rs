//! The value handed to the runtime for each trigger firing.

use crate::calendar::Calendar;
use crate::job::JobDetail;
use crate::trigger::OperableTrigger;
use chrono::{DateTime, Utc};

/// Everything the runtime needs to execute one fire: the job, the
/// advanced trigger, the calendar in effect, and the fire timestamps.
#[derive(Debug, Clone)]
pub struct TriggerFiredBundle {
    pub job: JobDetail,
    pub trigger: Box<dyn OperableTrigger>,
    pub calendar: Option<Calendar>,
    /// Wall-clock instant the store processed the fire.
    pub fire_time: DateTime<Utc>,
    /// The instant this fire was scheduled for.
    pub scheduled_fire_time: Option<DateTime<Utc>>,
    /// The fire before this one, if any.
    pub previous_fire_time: Option<DateTime<Utc>>,
    /// The fire after this one, if any.
    pub next_fire_time: Option<DateTime<Utc>>,
}

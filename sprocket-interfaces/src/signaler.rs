//! Callback seam into the scheduler runtime.

use chrono::{DateTime, Utc};
use sprocket_core::OperableTrigger;

/// Notifications the store raises toward the runtime. Implementations
/// must be cheap and non-blocking; they are invoked from inside store
/// operations.
pub trait SchedulerSignaler: Send + Sync {
    /// A trigger missed its fire window and misfire handling ran.
    /// Receives a snapshot taken before the trigger was advanced.
    fn notify_trigger_misfired(&self, trigger: Box<dyn OperableTrigger>);

    /// Misfire handling exhausted a trigger's schedule.
    fn notify_trigger_finalized(&self, trigger: &dyn OperableTrigger);

    /// The schedule changed in a way that may affect the runtime's
    /// next wake-up. `None` means the new earliest fire is unknown.
    fn signal_scheduling_change(&self, candidate_next_fire_time: Option<DateTime<Utc>>);
}

/// Signaler that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignaler;

impl SchedulerSignaler for NoopSignaler {
    fn notify_trigger_misfired(&self, _trigger: Box<dyn OperableTrigger>) {}

    fn notify_trigger_finalized(&self, _trigger: &dyn OperableTrigger) {}

    fn signal_scheduling_change(&self, _candidate_next_fire_time: Option<DateTime<Utc>>) {}
}

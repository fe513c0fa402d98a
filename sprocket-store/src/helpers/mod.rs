//! Per-shape trigger persistence helpers.
//!
//! Each helper knows how to move one trigger shape's extra attributes
//! in and out of a document. Selection is first match in registration
//! order, so more specific shapes must register ahead of shapes they
//! could be mistaken for. Supporting a new shape means registering a
//! helper here and a factory in the type registry; the store core
//! stays shape-blind.

mod calendar_interval;
mod cron;
mod daily_time_interval;
mod simple;

pub use calendar_interval::CalendarIntervalHelper;
pub use cron::CronHelper;
pub use daily_time_interval::DailyTimeIntervalHelper;
pub use simple::SimpleHelper;

use sprocket_core::OperableTrigger;
use sprocket_interfaces::Document;

/// Moves one trigger shape's attributes between trigger values and
/// documents.
pub trait TriggerPersistenceHelper: Send + Sync {
    fn can_handle(&self, trigger: &dyn OperableTrigger) -> bool;

    /// Add shape-specific fields to a document about to be written.
    fn inject_for_storage(&self, trigger: &dyn OperableTrigger, doc: &mut Document);

    /// Populate shape-specific fields on a freshly constructed
    /// trigger.
    fn hydrate_after_construct(&self, trigger: &mut dyn OperableTrigger, doc: &Document);
}

/// The built-in helpers in their registration order.
pub fn default_helpers() -> Vec<Box<dyn TriggerPersistenceHelper>> {
    vec![
        Box::new(SimpleHelper),
        Box::new(CalendarIntervalHelper),
        Box::new(CronHelper),
        Box::new(DailyTimeIntervalHelper),
    ]
}

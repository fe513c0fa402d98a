//! Core domain types for the sprocket job store.
//!
//! This crate defines the values the store persists and coordinates on:
//! job and trigger identities, job detail and data maps, the operable
//! trigger contract with its built-in shapes, stored state symbols,
//! group matchers, calendars, fire bundles, and the trigger type
//! registry. It contains no storage logic.

pub mod bundle;
pub mod calendar;
pub mod job;
pub mod key;
pub mod matcher;
pub mod registry;
pub mod state;
pub mod trigger;

pub use bundle::TriggerFiredBundle;
pub use calendar::Calendar;
pub use job::{JobBuilder, JobDataMap, JobDetail};
pub use key::{JobKey, TriggerKey, DEFAULT_GROUP};
pub use matcher::GroupMatcher;
pub use registry::{TriggerFactory, TypeRegistry};
pub use state::{misfire_instruction, CompletedExecutionInstruction, StoredTriggerState, TriggerState};
pub use trigger::{
    calendar_interval::CalendarIntervalTrigger, cron::CronTrigger,
    daily_time_interval::DailyTimeIntervalTrigger, simple::SimpleTrigger, IntervalUnit,
    OperableTrigger, TriggerCore, DEFAULT_PRIORITY,
};

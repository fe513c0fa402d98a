//! Type registry mapping stored type tags back to trigger factories.
//!
//! The runtime registers `{tag → factory}` pairs at initialization; the
//! store writes tags on encode and asks the registry for factories on
//! decode. This replaces any runtime class lookup: an unknown tag is an
//! absent entry, not a loading error.

use crate::key::{JobKey, TriggerKey};
use crate::trigger::{
    calendar_interval, calendar_interval::CalendarIntervalTrigger, cron, cron::CronTrigger,
    daily_time_interval, daily_time_interval::DailyTimeIntervalTrigger, simple,
    simple::SimpleTrigger, OperableTrigger,
};
use std::collections::HashMap;

/// Constructs an empty trigger of one shape, keyed to its job.
pub type TriggerFactory = fn(TriggerKey, JobKey) -> Box<dyn OperableTrigger>;

/// Registry of trigger shapes known to this scheduler node.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    triggers: HashMap<String, TriggerFactory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the four built-in shapes.
    pub fn with_builtin_triggers() -> Self {
        let mut registry = Self::new();
        registry.register_trigger(simple::TYPE_TAG, |key, job| {
            Box::new(SimpleTrigger::new(key, job))
        });
        registry.register_trigger(calendar_interval::TYPE_TAG, |key, job| {
            Box::new(CalendarIntervalTrigger::new(key, job))
        });
        registry.register_trigger(cron::TYPE_TAG, |key, job| {
            Box::new(CronTrigger::new(key, job))
        });
        registry.register_trigger(daily_time_interval::TYPE_TAG, |key, job| {
            Box::new(DailyTimeIntervalTrigger::new(key, job))
        });
        registry
    }

    pub fn register_trigger(&mut self, tag: impl Into<String>, factory: TriggerFactory) {
        self.triggers.insert(tag.into(), factory);
    }

    /// Construct a trigger for a stored tag, or `None` for an unknown
    /// tag.
    pub fn create_trigger(
        &self,
        tag: &str,
        key: TriggerKey,
        job_key: JobKey,
    ) -> Option<Box<dyn OperableTrigger>> {
        self.triggers.get(tag).map(|factory| factory(key, job_key))
    }

    pub fn knows_trigger(&self, tag: &str) -> bool {
        self.triggers.contains_key(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags_resolve() {
        let registry = TypeRegistry::with_builtin_triggers();
        for tag in ["simple", "cron", "calendar-interval", "daily-time-interval"] {
            let trigger = registry
                .create_trigger(tag, TriggerKey::named("t"), JobKey::named("j"))
                .expect("builtin tag");
            assert_eq!(trigger.type_tag(), tag);
        }
    }

    #[test]
    fn unknown_tag_is_absent() {
        let registry = TypeRegistry::with_builtin_triggers();
        assert!(registry
            .create_trigger("no-such-shape", TriggerKey::named("t"), JobKey::named("j"))
            .is_none());
    }
}

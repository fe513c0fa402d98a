//! Document field names shared across collections.

pub const ID: &str = "_id";
pub const GROUP: &str = "group";
pub const NAME: &str = "name";

// Jobs
pub const TYPE_TAG: &str = "typeTag";
pub const DESCRIPTION: &str = "description";
pub const DURABLE: &str = "durable";
pub const DISALLOW_CONCURRENT: &str = "disallowConcurrentExecution";
pub const PERSIST_DATA: &str = "persistJobDataAfterExecution";
pub const DATA_MAP: &str = "dataMap";
/// Field name used by earlier document layouts for the job type.
pub const LEGACY_JOB_CLASS: &str = "jobClass";

/// Job fields that never belong to the inline data map.
pub const JOB_RESERVED: &[&str] = &[
    ID,
    "id",
    GROUP,
    NAME,
    TYPE_TAG,
    LEGACY_JOB_CLASS,
    DESCRIPTION,
    DURABLE,
    DISALLOW_CONCURRENT,
    PERSIST_DATA,
    DATA_MAP,
];

// Triggers
pub const JOB_ID: &str = "jobId";
pub const STATE: &str = "state";
pub const CALENDAR_NAME: &str = "calendarName";
pub const START_TIME: &str = "startTime";
pub const END_TIME: &str = "endTime";
pub const NEXT_FIRE_TIME: &str = "nextFireTime";
pub const PREVIOUS_FIRE_TIME: &str = "previousFireTime";
pub const FINAL_FIRE_TIME: &str = "finalFireTime";
pub const FIRE_INSTANCE_ID: &str = "fireInstanceId";
pub const MISFIRE_INSTRUCTION: &str = "misfireInstruction";
pub const PRIORITY: &str = "priority";

// Trigger shape attributes
pub const REPEAT_COUNT: &str = "repeatCount";
pub const REPEAT_INTERVAL: &str = "repeatInterval";
pub const REPEAT_INTERVAL_UNIT: &str = "repeatIntervalUnit";
pub const TIMES_TRIGGERED: &str = "timesTriggered";
pub const CRON_EXPRESSION: &str = "cronExpression";
pub const TIME_ZONE: &str = "timezone";
pub const START_TIME_OF_DAY: &str = "startTimeOfDay";
pub const END_TIME_OF_DAY: &str = "endTimeOfDay";
pub const DAYS_OF_WEEK: &str = "daysOfWeek";

// Calendars
pub const SERIALIZED_CALENDAR: &str = "serializedCalendar";

// Locks
pub const INSTANCE_ID: &str = "instanceId";
pub const LOCK_TIME: &str = "lockTime";
/// Name prefix distinguishing job-concurrency locks from trigger locks.
pub const JOB_CONCURRENT_LOCK_PREFIX: &str = "jobconcurrentlock:";

// Index names
pub const KEY_INDEX: &str = "group_1_name_1";
pub const CALENDAR_NAME_INDEX: &str = "name_1";
pub const LOCK_INSTANCE_INDEX: &str = "instanceId_1";
/// Obsolete name-before-group index dropped on bootstrap when present.
pub const LEGACY_KEY_INDEX: &str = "keyName_1_keyGroup_1";

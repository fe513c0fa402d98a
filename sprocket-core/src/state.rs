//! Stored state symbols, misfire instruction codes, and completion
//! instructions.

use serde::{Deserialize, Serialize};

/// State symbol carried by a trigger document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoredTriggerState {
    Waiting,
    Paused,
    Acquired,
    Complete,
    Error,
    Blocked,
    PausedBlocked,
    Deleted,
}

impl StoredTriggerState {
    pub fn as_str(self) -> &'static str {
        match self {
            StoredTriggerState::Waiting => "waiting",
            StoredTriggerState::Paused => "paused",
            StoredTriggerState::Acquired => "acquired",
            StoredTriggerState::Complete => "complete",
            StoredTriggerState::Error => "error",
            StoredTriggerState::Blocked => "blocked",
            StoredTriggerState::PausedBlocked => "paused-blocked",
            StoredTriggerState::Deleted => "deleted",
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "waiting" => Some(StoredTriggerState::Waiting),
            "paused" => Some(StoredTriggerState::Paused),
            "acquired" => Some(StoredTriggerState::Acquired),
            "complete" => Some(StoredTriggerState::Complete),
            "error" => Some(StoredTriggerState::Error),
            "blocked" => Some(StoredTriggerState::Blocked),
            "paused-blocked" => Some(StoredTriggerState::PausedBlocked),
            "deleted" => Some(StoredTriggerState::Deleted),
            _ => None,
        }
    }
}

/// Trigger state as reported to callers, a coarser view than the
/// stored symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerState {
    None,
    Normal,
    Paused,
    Complete,
    Error,
    Blocked,
}

impl TriggerState {
    /// Decode a stored symbol into the reported state. Unknown or
    /// absent symbols and the deleted symbol report as `None`; the
    /// waiting and acquired symbols report as `Normal`.
    pub fn from_stored(symbol: Option<&str>) -> Self {
        let Some(stored) = symbol.and_then(StoredTriggerState::parse) else {
            return TriggerState::None;
        };
        match stored {
            StoredTriggerState::Deleted => TriggerState::None,
            StoredTriggerState::Complete => TriggerState::Complete,
            StoredTriggerState::Paused | StoredTriggerState::PausedBlocked => TriggerState::Paused,
            StoredTriggerState::Error => TriggerState::Error,
            StoredTriggerState::Blocked => TriggerState::Blocked,
            StoredTriggerState::Waiting | StoredTriggerState::Acquired => TriggerState::Normal,
        }
    }
}

/// Per-trigger policy codes selecting how a trigger advances after a
/// missed fire.
pub mod misfire_instruction {
    /// Skip misfire handling entirely.
    pub const IGNORE_MISFIRE_POLICY: i32 = -1;
    /// Let the trigger shape pick a sensible policy.
    pub const SMART_POLICY: i32 = 0;
    /// Fire once now, then resume the schedule.
    pub const FIRE_NOW: i32 = 1;
    /// Advance to the next scheduled time without firing.
    pub const DO_NOTHING: i32 = 2;
}

/// Instruction handed back by the runtime when a fired job completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedExecutionInstruction {
    NoInstruction,
    ReExecuteJob,
    SetTriggerComplete,
    DeleteTrigger,
    SetTriggerError,
    SetAllJobTriggersComplete,
    SetAllJobTriggersError,
}

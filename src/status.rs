//! Status string mappings
//!
//! The controller reports machine, heater and tool states as short words.
//! Each table is kept in case-insensitive alphabetical order so lookups can
//! binary search it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Compare two ASCII strings ignoring case.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Binary search a `(name, value)` table sorted with [`cmp_ignore_case`].
pub fn lookup_sorted<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .binary_search_by(|(entry, _)| cmp_ignore_case(entry, name))
        .ok()
        .map(|i| table[i].1)
}

/// Machine state as shown on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    Connecting,
    PanelInitializing,
    Idle,
    Printing,
    Stopped,
    Configuring,
    Paused,
    Busy,
    Pausing,
    Resuming,
    Flashing,
    ToolChange,
    Simulating,
    Off,
    Cancelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaterStatus {
    Off,
    Standby,
    Active,
    Fault,
    Tuning,
    Offline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Off,
    Standby,
    Active,
}

pub const PRINTER_STATUS_NAMES: &[(&str, PrinterStatus)] = &[
    ("busy", PrinterStatus::Busy),
    ("cancelling", PrinterStatus::Cancelling),
    ("changingTool", PrinterStatus::ToolChange),
    ("halted", PrinterStatus::Stopped),
    ("idle", PrinterStatus::Idle),
    ("off", PrinterStatus::Off),
    ("paused", PrinterStatus::Paused),
    ("pausing", PrinterStatus::Pausing),
    ("processing", PrinterStatus::Printing),
    ("resuming", PrinterStatus::Resuming),
    ("simulating", PrinterStatus::Simulating),
    ("starting", PrinterStatus::Configuring),
    ("updating", PrinterStatus::Flashing),
];

pub const HEATER_STATUS_NAMES: &[(&str, HeaterStatus)] = &[
    ("active", HeaterStatus::Active),
    ("fault", HeaterStatus::Fault),
    ("off", HeaterStatus::Off),
    ("offline", HeaterStatus::Offline),
    ("standby", HeaterStatus::Standby),
    ("tuning", HeaterStatus::Tuning),
];

pub const TOOL_STATUS_NAMES: &[(&str, ToolStatus)] = &[
    ("active", ToolStatus::Active),
    ("off", ToolStatus::Off),
    ("standby", ToolStatus::Standby),
];

impl PrinterStatus {
    /// Map a controller status word. Unknown words yield `None`.
    pub fn from_wire(text: &str) -> Option<Self> {
        lookup_sorted(PRINTER_STATUS_NAMES, text)
    }

    /// A job is running or suspended mid-file
    pub fn job_in_progress(self) -> bool {
        matches!(
            self,
            PrinterStatus::Printing
                | PrinterStatus::Paused
                | PrinterStatus::Pausing
                | PrinterStatus::Resuming
                | PrinterStatus::Simulating
        )
    }

    /// Still talking the controller into a known state
    pub fn is_connecting(self) -> bool {
        matches!(self, PrinterStatus::Connecting | PrinterStatus::PanelInitializing)
    }
}

impl HeaterStatus {
    /// Unknown words map to `Off`
    pub fn from_wire(text: &str) -> Self {
        lookup_sorted(HEATER_STATUS_NAMES, text).unwrap_or(HeaterStatus::Off)
    }
}

impl ToolStatus {
    /// Unknown words map to `Off`
    pub fn from_wire(text: &str) -> Self {
        lookup_sorted(TOOL_STATUS_NAMES, text).unwrap_or(ToolStatus::Off)
    }
}

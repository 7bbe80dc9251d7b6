//! Wire path to field code dispatch
//!
//! Every value in an M409 response arrives as a colon-separated path with
//! `^` standing in for each array index, e.g. `heat:heaters^:current`.
//! Tables are declared grouped by response and sorted once when the
//! dispatcher is built.

use crate::scheduler::Subsystem;
use crate::status::{cmp_ignore_case, lookup_sorted};
use serde::Serialize;

/// Which remaining-time estimate a `job:timesLeft:*` field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeLeftKind {
    File,
    Filament,
    Layer,
}

/// Parts of the `state:messageBox` object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertField {
    AxisControls,
    Message,
    Mode,
    Seq,
    Timeout,
    Title,
}

/// Symbolic code for a value path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCode {
    Key,

    // summary response
    FanActualValue,
    HeaterActive,
    HeaterCurrent,
    HeaterStandby,
    HeaterState,
    JobFilePosition,
    TimesLeft(TimeLeftKind),
    AxisUserPosition,
    ProbeValue,
    Seq(Subsystem),
    SpindleCurrent,
    CurrentTool,
    Status,
    Uptime,
    ToolState,

    // detail responses
    BoardFirmwareName,
    BedHeaters,
    ChamberHeaters,
    JobFileName,
    JobFileSize,
    AxisBabystep,
    AxisHomed,
    AxisLetter,
    AxisVisible,
    AxisWorkplaceOffset,
    ExtruderFactor,
    KinematicsName,
    SpeedFactor,
    WorkplaceNumber,
    NetworkName,
    InterfaceIp,
    SpindleActive,
    SpindleMax,
    SpindleTool,
    MessageBox,
    MessageBoxField(AlertField),
    ToolExtruders,
    ToolHeaters,
    ToolNumber,
    ToolOffsets,
    VolumeMounted,

    // push messages
    PushMessage,
    PushResponse,
    PushSeq,
    BeepDuration,
    BeepFrequency,

    Unknown,
}

/// Symbolic code for an array-end path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayCode {
    Axes,
    Spindles,
    Tools,
    ToolExtruders,
    ToolHeaters,
    BedHeaters,
    ChamberHeaters,
    Volumes,
    Unknown,
}

/// Value of the `key` field at the top of an M409 response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKey {
    /// The `d99f` summary response has an empty key
    NoKey,
    Boards,
    Directories,
    Fans,
    Heat,
    Inputs,
    Job,
    Limits,
    Move,
    Network,
    Reply,
    Scanner,
    Sensors,
    Seqs,
    Spindles,
    State,
    Tools,
    Volumes,
}

impl ResponseKey {
    /// The subsystem whose dirty bit a reply with this key settles
    pub fn subsystem(self) -> Option<Subsystem> {
        match self {
            ResponseKey::Boards => Some(Subsystem::Boards),
            ResponseKey::Directories => Some(Subsystem::Directories),
            ResponseKey::Fans => Some(Subsystem::Fans),
            ResponseKey::Heat => Some(Subsystem::Heat),
            ResponseKey::Inputs => Some(Subsystem::Inputs),
            ResponseKey::Job => Some(Subsystem::Job),
            ResponseKey::Move => Some(Subsystem::Move),
            ResponseKey::Network => Some(Subsystem::Network),
            ResponseKey::Scanner => Some(Subsystem::Scanner),
            ResponseKey::Sensors => Some(Subsystem::Sensors),
            ResponseKey::Spindles => Some(Subsystem::Spindles),
            ResponseKey::State => Some(Subsystem::State),
            ResponseKey::Tools => Some(Subsystem::Tools),
            ResponseKey::Volumes => Some(Subsystem::Volumes),
            ResponseKey::NoKey | ResponseKey::Limits | ResponseKey::Reply | ResponseKey::Seqs => {
                None
            }
        }
    }

    /// Text that replaces the leading `result` of a path in this response.
    /// `Some("")` means strip `result:` entirely.
    fn path_prefix(self) -> Option<&'static str> {
        match self {
            ResponseKey::NoKey => Some(""),
            ResponseKey::Seqs => Some("seqs"),
            other => other.subsystem().map(Subsystem::key),
        }
    }
}

pub const FIELD_TABLE: &[(&str, FieldCode)] = &[
    ("key", FieldCode::Key),
    // M409 F"d99f"
    ("fans^:actualValue", FieldCode::FanActualValue),
    ("heat:heaters^:active", FieldCode::HeaterActive),
    ("heat:heaters^:current", FieldCode::HeaterCurrent),
    ("heat:heaters^:standby", FieldCode::HeaterStandby),
    ("heat:heaters^:state", FieldCode::HeaterState),
    ("job:filePosition", FieldCode::JobFilePosition),
    ("job:timesLeft:filament", FieldCode::TimesLeft(TimeLeftKind::Filament)),
    ("job:timesLeft:file", FieldCode::TimesLeft(TimeLeftKind::File)),
    ("job:timesLeft:layer", FieldCode::TimesLeft(TimeLeftKind::Layer)),
    ("move:axes^:userPosition", FieldCode::AxisUserPosition),
    ("sensors:probes^:value^", FieldCode::ProbeValue),
    ("seqs:boards", FieldCode::Seq(Subsystem::Boards)),
    ("seqs:directories", FieldCode::Seq(Subsystem::Directories)),
    ("seqs:fans", FieldCode::Seq(Subsystem::Fans)),
    ("seqs:heat", FieldCode::Seq(Subsystem::Heat)),
    ("seqs:inputs", FieldCode::Seq(Subsystem::Inputs)),
    ("seqs:job", FieldCode::Seq(Subsystem::Job)),
    ("seqs:move", FieldCode::Seq(Subsystem::Move)),
    ("seqs:network", FieldCode::Seq(Subsystem::Network)),
    ("seqs:scanner", FieldCode::Seq(Subsystem::Scanner)),
    ("seqs:sensors", FieldCode::Seq(Subsystem::Sensors)),
    ("seqs:spindles", FieldCode::Seq(Subsystem::Spindles)),
    ("seqs:state", FieldCode::Seq(Subsystem::State)),
    ("seqs:tools", FieldCode::Seq(Subsystem::Tools)),
    ("seqs:volumes", FieldCode::Seq(Subsystem::Volumes)),
    ("spindles^:current", FieldCode::SpindleCurrent),
    ("state:currentTool", FieldCode::CurrentTool),
    ("state:status", FieldCode::Status),
    ("state:upTime", FieldCode::Uptime),
    ("tools^:state", FieldCode::ToolState),
    // M409 K"boards"
    ("boards^:firmwareName", FieldCode::BoardFirmwareName),
    // M409 K"heat"
    ("heat:bedHeaters^", FieldCode::BedHeaters),
    ("heat:chamberHeaters^", FieldCode::ChamberHeaters),
    // M409 K"job"
    ("job:file:fileName", FieldCode::JobFileName),
    ("job:file:size", FieldCode::JobFileSize),
    // M409 K"move"
    ("move:axes^:babystep", FieldCode::AxisBabystep),
    ("move:axes^:homed", FieldCode::AxisHomed),
    ("move:axes^:letter", FieldCode::AxisLetter),
    ("move:axes^:visible", FieldCode::AxisVisible),
    ("move:axes^:workplaceOffsets^", FieldCode::AxisWorkplaceOffset),
    ("move:extruders^:factor", FieldCode::ExtruderFactor),
    ("move:kinematics:name", FieldCode::KinematicsName),
    ("move:speedFactor", FieldCode::SpeedFactor),
    ("move:workplaceNumber", FieldCode::WorkplaceNumber),
    // M409 K"network"
    ("network:name", FieldCode::NetworkName),
    ("network:interfaces^:actualIP", FieldCode::InterfaceIp),
    // M409 K"spindles"
    ("spindles^:active", FieldCode::SpindleActive),
    ("spindles^:max", FieldCode::SpindleMax),
    ("spindles^:tool", FieldCode::SpindleTool),
    // M409 K"state"
    ("state:messageBox", FieldCode::MessageBox),
    ("state:messageBox:axisControls", FieldCode::MessageBoxField(AlertField::AxisControls)),
    ("state:messageBox:message", FieldCode::MessageBoxField(AlertField::Message)),
    ("state:messageBox:mode", FieldCode::MessageBoxField(AlertField::Mode)),
    ("state:messageBox:seq", FieldCode::MessageBoxField(AlertField::Seq)),
    ("state:messageBox:timeout", FieldCode::MessageBoxField(AlertField::Timeout)),
    ("state:messageBox:title", FieldCode::MessageBoxField(AlertField::Title)),
    // M409 K"tools"
    ("tools^:extruders^", FieldCode::ToolExtruders),
    ("tools^:heaters^", FieldCode::ToolHeaters),
    ("tools^:number", FieldCode::ToolNumber),
    ("tools^:offsets^", FieldCode::ToolOffsets),
    // M409 K"volumes"
    ("volumes^:mounted", FieldCode::VolumeMounted),
    // push messages
    ("message", FieldCode::PushMessage),
    ("resp", FieldCode::PushResponse),
    ("seq", FieldCode::PushSeq),
    ("beep_length", FieldCode::BeepDuration),
    ("beep_freq", FieldCode::BeepFrequency),
];

// Already in case-insensitive order
pub const KEY_TABLE: &[(&str, ResponseKey)] = &[
    ("", ResponseKey::NoKey),
    ("boards", ResponseKey::Boards),
    ("directories", ResponseKey::Directories),
    ("fans", ResponseKey::Fans),
    ("heat", ResponseKey::Heat),
    ("inputs", ResponseKey::Inputs),
    ("job", ResponseKey::Job),
    ("limits", ResponseKey::Limits),
    ("move", ResponseKey::Move),
    ("network", ResponseKey::Network),
    ("reply", ResponseKey::Reply),
    ("scanner", ResponseKey::Scanner),
    ("sensors", ResponseKey::Sensors),
    ("seqs", ResponseKey::Seqs),
    ("spindles", ResponseKey::Spindles),
    ("state", ResponseKey::State),
    ("tools", ResponseKey::Tools),
    ("volumes", ResponseKey::Volumes),
];

pub const ARRAY_TABLE: &[(&str, ArrayCode)] = &[
    ("move:axes^", ArrayCode::Axes),
    ("spindles^", ArrayCode::Spindles),
    ("tools^", ArrayCode::Tools),
    ("tools^:extruders^", ArrayCode::ToolExtruders),
    ("tools^:heaters^", ArrayCode::ToolHeaters),
    ("heat:bedHeaters^", ArrayCode::BedHeaters),
    ("heat:chamberHeaters^", ArrayCode::ChamberHeaters),
    ("volumes^", ArrayCode::Volumes),
];

/// Longest path the rewrite buffer is sized for up front
const SCRATCH_CAPACITY: usize = 64;

const RESULT_PREFIX: &str = "result";

/// Resolves wire paths against sorted copies of the field tables.
///
/// The dispatcher remembers which response is being parsed so that paths
/// starting with `result` can be rewritten into their absolute form.
#[derive(Debug, Clone)]
pub struct FieldDispatcher {
    fields: Vec<(&'static str, FieldCode)>,
    keys: Vec<(&'static str, ResponseKey)>,
    arrays: Vec<(&'static str, ArrayCode)>,
    context: Option<ResponseKey>,
    scratch: String,
}

impl Default for FieldDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted<T: Copy>(table: &[(&'static str, T)]) -> Vec<(&'static str, T)> {
    let mut entries = table.to_vec();
    entries.sort_by(|a, b| cmp_ignore_case(a.0, b.0));
    entries
}

impl FieldDispatcher {
    pub fn new() -> Self {
        Self::from_table(FIELD_TABLE)
    }

    /// Build a dispatcher over an arbitrary field table, in any order
    pub fn from_table(fields: &[(&'static str, FieldCode)]) -> Self {
        Self {
            fields: sorted(fields),
            keys: sorted(KEY_TABLE),
            arrays: sorted(ARRAY_TABLE),
            context: None,
            scratch: String::with_capacity(SCRATCH_CAPACITY),
        }
    }

    /// Set the response being parsed. `None` resets it between messages.
    pub fn set_context(&mut self, key: Option<ResponseKey>) {
        self.context = key;
    }

    pub fn context(&self) -> Option<ResponseKey> {
        self.context
    }

    pub fn resolve_key(&self, value: &str) -> Option<ResponseKey> {
        lookup_sorted(&self.keys, value)
    }

    pub fn resolve(&mut self, path: &str) -> FieldCode {
        let path = normalize(self.context, &mut self.scratch, path);
        lookup_sorted(&self.fields, path).unwrap_or(FieldCode::Unknown)
    }

    pub fn resolve_array(&mut self, path: &str) -> ArrayCode {
        let path = normalize(self.context, &mut self.scratch, path);
        lookup_sorted(&self.arrays, path).unwrap_or(ArrayCode::Unknown)
    }

    /// Rewrite a `result`-relative path into its absolute form
    pub fn normalize<'a>(&'a mut self, path: &'a str) -> &'a str {
        normalize(self.context, &mut self.scratch, path)
    }
}

/// The summary response nests whole subsystems under `result:`, so that
/// prefix is dropped. Detail responses put the subsystem itself at
/// `result`, so the key takes its place and any `^` marker after it is
/// kept. Paths outside a known response come back unchanged.
fn normalize<'a>(context: Option<ResponseKey>, scratch: &'a mut String, path: &'a str) -> &'a str {
    let Some(rest) = path.strip_prefix(RESULT_PREFIX) else {
        return path;
    };
    match context.and_then(ResponseKey::path_prefix) {
        Some("") => rest.strip_prefix(':').unwrap_or(rest),
        Some(key) => {
            scratch.clear();
            scratch.push_str(key);
            scratch.push_str(rest);
            scratch
        }
        None => path,
    }
}

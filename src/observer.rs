//! Collaborator boundary
//!
//! The engine pushes model changes out through [`ModelObserver`] and talks to
//! the serial link and clock through [`PollHost`]. Neither knows anything
//! about screens or transports.

use crate::fields::TimeLeftKind;
use crate::model::{Axis, Spindle, Tool};
use crate::session::{Alert, Beep};
use crate::status::{HeaterStatus, PrinterStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureKind {
    Current,
    Active,
    Standby,
}

/// One notification from the engine, in serializable form
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelEvent {
    AxisChanged(Axis),
    ToolChanged(Tool),
    SpindleChanged(Spindle),
    HeaterTemperature {
        heater: usize,
        kind: TemperatureKind,
        value: f32,
    },
    HeaterStatus {
        heater: usize,
        status: HeaterStatus,
    },
    Alert(Alert),
    AlertCleared,
    SimpleAlert {
        text: String,
    },
    StatusString {
        text: String,
    },
    PrinterStatusChanged {
        from: PrinterStatus,
        to: PrinterStatus,
    },
    RestartDetected,
    CurrentTool {
        tool: Option<usize>,
    },
    FanPercent {
        percent: i32,
    },
    PrintProgress {
        percent: u32,
    },
    TimeLeft {
        kind: TimeLeftKind,
        seconds: u32,
    },
    ProbeValue {
        text: String,
    },
    FirmwareName {
        name: String,
    },
    JobFileName {
        name: String,
    },
    ExtrusionFactor {
        extruder: usize,
        tool: usize,
        percent: i32,
    },
    SpeedFactor {
        percent: i32,
    },
    Geometry {
        axes: usize,
        delta: bool,
    },
    WorkplaceChanged {
        number: usize,
    },
    MachineName {
        name: String,
    },
    IpAddress {
        address: String,
    },
    AllToolsSeen,
    VolumesMounted {
        count: usize,
    },
    MessageLogUpdated {
        seq: u32,
    },
    Beep(Beep),
}

/// Receives model changes.
///
/// Every method has a default that forwards an owned [`ModelEvent`] to
/// [`ModelObserver::on_event`], so an implementation can either override the
/// callbacks it cares about or capture everything in one place.
pub trait ModelObserver {
    fn on_event(&mut self, event: ModelEvent) {
        let _ = event;
    }

    fn on_axis_changed(&mut self, axis: &Axis) {
        self.on_event(ModelEvent::AxisChanged(axis.clone()));
    }

    fn on_tool_changed(&mut self, tool: &Tool) {
        self.on_event(ModelEvent::ToolChanged(tool.clone()));
    }

    fn on_spindle_changed(&mut self, spindle: &Spindle) {
        self.on_event(ModelEvent::SpindleChanged(spindle.clone()));
    }

    fn on_heater_temperature(&mut self, heater: usize, kind: TemperatureKind, value: f32) {
        self.on_event(ModelEvent::HeaterTemperature { heater, kind, value });
    }

    fn on_heater_status(&mut self, heater: usize, status: HeaterStatus) {
        self.on_event(ModelEvent::HeaterStatus { heater, status });
    }

    fn on_alert(&mut self, alert: &Alert) {
        self.on_event(ModelEvent::Alert(alert.clone()));
    }

    fn on_alert_cleared(&mut self) {
        self.on_event(ModelEvent::AlertCleared);
    }

    fn on_simple_alert(&mut self, text: &str) {
        self.on_event(ModelEvent::SimpleAlert { text: text.to_string() });
    }

    /// Free text response to a command, for the message log
    fn on_status_string(&mut self, text: &str) {
        self.on_event(ModelEvent::StatusString { text: text.to_string() });
    }

    fn on_printer_status_changed(&mut self, from: PrinterStatus, to: PrinterStatus) {
        self.on_event(ModelEvent::PrinterStatusChanged { from, to });
    }

    fn on_restart_detected(&mut self) {
        self.on_event(ModelEvent::RestartDetected);
    }

    fn on_current_tool(&mut self, tool: Option<usize>) {
        self.on_event(ModelEvent::CurrentTool { tool });
    }

    fn on_fan_percent(&mut self, percent: i32) {
        self.on_event(ModelEvent::FanPercent { percent });
    }

    fn on_print_progress(&mut self, percent: u32) {
        self.on_event(ModelEvent::PrintProgress { percent });
    }

    fn on_time_left(&mut self, kind: TimeLeftKind, seconds: u32) {
        self.on_event(ModelEvent::TimeLeft { kind, seconds });
    }

    fn on_probe_value(&mut self, text: &str) {
        self.on_event(ModelEvent::ProbeValue { text: text.to_string() });
    }

    fn on_firmware_name(&mut self, name: &str) {
        self.on_event(ModelEvent::FirmwareName { name: name.to_string() });
    }

    fn on_job_file_name(&mut self, name: &str) {
        self.on_event(ModelEvent::JobFileName { name: name.to_string() });
    }

    fn on_extrusion_factor(&mut self, extruder: usize, tool: usize, percent: i32) {
        self.on_event(ModelEvent::ExtrusionFactor { extruder, tool, percent });
    }

    fn on_speed_factor(&mut self, percent: i32) {
        self.on_event(ModelEvent::SpeedFactor { percent });
    }

    fn on_geometry(&mut self, axes: usize, delta: bool) {
        self.on_event(ModelEvent::Geometry { axes, delta });
    }

    fn on_workplace_changed(&mut self, number: usize) {
        self.on_event(ModelEvent::WorkplaceChanged { number });
    }

    fn on_machine_name(&mut self, name: &str) {
        self.on_event(ModelEvent::MachineName { name: name.to_string() });
    }

    fn on_ip_address(&mut self, address: &str) {
        self.on_event(ModelEvent::IpAddress { address: address.to_string() });
    }

    /// A tools or spindles array finished and stale entries were trimmed
    fn on_all_tools_seen(&mut self) {
        self.on_event(ModelEvent::AllToolsSeen);
    }

    fn on_volumes_mounted(&mut self, count: usize) {
        self.on_event(ModelEvent::VolumesMounted { count });
    }

    fn on_message_log_updated(&mut self, seq: u32) {
        self.on_event(ModelEvent::MessageLogUpdated { seq });
    }

    fn on_beep(&mut self, beep: Beep) {
        self.on_event(ModelEvent::Beep(beep));
    }
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl ModelObserver for NoOpObserver {}

/// Records every notification in arrival order
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<ModelEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ModelEvent] {
        &self.events
    }

    /// Hand back everything recorded so far and start over
    pub fn take(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl ModelObserver for EventLog {
    fn on_event(&mut self, event: ModelEvent) {
        self.events.push(event);
    }
}

/// What the engine needs from its surroundings to drive polling
pub trait PollHost {
    /// Queue one request line for the controller
    fn send_request(&mut self, request: &str);

    /// Monotonic milliseconds
    fn now_millis(&self) -> u64;

    /// Lets another component (a file list fetch, say) take the turn that
    /// would otherwise go to a summary request. Returning true means it sent
    /// something of its own.
    fn has_pending_work(&mut self) -> bool {
        false
    }
}

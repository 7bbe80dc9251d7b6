//! Object model sync engine
//!
//! Ties the dispatcher, session, scheduler and store together. The serial
//! side feeds tokenized tuples in; the host side ticks [`SyncEngine::poll`]
//! and receives at most one request per tick.

use crate::coerce::{fraction_to_percent, parse_bool, parse_float, parse_int, parse_uint};
use crate::config::SyncConfig;
use crate::fields::{ArrayCode, FieldCode, FieldDispatcher, ResponseKey, TimeLeftKind};
use crate::model::{Axis, ObjectModelStore, MAX_TOTAL_AXES, MAX_WORKPLACES};
use crate::observer::{ModelObserver, PollHost, TemperatureKind};
use crate::scheduler::{next_action, PollAction, PollScheduler, PollTiming, Request, Subsystem};
use crate::session::{AlertOutcome, MessageSession};
use crate::status::{HeaterStatus, PrinterStatus, ToolStatus};
use tracing::{debug, info, trace};

/// Times left above this are treated as bogus
const MAX_TIME_LEFT_SECS: i32 = 10 * 24 * 60 * 60;

pub struct SyncEngine<O: ModelObserver> {
    dispatcher: FieldDispatcher,
    session: MessageSession,
    scheduler: PollScheduler,
    store: ObjectModelStore,
    observer: O,
    timing: PollTiming,
    slow_timing: PollTiming,
    min_axes: usize,
    response_key: Option<ResponseKey>,
    status: PrinterStatus,
    /// Set once the first detail request goes out
    initialized: bool,
    first_poll_pending: bool,
    polling_enabled: bool,
    slow_polling: bool,
    file_size: u32,
    is_delta: bool,
    num_axes: usize,
    current_tool: Option<usize>,
    current_workplace: Option<usize>,
}

impl<O: ModelObserver> SyncEngine<O> {
    pub fn new(config: &SyncConfig, observer: O) -> Self {
        let min_axes = config.model.min_axes().min(MAX_TOTAL_AXES);
        Self {
            dispatcher: FieldDispatcher::new(),
            session: MessageSession::new(),
            scheduler: PollScheduler::new(&config.fetch()),
            store: ObjectModelStore::new(),
            observer,
            timing: config.polling.timing(),
            slow_timing: config.polling.slow_timing(),
            min_axes,
            response_key: None,
            status: PrinterStatus::Connecting,
            initialized: false,
            first_poll_pending: true,
            polling_enabled: true,
            slow_polling: false,
            file_size: 0,
            is_delta: false,
            num_axes: min_axes,
            current_tool: None,
            current_workplace: None,
        }
    }

    pub fn with_defaults(observer: O) -> Self {
        Self::new(&SyncConfig::default(), observer)
    }

    pub fn store(&self) -> &ObjectModelStore {
        &self.store
    }

    /// Lets the UI write display slots onto entities
    pub fn store_mut(&mut self) -> &mut ObjectModelStore {
        &mut self.store
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn session(&self) -> &MessageSession {
        &self.session
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    pub fn status(&self) -> PrinterStatus {
        self.status
    }

    pub fn current_tool(&self) -> Option<usize> {
        self.current_tool
    }

    pub fn num_axes(&self) -> usize {
        self.num_axes
    }

    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    /// Fetched subsystems still waiting for a detail reply
    pub fn dirty_subsystems(&self) -> Vec<Subsystem> {
        Subsystem::ALL
            .into_iter()
            .filter(|s| self.scheduler.is_dirty(*s))
            .collect()
    }

    /// Stop or resume polling, e.g. while a setup page is open
    pub fn set_polling_enabled(&mut self, enabled: bool) {
        self.polling_enabled = enabled;
    }

    /// Poll less often while the display is dimmed
    pub fn set_slow_polling(&mut self, slow: bool) {
        self.slow_polling = slow;
    }

    /// Forget everything and reconnect from scratch
    pub fn reset(&mut self) {
        info!("Resetting object model sync");
        self.session.discard();
        self.dispatcher.set_context(None);
        self.response_key = None;
        self.scheduler.reset();
        self.store.clear();
        self.initialized = false;
        self.first_poll_pending = true;
        self.file_size = 0;
        self.current_tool = None;
        self.current_workplace = None;
        self.set_status(PrinterStatus::Connecting);
    }

    /// Decide whether to send a request now, and send it through `host`
    pub fn poll<H: PollHost>(&mut self, host: &mut H) -> Option<Request> {
        if !self.polling_enabled {
            return None;
        }
        let now = host.now_millis();
        let timing = if self.slow_polling {
            self.slow_timing
        } else {
            self.timing
        };

        let action = if self.first_poll_pending {
            PollAction::Resend
        } else {
            next_action(&self.scheduler, &timing, now)
        };

        let request = match action {
            PollAction::Wait => return None,
            PollAction::Detail(subsystem) => {
                self.initialized = true;
                Request::Detail(subsystem)
            }
            PollAction::Summary => {
                if host.has_pending_work() {
                    debug!("Poll turn taken by pending host work");
                    self.scheduler.record_request(now);
                    return None;
                }
                Request::Summary
            }
            PollAction::Resend => {
                if !self.first_poll_pending {
                    debug!("No response within {} ms, resending summary", timing.poll_timeout);
                }
                Request::Summary
            }
        };

        self.first_poll_pending = false;
        let line = request.to_string();
        debug!(request = %line, "Sending request");
        host.send_request(&line);
        self.scheduler.record_request(now);
        Some(request)
    }

    pub fn begin_message(&mut self) {
        self.session.begin();
        self.response_key = None;
        self.dispatcher.set_context(None);
    }

    /// Handle one `(path, indices, value)` tuple.
    ///
    /// `indices` holds one entry per `^` in the path. Missing entries read
    /// as zero. A value that fails to parse leaves the model untouched.
    pub fn process_value(&mut self, path: &str, indices: &[usize], value: &str) {
        if !self.session.is_accumulating() {
            self.begin_message();
        }
        let code = self.dispatcher.resolve(path);
        let i0 = indices.first().copied().unwrap_or(0);
        let i1 = indices.get(1).copied().unwrap_or(0);

        match code {
            FieldCode::Key => {
                self.response_key = self.dispatcher.resolve_key(value);
                self.dispatcher.set_context(self.response_key);
                if self.response_key.is_none() {
                    debug!(key = value, "Response for unknown key");
                }
            }

            FieldCode::FanActualValue => {
                if i0 == 0 {
                    if let Some(f) = parse_float(value).filter(|f| (0.0..=1.0).contains(f)) {
                        self.observer.on_fan_percent(fraction_to_percent(f));
                    }
                }
            }
            FieldCode::HeaterActive => {
                if let Some(t) = parse_int(value) {
                    self.heater_temperature(i0, TemperatureKind::Active, t as f32);
                }
            }
            FieldCode::HeaterStandby => {
                if let Some(t) = parse_int(value) {
                    self.heater_temperature(i0, TemperatureKind::Standby, t as f32);
                }
            }
            FieldCode::HeaterCurrent => {
                if let Some(t) = parse_float(value) {
                    self.heater_temperature(i0, TemperatureKind::Current, t);
                }
            }
            FieldCode::HeaterState => {
                if self.store.heater_is_referenced(i0) {
                    self.observer.on_heater_status(i0, HeaterStatus::from_wire(value));
                }
            }
            FieldCode::JobFilePosition => {
                if self.status.job_in_progress() && self.file_size > 0 {
                    if let Some(position) = parse_uint(value) {
                        let percent = (position as f32 * 100.0) / self.file_size as f32 + 0.5;
                        self.observer.on_print_progress(percent as u32);
                    }
                }
            }
            FieldCode::TimesLeft(kind) => self.time_left(kind, value),
            FieldCode::AxisUserPosition => {
                if let Some(position) = parse_float(value) {
                    if let Some(axis) = self.store.axis_mut(i0) {
                        axis.user_position = position;
                        self.observer.on_axis_changed(axis);
                    }
                }
            }
            FieldCode::ProbeValue => {
                if i0 == 0 && i1 == 0 {
                    self.observer.on_probe_value(value);
                }
            }
            FieldCode::Seq(subsystem) => {
                if let Some(seq) = parse_uint(value).and_then(|s| u16::try_from(s).ok()) {
                    if self.scheduler.update_seq(subsystem, seq) {
                        trace!(%subsystem, seq, "Subsystem changed");
                    }
                }
            }
            FieldCode::SpindleCurrent => {
                if let Some(current) = parse_uint(value) {
                    let spindle = self.store.spindles.get_or_create(i0);
                    spindle.current = current;
                    self.observer.on_spindle_changed(spindle);
                }
            }
            FieldCode::CurrentTool => {
                if !self.status.is_connecting() {
                    if let Some(tool) = parse_int(value) {
                        let tool = usize::try_from(tool).ok();
                        if tool != self.current_tool {
                            self.current_tool = tool;
                            self.observer.on_current_tool(tool);
                        }
                    }
                }
            }
            FieldCode::Status => self.status_from_wire(value),
            FieldCode::Uptime => {
                if let Some(uptime) = parse_uint(value) {
                    if self.scheduler.observe_uptime(uptime) {
                        self.restart_detected();
                    }
                }
            }
            FieldCode::ToolState => {
                if let Some(tool) = self.store.tools.get_mut(i0) {
                    tool.status = ToolStatus::from_wire(value);
                    self.observer.on_tool_changed(tool);
                }
            }

            FieldCode::BoardFirmwareName => {
                if i0 == 0 {
                    self.observer.on_firmware_name(value);
                }
            }
            // a negative heater means no bed or chamber at this position
            FieldCode::BedHeaters => match parse_int(value).and_then(|h| usize::try_from(h).ok()) {
                Some(heater) => self.store.beds.get_or_create(i0).heater = Some(heater),
                None => {
                    self.store.beds.remove(i0, false);
                }
            },
            FieldCode::ChamberHeaters => match parse_int(value).and_then(|h| usize::try_from(h).ok()) {
                Some(heater) => self.store.chambers.get_or_create(i0).heater = Some(heater),
                None => {
                    self.store.chambers.remove(i0, false);
                }
            },
            FieldCode::JobFileName => self.observer.on_job_file_name(value),
            FieldCode::JobFileSize => {
                self.file_size = parse_uint(value).unwrap_or(0);
            }
            FieldCode::AxisBabystep => {
                if let Some(babystep) = parse_float(value) {
                    self.update_axis(i0, |axis| axis.babystep = babystep);
                }
            }
            FieldCode::AxisHomed => {
                if let Some(homed) = parse_bool(value) {
                    self.update_axis(i0, |axis| axis.homed = homed);
                }
            }
            FieldCode::AxisLetter => {
                let letter = value.chars().next();
                self.update_axis(i0, |axis| axis.letter = letter);
            }
            FieldCode::AxisVisible => {
                if let Some(visible) = parse_bool(value) {
                    self.update_axis(i0, |axis| axis.visible = visible);
                    if visible {
                        self.session.counters.visible_axes += 1;
                    }
                }
            }
            FieldCode::AxisWorkplaceOffset => {
                if i1 < MAX_WORKPLACES {
                    if let Some(offset) = parse_float(value) {
                        self.update_axis(i0, |axis| axis.workplace_offsets[i1] = offset);
                    }
                }
            }
            FieldCode::ExtruderFactor => {
                if let Some(factor) = parse_float(value) {
                    if let Some(tool) = self.store.tool_for_extruder(i0) {
                        self.observer
                            .on_extrusion_factor(i0, tool.index, fraction_to_percent(factor));
                    }
                }
            }
            FieldCode::KinematicsName => {
                if !matches!(self.status, PrinterStatus::Connecting | PrinterStatus::Configuring) {
                    self.is_delta = value.eq_ignore_ascii_case("delta");
                    self.observer.on_geometry(self.num_axes, self.is_delta);
                }
            }
            FieldCode::SpeedFactor => {
                if let Some(factor) = parse_float(value) {
                    self.observer.on_speed_factor(fraction_to_percent(factor));
                }
            }
            FieldCode::WorkplaceNumber => {
                if let Some(number) = parse_uint(value).map(|n| n as usize) {
                    if number < MAX_WORKPLACES && Some(number) != self.current_workplace {
                        self.current_workplace = Some(number);
                        self.observer.on_workplace_changed(number);
                    }
                }
            }
            FieldCode::NetworkName => {
                if !matches!(self.status, PrinterStatus::Connecting | PrinterStatus::Configuring) {
                    self.observer.on_machine_name(value);
                }
            }
            FieldCode::InterfaceIp => {
                if i0 == 0 {
                    self.observer.on_ip_address(value);
                }
            }
            FieldCode::SpindleActive => {
                if let Some(active) = parse_uint(value) {
                    let spindle = self.store.spindles.get_or_create(i0);
                    spindle.active = active;
                    self.observer.on_spindle_changed(spindle);
                }
                let first_gap = self.session.counters.last_spindle.map_or(0, |last| last + 1);
                for gap in first_gap..i0 {
                    self.store.remove_spindles(gap, false);
                }
                self.session.counters.last_spindle = Some(i0);
            }
            FieldCode::SpindleMax => {
                // only meaningful inside a spindles response
                if self.response_key == Some(ResponseKey::Spindles) {
                    if let Some(max) = parse_uint(value) {
                        let spindle = self.store.spindles.get_or_create(i0);
                        spindle.max = max;
                        self.observer.on_spindle_changed(spindle);
                    }
                }
            }
            FieldCode::SpindleTool => {
                if let Some(tool) = parse_int(value) {
                    let tool = usize::try_from(tool).ok();
                    let previous = self
                        .store
                        .spindles
                        .get(i0)
                        .and_then(|s| s.tool)
                        .filter(|p| Some(*p) != tool);
                    self.store.set_spindle_tool(i0, tool);
                    for index in [previous, tool].into_iter().flatten() {
                        if let Some(tool) = self.store.tools.get(index) {
                            self.observer.on_tool_changed(tool);
                        }
                    }
                    if let Some(spindle) = self.store.spindles.get(i0) {
                        self.observer.on_spindle_changed(spindle);
                    }
                }
            }
            FieldCode::MessageBox => {
                if value.is_empty() {
                    self.session.stage_clear();
                }
            }
            FieldCode::MessageBoxField(field) => {
                if !self.session.stage_alert_field(field, value) {
                    trace!(?field, value, "Unparsable message box field");
                }
            }
            FieldCode::ToolExtruders => {
                if i1 == 0 {
                    if let Some(extruder) = parse_int(value) {
                        let tool = self.store.tools.get_or_create(i0);
                        tool.extruder = usize::try_from(extruder).ok();
                        self.observer.on_tool_changed(tool);
                    }
                }
            }
            FieldCode::ToolHeaters => {
                if i1 == 0 {
                    if let Some(heater) = parse_int(value) {
                        let tool = self.store.tools.get_or_create(i0);
                        tool.heater = usize::try_from(heater).ok();
                        self.observer.on_tool_changed(tool);
                    }
                }
            }
            FieldCode::ToolNumber => {
                let first_gap = self.session.counters.last_tool.map_or(0, |last| last + 1);
                for gap in first_gap..i0 {
                    self.store.remove_tools(gap, false);
                }
                self.session.counters.last_tool = Some(i0);
                self.store.tools.get_or_create(i0);
            }
            FieldCode::ToolOffsets => {
                if i1 < MAX_TOTAL_AXES {
                    if let Some(offset) = parse_float(value) {
                        let tool = self.store.tools.get_or_create(i0);
                        tool.offsets[i1] = offset;
                        self.observer.on_tool_changed(tool);
                    }
                }
            }
            FieldCode::VolumeMounted => {
                if parse_bool(value) == Some(true) {
                    self.session.counters.mounted_volumes += 1;
                }
            }

            FieldCode::PushMessage => {
                if value.is_empty() {
                    self.observer.on_alert_cleared();
                } else {
                    self.observer.on_simple_alert(value);
                }
            }
            FieldCode::PushResponse => self.observer.on_status_string(value),
            FieldCode::PushSeq => {
                if let Some(seq) = parse_uint(value) {
                    self.session.stage_message_seq(seq);
                }
            }
            FieldCode::BeepDuration => {
                if let Some(duration) = parse_int(value) {
                    self.session.stage_beep_duration(duration);
                }
            }
            FieldCode::BeepFrequency => {
                if let Some(frequency) = parse_int(value) {
                    self.session.stage_beep_frequency(frequency);
                }
            }

            FieldCode::Unknown => {}
        }
    }

    /// Handle the end of an array. The index at the array's own depth is
    /// its element count.
    pub fn process_array_end(&mut self, path: &str, indices: &[usize]) {
        if !self.session.is_accumulating() {
            return;
        }
        let code = self.dispatcher.resolve_array(path);
        let i0 = indices.first().copied().unwrap_or(0);
        let i1 = indices.get(1).copied().unwrap_or(0);
        let key = self.response_key;

        match code {
            ArrayCode::Axes if key == Some(ResponseKey::Move) => {
                self.store.trim_axes(i0);
                self.num_axes = self
                    .session
                    .counters
                    .visible_axes
                    .clamp(self.min_axes, MAX_TOTAL_AXES);
                self.observer.on_geometry(self.num_axes, self.is_delta);
            }
            ArrayCode::Spindles if key == Some(ResponseKey::Spindles) => {
                let keep = self.session.counters.last_spindle.map_or(0, |last| last + 1);
                self.store.remove_spindles(keep, true);
                self.observer.on_all_tools_seen();
            }
            ArrayCode::Tools if key == Some(ResponseKey::Tools) => {
                let keep = self.session.counters.last_tool.map_or(0, |last| last + 1);
                self.store.remove_tools(keep, true);
                self.observer.on_all_tools_seen();
            }
            ArrayCode::ToolExtruders if key == Some(ResponseKey::Tools) && i1 == 0 => {
                let tool = self.store.tools.get_or_create(i0);
                tool.extruder = None;
                self.observer.on_tool_changed(tool);
            }
            ArrayCode::ToolHeaters if key == Some(ResponseKey::Tools) && i1 == 0 => {
                let tool = self.store.tools.get_or_create(i0);
                tool.heater = None;
                self.observer.on_tool_changed(tool);
            }
            ArrayCode::BedHeaters if key == Some(ResponseKey::Heat) => {
                self.store.beds.remove(i0, true);
            }
            ArrayCode::ChamberHeaters if key == Some(ResponseKey::Heat) => {
                self.store.chambers.remove(i0, true);
            }
            ArrayCode::Volumes if key == Some(ResponseKey::Volumes) => {
                self.observer
                    .on_volumes_mounted(self.session.counters.mounted_volumes);
            }
            _ => {}
        }
    }

    /// Commit the response that just finished
    pub fn end_message(&mut self, now: u64) {
        if !self.session.is_accumulating() {
            return;
        }
        let outcome = self.session.commit();

        if let Some(subsystem) = self.response_key.and_then(ResponseKey::subsystem) {
            self.scheduler.clear_dirty(subsystem);
        }
        self.scheduler.record_response(now);
        self.response_key = None;
        self.dispatcher.set_context(None);

        if let Some(seq) = outcome.message_seq {
            self.observer.on_message_log_updated(seq);
        }
        match outcome.alert {
            Some(AlertOutcome::Clear) => self.observer.on_alert_cleared(),
            Some(AlertOutcome::Show(alert)) => self.observer.on_alert(&alert),
            None => {}
        }
        if let Some(beep) = outcome.beep {
            self.observer.on_beep(beep);
        }
    }

    /// The transport could not parse the current response
    pub fn parser_error(&mut self) {
        debug!("Parser error, dropping response");
        self.session.discard();
        self.response_key = None;
        self.dispatcher.set_context(None);
    }

    fn heater_temperature(&mut self, heater: usize, kind: TemperatureKind, value: f32) {
        if self.store.heater_is_referenced(heater) {
            self.observer.on_heater_temperature(heater, kind, value);
        }
    }

    fn time_left(&mut self, kind: TimeLeftKind, value: &str) {
        if !self.status.job_in_progress() {
            return;
        }
        if let Some(seconds) = parse_int(value).filter(|s| (0..MAX_TIME_LEFT_SECS).contains(s)) {
            self.observer.on_time_left(kind, seconds.unsigned_abs());
        }
    }

    fn update_axis(&mut self, index: usize, update: impl FnOnce(&mut Axis)) {
        if let Some(axis) = self.store.axis_mut(index) {
            update(axis);
            self.observer.on_axis_changed(axis);
        }
    }

    fn status_from_wire(&mut self, text: &str) {
        let status = if self.initialized {
            PrinterStatus::from_wire(text).unwrap_or(PrinterStatus::Connecting)
        } else {
            PrinterStatus::PanelInitializing
        };
        self.set_status(status);
    }

    fn set_status(&mut self, status: PrinterStatus) {
        if status == self.status {
            return;
        }
        info!(from = ?self.status, to = ?status, "Printer status changed");
        let from = std::mem::replace(&mut self.status, status);
        self.observer.on_printer_status_changed(from, status);
    }

    fn restart_detected(&mut self) {
        info!("Controller uptime went backwards, resyncing");
        self.scheduler.reset();
        self.store.clear();
        self.initialized = false;
        self.current_tool = None;
        self.current_workplace = None;
        self.set_status(PrinterStatus::Connecting);
        self.observer.on_restart_detected();
    }
}

impl<O: ModelObserver + Default> Default for SyncEngine<O> {
    fn default() -> Self {
        Self::with_defaults(O::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventLog, ModelEvent};

    struct TestHost {
        now: u64,
        sent: Vec<String>,
        pending_work: bool,
    }

    impl TestHost {
        fn at(now: u64) -> Self {
            Self {
                now,
                sent: Vec::new(),
                pending_work: false,
            }
        }
    }

    impl PollHost for TestHost {
        fn send_request(&mut self, request: &str) {
            self.sent.push(request.to_string());
        }

        fn now_millis(&self) -> u64 {
            self.now
        }

        fn has_pending_work(&mut self) -> bool {
            self.pending_work
        }
    }

    fn engine() -> SyncEngine<EventLog> {
        SyncEngine::with_defaults(EventLog::new())
    }

    /// Feed one complete response made of value tuples
    fn respond(engine: &mut SyncEngine<EventLog>, now: u64, tuples: &[(&str, &[usize], &str)]) {
        engine.begin_message();
        for (path, indices, value) in tuples {
            engine.process_value(path, indices, value);
        }
        engine.end_message(now);
    }

    fn heater_events(log: &EventLog) -> Vec<&ModelEvent> {
        log.events()
            .iter()
            .filter(|e| matches!(e, ModelEvent::HeaterTemperature { .. }))
            .collect()
    }

    #[test]
    fn test_unreferenced_heater_is_silent() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], ""),
            ("result:heat:heaters^:current", &[1], "205.3"),
        ]);
        assert!(heater_events(engine.observer()).is_empty());
    }

    #[test]
    fn test_heater_of_tool_reports_temperature() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "tools"),
            ("result^:number", &[0], "0"),
            ("result^:heaters^", &[0, 0], "1"),
        ]);
        engine.observer_mut().clear();

        respond(&mut engine, 200, &[
            ("key", &[], ""),
            ("result:heat:heaters^:current", &[1], "205.3"),
        ]);
        assert_eq!(
            heater_events(engine.observer()),
            vec![&ModelEvent::HeaterTemperature {
                heater: 1,
                kind: TemperatureKind::Current,
                value: 205.3
            }]
        );
    }

    #[test]
    fn test_bed_heater_registers_bed() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "heat"),
            ("result:bedHeaters^", &[0], "0"),
            ("result:bedHeaters^", &[1], "-1"),
            ("result:chamberHeaters^", &[0], "3"),
        ]);
        assert_eq!(engine.store().bed_for_heater(0).map(|b| b.index), Some(0));
        assert_eq!(engine.store().beds.len(), 1);
        assert_eq!(engine.store().chamber_for_heater(3).map(|c| c.index), Some(0));

        respond(&mut engine, 200, &[("key", &[], ""), ("heat:heaters^:active", &[3], "45")]);
        assert_eq!(heater_events(engine.observer()).len(), 1);
    }

    #[test]
    fn test_first_poll_is_immediate_summary() {
        let mut engine = engine();
        let mut host = TestHost::at(10);
        assert_eq!(engine.poll(&mut host), Some(Request::Summary));
        assert_eq!(host.sent, vec!["M409 F\"d99f\""]);
        // nothing answered yet
        host.now = 500;
        assert_eq!(engine.poll(&mut host), None);
    }

    #[test]
    fn test_seq_change_drives_detail_requests() {
        let mut engine = engine();
        let mut host = TestHost::at(0);
        engine.poll(&mut host);

        respond(&mut engine, 300, &[
            ("key", &[], ""),
            ("result:seqs:heat", &[], "4"),
            ("result:seqs:move", &[], "2"),
        ]);
        host.now = 1000;
        assert_eq!(engine.poll(&mut host), Some(Request::Detail(Subsystem::Move)));
        assert_eq!(host.sent.last().map(String::as_str), Some("M409 K\"move\" F\"v\""));

        // a short reply still settles the subsystem
        respond(&mut engine, 1100, &[("key", &[], "move")]);
        host.now = 2000;
        assert_eq!(engine.poll(&mut host), Some(Request::Detail(Subsystem::Heat)));
        respond(&mut engine, 2100, &[("key", &[], "heat")]);
        host.now = 3000;
        assert_eq!(engine.poll(&mut host), Some(Request::Summary));
    }

    #[test]
    fn test_pending_work_takes_summary_turn() {
        let mut engine = engine();
        let mut host = TestHost::at(0);
        engine.poll(&mut host);
        respond(&mut engine, 100, &[("key", &[], "")]);

        host.now = 1000;
        host.pending_work = true;
        assert_eq!(engine.poll(&mut host), None);
        assert_eq!(host.sent.len(), 1);
        assert_eq!(engine.scheduler().last_poll(), 1000);
    }

    #[test]
    fn test_polling_disabled_and_slow() {
        let mut engine = engine();
        let mut host = TestHost::at(0);
        engine.set_polling_enabled(false);
        assert_eq!(engine.poll(&mut host), None);
        engine.set_polling_enabled(true);
        engine.poll(&mut host);
        respond(&mut engine, 100, &[("key", &[], "")]);

        engine.set_slow_polling(true);
        host.now = 2000;
        assert_eq!(engine.poll(&mut host), None);
        host.now = 4000;
        assert_eq!(engine.poll(&mut host), Some(Request::Summary));
    }

    #[test]
    fn test_status_initializing_until_first_detail() {
        let mut engine = engine();
        let mut host = TestHost::at(0);
        engine.poll(&mut host);
        respond(&mut engine, 100, &[
            ("key", &[], ""),
            ("result:state:status", &[], "idle"),
            ("result:seqs:tools", &[], "1"),
        ]);
        assert_eq!(engine.status(), PrinterStatus::PanelInitializing);

        host.now = 1000;
        engine.poll(&mut host);
        respond(&mut engine, 1100, &[("key", &[], ""), ("result:state:status", &[], "processing")]);
        assert_eq!(engine.status(), PrinterStatus::Printing);

        respond(&mut engine, 1200, &[("key", &[], ""), ("result:state:status", &[], "dancing")]);
        assert_eq!(engine.status(), PrinterStatus::Connecting);
    }

    #[test]
    fn test_restart_resyncs_everything() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "tools"),
            ("result^:number", &[0], "0"),
            ("result^:heaters^", &[0, 0], "1"),
        ]);
        respond(&mut engine, 200, &[("key", &[], ""), ("result:seqs:heat", &[], "3")]);
        respond(&mut engine, 300, &[("key", &[], "heat")]);
        assert!(!engine.scheduler().is_dirty(Subsystem::Heat));

        for (now, uptime) in [(400, "10"), (500, "20"), (600, "5")] {
            respond(&mut engine, now, &[("key", &[], ""), ("result:state:upTime", &[], uptime)]);
        }
        let restarts = engine
            .observer()
            .events()
            .iter()
            .filter(|e| **e == ModelEvent::RestartDetected)
            .count();
        assert_eq!(restarts, 1);
        assert!(engine.store().tools.is_empty());
        assert_eq!(engine.dirty_subsystems().len(), Subsystem::ALL.len());
        assert_eq!(engine.status(), PrinterStatus::Connecting);

        // the next summary counter mismatches even if unchanged
        assert!(engine.scheduler().seq(Subsystem::Heat) != 3);
    }

    #[test]
    fn test_tools_array_trims_missing_entries() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "tools"),
            ("result^:number", &[0], "0"),
            ("result^:number", &[1], "1"),
            ("result^:number", &[2], "2"),
            ("result^:number", &[3], "3"),
        ]);
        assert_eq!(engine.store().tools.indices(), vec![0, 1, 2, 3]);

        engine.begin_message();
        engine.process_value("key", &[], "tools");
        engine.process_value("result^:number", &[0], "0");
        engine.process_value("result^:number", &[2], "2");
        engine.process_array_end("result^", &[3]);
        engine.end_message(200);
        assert_eq!(engine.store().tools.indices(), vec![0, 2]);
        assert!(engine
            .observer()
            .events()
            .contains(&ModelEvent::AllToolsSeen));
    }

    #[test]
    fn test_empty_heater_array_clears_tool_heater() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "tools"),
            ("result^:number", &[0], "0"),
            ("result^:heaters^", &[0, 0], "1"),
        ]);
        engine.begin_message();
        engine.process_value("key", &[], "tools");
        engine.process_value("result^:number", &[0], "0");
        engine.process_array_end("result^:heaters^", &[0, 0]);
        engine.end_message(200);
        assert_eq!(engine.store().tools.get(0).and_then(|t| t.heater), None);
    }

    #[test]
    fn test_axes_array_sets_geometry() {
        let mut engine = engine();
        engine.begin_message();
        engine.process_value("key", &[], "move");
        for (i, letter) in ["X", "Y", "Z", "U"].iter().enumerate() {
            engine.process_value("result:axes^:letter", &[i], letter);
            engine.process_value("result:axes^:visible", &[i], "true");
        }
        engine.process_value("result:axes^:visible", &[4], "false");
        engine.process_array_end("result:axes^", &[4]);
        engine.end_message(100);

        assert_eq!(engine.num_axes(), 4);
        assert_eq!(engine.store().axis(3).and_then(|a| a.letter), Some('U'));
        assert!(!engine.store().axis(4).map_or(true, |a| a.visible));
        assert!(engine
            .observer()
            .events()
            .contains(&ModelEvent::Geometry { axes: 4, delta: false }));
    }

    #[test]
    fn test_axes_geometry_clamped_to_min_axes() {
        let mut engine = engine();
        engine.begin_message();
        engine.process_value("key", &[], "move");
        engine.process_value("result:axes^:visible", &[0], "true");
        engine.process_array_end("result:axes^", &[1]);
        engine.end_message(100);
        assert_eq!(engine.num_axes(), 3);
    }

    #[test]
    fn test_spindle_tool_and_max() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "spindles"),
            ("result^:active", &[0], "1000"),
            ("result^:max", &[0], "24000"),
            ("result^:tool", &[0], "2"),
        ]);
        let spindle = engine.store().spindles.get(0).cloned().unwrap();
        assert_eq!(spindle.max, 24000);
        assert_eq!(spindle.tool, Some(2));
        assert_eq!(engine.store().tools.get(2).and_then(|t| t.spindle), Some(0));

        // fans share the relative path but must not touch spindles
        respond(&mut engine, 200, &[("key", &[], "fans"), ("result^:max", &[0], "1.0")]);
        assert_eq!(engine.store().spindles.get(0).map(|s| s.max), Some(24000));
    }

    #[test]
    fn test_alert_committed_at_end_only() {
        let mut engine = engine();
        engine.begin_message();
        engine.process_value("key", &[], "state");
        for (field, value) in [
            ("title", "Pause"),
            ("message", "Change filament"),
            ("mode", "1"),
            ("seq", "12"),
            ("timeout", "0"),
            ("axisControls", "0"),
        ] {
            engine.process_value(&format!("result:messageBox:{}", field), &[], value);
        }
        assert!(engine.observer().events().is_empty());
        engine.end_message(100);
        assert!(matches!(
            engine.observer().events(),
            [ModelEvent::Alert(alert)] if alert.seq == 12 && alert.title == "Pause"
        ));
    }

    #[test]
    fn test_parser_error_discards_without_settling() {
        let mut engine = engine();
        respond(&mut engine, 100, &[("key", &[], ""), ("result:seqs:job", &[], "1")]);
        engine.begin_message();
        engine.process_value("key", &[], "job");
        engine.process_value("seq", &[], "8");
        engine.parser_error();
        engine.end_message(500);

        assert!(engine.scheduler().is_dirty(Subsystem::Job));
        assert_eq!(engine.scheduler().last_response(), 100);
        assert!(!engine
            .observer()
            .events()
            .iter()
            .any(|e| matches!(e, ModelEvent::MessageLogUpdated { .. })));
    }

    #[test]
    fn test_push_messages() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("resp", &[], "ok"),
            ("message", &[], "Homing failed"),
            ("seq", &[], "3"),
            ("beep_freq", &[], "1000"),
            ("beep_length", &[], "250"),
        ]);
        let events = engine.observer().events();
        assert_eq!(events[0], ModelEvent::StatusString { text: "ok".into() });
        assert_eq!(events[1], ModelEvent::SimpleAlert { text: "Homing failed".into() });
        assert!(events.contains(&ModelEvent::MessageLogUpdated { seq: 3 }));
        assert!(matches!(events.last(), Some(ModelEvent::Beep(b)) if b.frequency == 1000));
    }

    #[test]
    fn test_job_progress_only_while_printing() {
        let mut engine = engine();
        let mut host = TestHost::at(0);
        engine.poll(&mut host);
        respond(&mut engine, 100, &[("key", &[], ""), ("result:seqs:job", &[], "1")]);
        host.now = 1000;
        engine.poll(&mut host);
        respond(&mut engine, 1100, &[("key", &[], "job"), ("result:file:size", &[], "1000")]);

        respond(&mut engine, 1200, &[("key", &[], ""), ("result:job:filePosition", &[], "500")]);
        assert!(!engine
            .observer()
            .events()
            .iter()
            .any(|e| matches!(e, ModelEvent::PrintProgress { .. })));

        respond(&mut engine, 1300, &[
            ("key", &[], ""),
            ("result:state:status", &[], "processing"),
            ("result:job:filePosition", &[], "500"),
            ("result:job:timesLeft:file", &[], "120"),
        ]);
        let events = engine.observer().events();
        assert!(events.contains(&ModelEvent::PrintProgress { percent: 50 }));
        assert!(events.contains(&ModelEvent::TimeLeft {
            kind: TimeLeftKind::File,
            seconds: 120
        }));
    }

    #[test]
    fn test_malformed_values_leave_model_alone() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "tools"),
            ("result^:offsets^", &[0, 1], "1.5"),
            ("result^:offsets^", &[0, 1], "garbage"),
            ("result^:offsets^", &[0, 1], ""),
        ]);
        assert_eq!(engine.store().tools.get(0).map(|t| t.offsets[1]), Some(1.5));
    }

    #[test]
    fn test_heat_detail_reply_reports_only_tool_heaters() {
        let mut engine = engine();
        let mut host = TestHost::at(0);
        engine.poll(&mut host);
        respond(&mut engine, 300, &[("key", &[], ""), ("result:seqs:heat", &[], "1")]);

        host.now = 1000;
        assert_eq!(engine.poll(&mut host), Some(Request::Detail(Subsystem::Heat)));
        assert_eq!(host.sent.last().map(String::as_str), Some("M409 K\"heat\" F\"v\""));
        respond(&mut engine, 1100, &[
            ("key", &[], "heat"),
            ("result:heaters^:current", &[1], "205.3"),
        ]);
        assert!(heater_events(engine.observer()).is_empty());
        assert!(!engine.scheduler().is_dirty(Subsystem::Heat));

        respond(&mut engine, 1200, &[
            ("key", &[], "tools"),
            ("result^:number", &[0], "0"),
            ("result^:heaters^", &[0, 0], "1"),
        ]);
        respond(&mut engine, 1300, &[("key", &[], ""), ("result:seqs:heat", &[], "2")]);
        engine.observer_mut().clear();

        host.now = 2100;
        assert_eq!(engine.poll(&mut host), Some(Request::Detail(Subsystem::Heat)));
        respond(&mut engine, 2200, &[
            ("key", &[], "heat"),
            ("result:heaters^:current", &[1], "205.3"),
        ]);
        assert_eq!(
            heater_events(engine.observer()),
            vec![&ModelEvent::HeaterTemperature {
                heater: 1,
                kind: TemperatureKind::Current,
                value: 205.3
            }]
        );
        assert!(!engine.scheduler().is_dirty(Subsystem::Heat));
    }

    #[test]
    fn test_negative_bed_heater_drops_existing_bed() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "heat"),
            ("result:bedHeaters^", &[0], "0"),
            ("result:bedHeaters^", &[1], "1"),
            ("result:chamberHeaters^", &[0], "2"),
        ]);
        assert_eq!(engine.store().bed_for_heater(1).map(|b| b.index), Some(1));

        respond(&mut engine, 200, &[
            ("key", &[], "heat"),
            ("result:bedHeaters^", &[0], "0"),
            ("result:bedHeaters^", &[1], "-1"),
            ("result:chamberHeaters^", &[0], "-1"),
        ]);
        assert_eq!(engine.store().beds.indices(), vec![0]);
        assert!(engine.store().chambers.is_empty());

        engine.observer_mut().clear();
        respond(&mut engine, 300, &[
            ("key", &[], ""),
            ("result:heat:heaters^:current", &[1], "60"),
            ("result:heat:heaters^:current", &[2], "40"),
        ]);
        assert!(heater_events(engine.observer()).is_empty());
    }

    #[test]
    fn test_removed_spindle_leaves_no_tool_link() {
        let mut engine = engine();
        respond(&mut engine, 100, &[
            ("key", &[], "spindles"),
            ("result^:active", &[0], "1000"),
            ("result^:tool", &[0], "2"),
        ]);
        assert_eq!(engine.store().tools.get(2).and_then(|t| t.spindle), Some(0));

        engine.begin_message();
        engine.process_value("key", &[], "spindles");
        engine.process_array_end("result^", &[0]);
        engine.end_message(200);
        assert!(engine.store().spindles.is_empty());

        respond(&mut engine, 300, &[("key", &[], "spindles"), ("result^:active", &[0], "500")]);
        assert_eq!(engine.store().spindles.get(0).and_then(|s| s.tool), None);
        assert_eq!(engine.store().tools.get(2).and_then(|t| t.spindle), None);
    }

    #[test]
    fn test_complete_alert_after_partial_one() {
        let mut engine = engine();
        engine.begin_message();
        engine.process_value("key", &[], "state");
        engine.process_value("result:messageBox:title", &[], "T1");
        engine.process_value("result:messageBox:message", &[], "M1");
        engine.process_value("result:messageBox:mode", &[], "1");
        engine.end_message(100);
        assert!(engine.observer().events().is_empty());

        engine.begin_message();
        engine.process_value("key", &[], "state");
        for (field, value) in [
            ("title", "T2"),
            ("message", "M2"),
            ("mode", "1"),
            ("seq", "4"),
            ("timeout", "0"),
            ("axisControls", "0"),
        ] {
            engine.process_value(&format!("result:messageBox:{}", field), &[], value);
        }
        engine.end_message(200);
        assert!(matches!(
            engine.observer().events(),
            [ModelEvent::Alert(alert)] if alert.title == "T2" && alert.text == "M2" && alert.seq == 4
        ));
    }

    #[test]
    fn test_out_of_range_seq_is_ignored() {
        let mut engine = engine();
        respond(&mut engine, 100, &[("key", &[], ""), ("result:seqs:heat", &[], "70000")]);
        assert!(!engine.scheduler().is_dirty(Subsystem::Heat));
        assert_eq!(engine.scheduler().seq(Subsystem::Heat), u16::MAX);
    }
}

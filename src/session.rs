//! Per-response transaction boundary
//!
//! Some values only make sense together: an alert needs all six of its
//! message box fields, a beep needs both frequency and duration. They are
//! staged while a response is being parsed and only delivered once the
//! whole response arrived intact.

use crate::coerce::{parse_float, parse_int, parse_uint};
use crate::fields::AlertField;
use serde::Serialize;
use tracing::debug;

const GOT_TEXT: u8 = 1 << 0;
const GOT_TITLE: u8 = 1 << 1;
const GOT_MODE: u8 = 1 << 2;
const GOT_SEQ: u8 = 1 << 3;
const GOT_TIMEOUT: u8 = 1 << 4;
const GOT_CONTROLS: u8 = 1 << 5;
const GOT_ALL: u8 = GOT_TEXT | GOT_TITLE | GOT_MODE | GOT_SEQ | GOT_TIMEOUT | GOT_CONTROLS;

const BEEP_FREQUENCY_RANGE: std::ops::RangeInclusive<i32> = 100..=10_000;
const MAX_BEEP_MILLIS: u32 = 20_000;

/// Reserved once for staged alert text
const ALERT_TEXT_CAPACITY: usize = 160;

/// A message box the controller wants shown
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Alert {
    pub title: String,
    pub text: String,
    pub mode: i32,
    pub seq: u32,
    pub timeout: f32,
    pub controls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Beep {
    pub frequency: u32,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Show(Alert),
    Clear,
}

/// Everything a committed response delivers at once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub alert: Option<AlertOutcome>,
    pub beep: Option<Beep>,
    /// New push-message sequence, if it moved
    pub message_seq: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Accumulating,
    Committed,
    Discarded,
}

/// Counters that only mean something within a single response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounters {
    pub visible_axes: usize,
    pub last_tool: Option<usize>,
    pub last_spindle: Option<usize>,
    pub mounted_volumes: usize,
}

#[derive(Debug, Clone)]
pub struct MessageSession {
    state: SessionState,
    staged: Alert,
    mask: u8,
    clear_requested: bool,
    beep_frequency: Option<i32>,
    beep_duration: Option<i32>,
    message_seq: u32,
    pending_message_seq: u32,
    last_alert_seq: Option<u32>,
    pub counters: MessageCounters,
}

impl Default for MessageSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            staged: Alert {
                title: String::with_capacity(ALERT_TEXT_CAPACITY),
                text: String::with_capacity(ALERT_TEXT_CAPACITY),
                ..Default::default()
            },
            mask: 0,
            clear_requested: false,
            beep_frequency: None,
            beep_duration: None,
            message_seq: 0,
            pending_message_seq: 0,
            last_alert_seq: None,
            counters: MessageCounters::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_accumulating(&self) -> bool {
        self.state == SessionState::Accumulating
    }

    /// Start a new response. Returns true if an unfinished one was dropped.
    pub fn begin(&mut self) -> bool {
        let dropped = self.is_accumulating();
        if dropped {
            debug!("Response started before the previous one ended, discarding it");
        }
        self.state = SessionState::Accumulating;
        self.staged.title.clear();
        self.staged.text.clear();
        self.mask = 0;
        self.clear_requested = false;
        self.beep_frequency = None;
        self.beep_duration = None;
        self.pending_message_seq = self.message_seq;
        self.counters = MessageCounters::default();
        dropped
    }

    /// Stage one message box field. Returns false if the value did not parse.
    pub fn stage_alert_field(&mut self, field: AlertField, value: &str) -> bool {
        let bit = match field {
            AlertField::Message => {
                self.staged.text.clear();
                self.staged.text.push_str(value);
                GOT_TEXT
            }
            AlertField::Title => {
                self.staged.title.clear();
                self.staged.title.push_str(value);
                GOT_TITLE
            }
            AlertField::Mode => match parse_int(value) {
                Some(mode) => {
                    self.staged.mode = mode;
                    GOT_MODE
                }
                None => return false,
            },
            AlertField::Seq => match parse_uint(value) {
                Some(seq) => {
                    self.staged.seq = seq;
                    GOT_SEQ
                }
                None => return false,
            },
            AlertField::Timeout => match parse_float(value) {
                Some(timeout) => {
                    self.staged.timeout = timeout;
                    GOT_TIMEOUT
                }
                None => return false,
            },
            AlertField::AxisControls => match parse_uint(value) {
                Some(controls) => {
                    self.staged.controls = controls;
                    GOT_CONTROLS
                }
                None => return false,
            },
        };
        self.mask |= bit;
        true
    }

    /// The message box is explicitly empty
    pub fn stage_clear(&mut self) {
        self.clear_requested = true;
    }

    pub fn stage_beep_frequency(&mut self, frequency: i32) {
        self.beep_frequency = Some(frequency);
    }

    pub fn stage_beep_duration(&mut self, duration: i32) {
        self.beep_duration = Some(duration);
    }

    pub fn stage_message_seq(&mut self, seq: u32) {
        self.pending_message_seq = seq;
    }

    /// Finish the response and hand back what it delivers
    pub fn commit(&mut self) -> CommitOutcome {
        self.state = SessionState::Committed;

        let mode_cleared = self.mask & GOT_MODE != 0 && self.staged.mode < 0;
        let alert = if mode_cleared || self.clear_requested {
            Some(AlertOutcome::Clear)
        } else if self.mask == GOT_ALL && self.last_alert_seq != Some(self.staged.seq) {
            self.last_alert_seq = Some(self.staged.seq);
            Some(AlertOutcome::Show(self.staged.clone()))
        } else {
            None
        };

        let beep = match (self.beep_frequency, self.beep_duration) {
            (Some(frequency), Some(duration))
                if BEEP_FREQUENCY_RANGE.contains(&frequency) && duration > 0 =>
            {
                Some(Beep {
                    frequency: frequency.unsigned_abs(),
                    duration_ms: duration.unsigned_abs().min(MAX_BEEP_MILLIS),
                })
            }
            _ => None,
        };

        let message_seq = if self.pending_message_seq != self.message_seq {
            self.message_seq = self.pending_message_seq;
            Some(self.message_seq)
        } else {
            None
        };

        CommitOutcome {
            alert,
            beep,
            message_seq,
        }
    }

    /// Drop everything staged since `begin`
    pub fn discard(&mut self) {
        if self.is_accumulating() {
            debug!(fields = self.mask, "Discarding partial response");
        }
        self.state = SessionState::Discarded;
        self.mask = 0;
        self.clear_requested = false;
        self.beep_frequency = None;
        self.beep_duration = None;
        self.pending_message_seq = self.message_seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_full_alert(session: &mut MessageSession, seq: &str) {
        session.stage_alert_field(AlertField::Title, "Probe");
        session.stage_alert_field(AlertField::Message, "Jog Z until the nozzle touches");
        session.stage_alert_field(AlertField::Mode, "2");
        session.stage_alert_field(AlertField::Seq, seq);
        session.stage_alert_field(AlertField::Timeout, "0");
        session.stage_alert_field(AlertField::AxisControls, "4");
    }

    #[test]
    fn test_complete_alert_is_delivered() {
        let mut session = MessageSession::new();
        session.begin();
        stage_full_alert(&mut session, "5");
        let outcome = session.commit();
        match outcome.alert {
            Some(AlertOutcome::Show(alert)) => {
                assert_eq!(alert.title, "Probe");
                assert_eq!(alert.mode, 2);
                assert_eq!(alert.seq, 5);
                assert_eq!(alert.controls, 4);
            }
            other => panic!("expected alert, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Committed);
    }

    #[test]
    fn test_incomplete_alert_is_dropped() {
        let mut session = MessageSession::new();
        session.begin();
        session.stage_alert_field(AlertField::Title, "Probe");
        session.stage_alert_field(AlertField::Message, "text");
        session.stage_alert_field(AlertField::Mode, "2");
        session.stage_alert_field(AlertField::Seq, "5");
        session.stage_alert_field(AlertField::Timeout, "0");
        assert_eq!(session.commit().alert, None);
    }

    #[test]
    fn test_partial_fields_do_not_leak_into_next_message() {
        let mut session = MessageSession::new();
        session.begin();
        session.stage_alert_field(AlertField::Title, "Probe");
        session.stage_alert_field(AlertField::Message, "text");
        session.stage_alert_field(AlertField::Mode, "2");
        assert_eq!(session.commit().alert, None);

        session.begin();
        session.stage_alert_field(AlertField::Seq, "5");
        session.stage_alert_field(AlertField::Timeout, "0");
        session.stage_alert_field(AlertField::AxisControls, "0");
        assert_eq!(session.commit().alert, None);
    }

    #[test]
    fn test_same_seq_delivered_once() {
        let mut session = MessageSession::new();
        session.begin();
        stage_full_alert(&mut session, "9");
        assert!(matches!(session.commit().alert, Some(AlertOutcome::Show(_))));

        session.begin();
        stage_full_alert(&mut session, "9");
        assert_eq!(session.commit().alert, None);

        session.begin();
        stage_full_alert(&mut session, "10");
        assert!(matches!(session.commit().alert, Some(AlertOutcome::Show(_))));
    }

    #[test]
    fn test_negative_mode_clears() {
        let mut session = MessageSession::new();
        session.begin();
        session.stage_alert_field(AlertField::Mode, "-1");
        assert_eq!(session.commit().alert, Some(AlertOutcome::Clear));

        session.begin();
        stage_full_alert(&mut session, "3");
        session.stage_alert_field(AlertField::Mode, "-1");
        assert_eq!(session.commit().alert, Some(AlertOutcome::Clear));

        session.begin();
        session.stage_clear();
        assert_eq!(session.commit().alert, Some(AlertOutcome::Clear));
    }

    #[test]
    fn test_unparsable_field_sets_no_bit() {
        let mut session = MessageSession::new();
        session.begin();
        stage_full_alert(&mut session, "abc");
        assert!(!session.stage_alert_field(AlertField::Mode, ""));
        assert_eq!(session.commit().alert, None);
    }

    #[test]
    fn test_discard_delivers_nothing() {
        let mut session = MessageSession::new();
        session.begin();
        stage_full_alert(&mut session, "1");
        session.stage_message_seq(4);
        session.discard();
        assert_eq!(session.state(), SessionState::Discarded);

        session.begin();
        assert_eq!(session.commit(), CommitOutcome::default());
    }

    #[test]
    fn test_begin_while_accumulating_drops_previous() {
        let mut session = MessageSession::new();
        assert!(!session.begin());
        stage_full_alert(&mut session, "1");
        assert!(session.begin());
        assert_eq!(session.commit().alert, None);
    }

    #[test]
    fn test_beep_needs_both_parts_in_range() {
        let mut session = MessageSession::new();
        session.begin();
        session.stage_beep_frequency(440);
        assert_eq!(session.commit().beep, None);

        session.begin();
        session.stage_beep_frequency(440);
        session.stage_beep_duration(60_000);
        assert_eq!(
            session.commit().beep,
            Some(Beep {
                frequency: 440,
                duration_ms: 20_000
            })
        );

        session.begin();
        session.stage_beep_frequency(50);
        session.stage_beep_duration(100);
        assert_eq!(session.commit().beep, None);
    }

    #[test]
    fn test_message_seq_reported_on_change_only() {
        let mut session = MessageSession::new();
        session.begin();
        session.stage_message_seq(3);
        assert_eq!(session.commit().message_seq, Some(3));

        session.begin();
        session.stage_message_seq(3);
        assert_eq!(session.commit().message_seq, None);
    }
}

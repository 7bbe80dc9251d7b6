//! Sequence-driven poll scheduling
//!
//! The controller bumps a per-subsystem sequence number whenever that branch
//! of its object model changes. The summary response carries all of them, so
//! the panel only has to fetch detail for subsystems whose counter moved.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level object model branches, declared in poll priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Network,
    Boards,
    Move,
    Heat,
    Tools,
    Spindles,
    Directories,
    Fans,
    Inputs,
    Job,
    Scanner,
    Sensors,
    State,
    Volumes,
}

pub const SUBSYSTEM_COUNT: usize = 14;

impl Subsystem {
    /// Every subsystem, highest poll priority first
    pub const ALL: [Subsystem; SUBSYSTEM_COUNT] = [
        Subsystem::Network,
        Subsystem::Boards,
        Subsystem::Move,
        Subsystem::Heat,
        Subsystem::Tools,
        Subsystem::Spindles,
        Subsystem::Directories,
        Subsystem::Fans,
        Subsystem::Inputs,
        Subsystem::Job,
        Subsystem::Scanner,
        Subsystem::Sensors,
        Subsystem::State,
        Subsystem::Volumes,
    ];

    /// Key used in `M409 K"..."`
    pub fn key(self) -> &'static str {
        match self {
            Subsystem::Network => "network",
            Subsystem::Boards => "boards",
            Subsystem::Move => "move",
            Subsystem::Heat => "heat",
            Subsystem::Tools => "tools",
            Subsystem::Spindles => "spindles",
            Subsystem::Directories => "directories",
            Subsystem::Fans => "fans",
            Subsystem::Inputs => "inputs",
            Subsystem::Job => "job",
            Subsystem::Scanner => "scanner",
            Subsystem::Sensors => "sensors",
            Subsystem::State => "state",
            Subsystem::Volumes => "volumes",
        }
    }

    /// Flags used in `M409 F"..."` for a detail request
    pub fn flags(self) -> &'static str {
        match self {
            Subsystem::State => "vn",
            _ => "v",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// An outbound object model query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Lightweight cross-subsystem status, including all sequence numbers
    Summary,
    /// Full verbose data for one subsystem
    Detail(Subsystem),
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Summary => write!(f, "M409 F\"d99f\""),
            Request::Detail(subsystem) => {
                write!(f, "M409 K\"{}\" F\"{}\"", subsystem.key(), subsystem.flags())
            }
        }
    }
}

/// What the poll loop should do this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Too soon after the last request or response
    Wait,
    /// Fetch detail for the highest-priority dirty subsystem
    Detail(Subsystem),
    /// Nothing is dirty. A collaborator with its own pending work may take
    /// this turn instead of the summary request.
    Summary,
    /// The last request went unanswered for too long. Always sends a summary.
    Resend,
}

/// Backpressure intervals, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub poll_interval: u64,
    pub response_interval: u64,
    pub poll_timeout: u64,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            poll_interval: 1000,
            response_interval: 700,
            poll_timeout: 4000,
        }
    }
}

/// Counter value that no fresh controller reports before wrapping
const SEQ_SENTINEL: u16 = u16::MAX;

/// Per-subsystem sequence bookkeeping plus request/response timestamps
#[derive(Debug, Clone)]
pub struct PollScheduler {
    seqs: [u16; SUBSYSTEM_COUNT],
    dirty: [bool; SUBSYSTEM_COUNT],
    fetched: [bool; SUBSYSTEM_COUNT],
    last_poll: u64,
    last_response: u64,
    remote_uptime: u32,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(&Subsystem::ALL)
    }
}

impl PollScheduler {
    /// Create a scheduler that only ever fetches detail for `fetch`
    pub fn new(fetch: &[Subsystem]) -> Self {
        let mut fetched = [false; SUBSYSTEM_COUNT];
        for subsystem in fetch {
            fetched[subsystem.slot()] = true;
        }
        Self {
            seqs: [SEQ_SENTINEL; SUBSYSTEM_COUNT],
            dirty: [false; SUBSYSTEM_COUNT],
            fetched,
            last_poll: 0,
            last_response: 0,
            remote_uptime: 0,
        }
    }

    /// Record a sequence number from a summary response.
    /// Returns true if the subsystem became dirty.
    pub fn update_seq(&mut self, subsystem: Subsystem, value: u16) -> bool {
        let slot = subsystem.slot();
        if !self.fetched[slot] || self.seqs[slot] == value {
            return false;
        }
        self.seqs[slot] = value;
        self.dirty[slot] = true;
        true
    }

    pub fn is_dirty(&self, subsystem: Subsystem) -> bool {
        self.dirty[subsystem.slot()]
    }

    pub fn is_fetched(&self, subsystem: Subsystem) -> bool {
        self.fetched[subsystem.slot()]
    }

    pub fn seq(&self, subsystem: Subsystem) -> u16 {
        self.seqs[subsystem.slot()]
    }

    /// A detail reply for `subsystem` has been fully received
    pub fn clear_dirty(&mut self, subsystem: Subsystem) {
        self.dirty[subsystem.slot()] = false;
    }

    /// Highest-priority dirty subsystem, if any
    pub fn next_dirty(&self) -> Option<Subsystem> {
        Subsystem::ALL.into_iter().find(|s| self.dirty[s.slot()])
    }

    /// Forget every known sequence number and mark all fetched subsystems
    /// dirty, so the whole model is fetched again.
    pub fn reset(&mut self) {
        self.seqs = [SEQ_SENTINEL; SUBSYSTEM_COUNT];
        self.dirty = self.fetched;
    }

    /// Track the controller's uptime. Returns true if it went backwards,
    /// meaning the controller restarted since the last report.
    pub fn observe_uptime(&mut self, uptime: u32) -> bool {
        let restarted = uptime < self.remote_uptime;
        self.remote_uptime = uptime;
        restarted
    }

    pub fn remote_uptime(&self) -> u32 {
        self.remote_uptime
    }

    pub fn record_request(&mut self, now: u64) {
        self.last_poll = now;
    }

    pub fn record_response(&mut self, now: u64) {
        self.last_response = now;
    }

    pub fn last_poll(&self) -> u64 {
        self.last_poll
    }

    pub fn last_response(&self) -> u64 {
        self.last_response
    }
}

/// Decide what to send this tick. Pure: depends only on the arguments.
pub fn next_action(scheduler: &PollScheduler, timing: &PollTiming, now: u64) -> PollAction {
    let since_poll = now.saturating_sub(scheduler.last_poll);
    let since_response = now.saturating_sub(scheduler.last_response);

    if since_poll < timing.poll_interval || since_response < timing.response_interval {
        return PollAction::Wait;
    }

    if scheduler.last_response > scheduler.last_poll {
        return match scheduler.next_dirty() {
            Some(subsystem) => PollAction::Detail(subsystem),
            None => PollAction::Summary,
        };
    }

    if since_poll >= timing.poll_timeout {
        PollAction::Resend
    } else {
        PollAction::Wait
    }
}

//! omsync - incremental object model sync for a serial machine-controller panel
//!
//! Mirrors the controller's object model (axes, tools, spindles, heaters,
//! job and machine state) over a slow half-duplex link. Instead of fetching
//! everything on each cycle, the panel polls a small summary carrying one
//! sequence number per subsystem, and only asks for detail where a number
//! moved.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use omsync::{EventLog, PollHost, SyncEngine};
//!
//! struct Serial;
//!
//! impl PollHost for Serial {
//!     fn send_request(&mut self, request: &str) {
//!         println!("{}", request);
//!     }
//!
//!     fn now_millis(&self) -> u64 {
//!         0
//!     }
//! }
//!
//! let mut engine = SyncEngine::with_defaults(EventLog::new());
//! engine.poll(&mut Serial);
//!
//! // tuples from the tokenizer
//! engine.begin_message();
//! engine.process_value("key", &[], "");
//! engine.process_value("result:seqs:heat", &[], "7");
//! engine.end_message(120);
//! ```
//!
//! # Architecture
//!
//! - **FieldDispatcher**: wire path to field code, over tables sorted once
//! - **MessageSession**: stages composite values until a response completes
//! - **PollScheduler**: sequence numbers, dirty bits and backpressure
//! - **ObjectModelStore**: index-keyed axes, tools, spindles, beds, chambers
//! - **SyncEngine**: owns all of the above and runs the field handlers
//! - **ModelObserver** / **PollHost**: the collaborator boundary

pub mod coerce;
pub mod config;
pub mod engine;
pub mod error;
pub mod fields;
pub mod json_feed;
pub mod json_output;
pub mod model;
pub mod observer;
pub mod scheduler;
pub mod session;
pub mod status;

pub use config::{ModelConfig, PollingConfig, SyncConfig};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use fields::{ArrayCode, FieldCode, FieldDispatcher, ResponseKey};
pub use model::{Axis, BedOrChamber, IndexedList, ObjectModelStore, Spindle, Tool};
pub use observer::{EventLog, ModelEvent, ModelObserver, NoOpObserver, PollHost, TemperatureKind};
pub use scheduler::{next_action, PollAction, PollScheduler, PollTiming, Request, Subsystem};
pub use session::{Alert, Beep, MessageSession};
pub use status::{HeaterStatus, PrinterStatus, ToolStatus};

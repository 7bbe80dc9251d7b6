//! Feed recorded M409 JSON responses into a [`SyncEngine`]
//!
//! The panel's own transport tokenizes JSON on the fly. For replay and
//! tests a whole response is available up front, so it is walked here and
//! turned into the same `(path, indices, value)` tuples and array-end
//! events the engine expects.

use crate::engine::SyncEngine;
use crate::observer::ModelObserver;
use crate::{Result, SyncError};
use serde_json::Value;

struct Flattener<'e, O: ModelObserver> {
    engine: &'e mut SyncEngine<O>,
    path: String,
    indices: Vec<usize>,
}

impl<O: ModelObserver> Flattener<'_, O> {
    fn walk(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                for (name, child) in map {
                    let len = self.path.len();
                    if !self.path.is_empty() {
                        self.path.push(':');
                    }
                    self.path.push_str(name);
                    self.walk(child);
                    self.path.truncate(len);
                }
            }
            Value::Array(items) => {
                let len = self.path.len();
                self.path.push('^');
                for (i, item) in items.iter().enumerate() {
                    self.indices.push(i);
                    self.walk(item);
                    self.indices.pop();
                }
                self.indices.push(items.len());
                self.engine.process_array_end(&self.path, &self.indices);
                self.indices.pop();
                self.path.truncate(len);
            }
            Value::String(text) => self.engine.process_value(&self.path, &self.indices, text),
            Value::Null => self.engine.process_value(&self.path, &self.indices, ""),
            Value::Bool(b) => {
                let text = if *b { "true" } else { "false" };
                self.engine.process_value(&self.path, &self.indices, text);
            }
            Value::Number(n) => {
                let text = n.to_string();
                self.engine.process_value(&self.path, &self.indices, &text);
            }
        }
    }
}

/// Run one complete response through the engine as a single message
pub fn feed_response<O: ModelObserver>(
    engine: &mut SyncEngine<O>,
    response: &Value,
    now: u64,
) -> Result<()> {
    if !response.is_object() {
        return Err(SyncError::Transcript(format!(
            "expected a JSON object, got {}",
            response
        )));
    }
    engine.begin_message();
    let mut flattener = Flattener {
        engine,
        path: String::with_capacity(64),
        indices: Vec::with_capacity(4),
    };
    flattener.walk(response);
    flattener.engine.end_message(now);
    Ok(())
}

/// Parse one line of transcript and feed it. A line that is not valid JSON
/// counts as a parser error on the link.
pub fn feed_line<O: ModelObserver>(engine: &mut SyncEngine<O>, line: &str, now: u64) -> Result<()> {
    match serde_json::from_str::<Value>(line) {
        Ok(response) => feed_response(engine, &response, now),
        Err(e) => {
            engine.parser_error();
            Err(e.into())
        }
    }
}

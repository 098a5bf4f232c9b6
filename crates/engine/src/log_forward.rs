// SCDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Forwarding log output to the front end.
//!
//! Install the layer returned by [`LogBuffer::layer`] (for example through
//! `scdb_common::init_logging_with_layer`) and hand the same buffer to
//! [`crate::DebuggerCore::with_log_buffer`]. The core drains it into
//! [`crate::DebuggerFrontEnd::append_log`] whenever it talks to the front end.

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{layer::Context, Layer};

/// Lines kept when nobody drains the buffer.
const DEFAULT_CAPACITY: usize = 512;

/// Shared queue of formatted log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    /// Create a buffer holding at most 512 lines
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding at most `capacity` lines; older lines are dropped first
    pub fn with_capacity(capacity: usize) -> Self {
        Self { lines: Arc::new(Mutex::new(VecDeque::new())), capacity: capacity.max(1) }
    }

    /// Append a line
    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Take every buffered line, oldest first
    pub fn drain(&self) -> Vec<String> {
        self.lines.lock().drain(..).collect()
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// A layer capturing events at `max_level` and above into this buffer
    pub fn layer(&self, max_level: Level) -> FrontEndLogLayer {
        FrontEndLogLayer { buffer: self.clone(), max_level }
    }
}

/// `tracing` layer that formats events into a [`LogBuffer`].
#[derive(Debug, Clone)]
pub struct FrontEndLogLayer {
    buffer: LogBuffer,
    max_level: Level,
}

impl<S: Subscriber> Layer<S> for FrontEndLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.max_level {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.buffer.push(format!("[{}] {}: {}", meta.level(), meta.target(), visitor.finish()));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} ({})", self.message, self.fields.join(", "))
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::{layer::SubscriberExt, Registry};

    #[test]
    fn test_layer_captures_events() {
        let buffer = LogBuffer::new();
        let subscriber = Registry::default().with(buffer.layer(Level::INFO));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(depth = 2, "Breakpoint hit");
            tracing::debug!("too verbose");
        });

        let lines = buffer.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[INFO]"));
        assert!(lines[0].contains("Breakpoint hit (depth=2)"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buffer = LogBuffer::with_capacity(2);
        buffer.push("a".into());
        buffer.push("b".into());
        buffer.push("c".into());
        assert_eq!(buffer.drain(), vec!["b".to_string(), "c".to_string()]);
    }
}

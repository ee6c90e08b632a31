//! Diagnostic sinks.
//!
//! The VM never prints directly and holds no process-global logging state.
//! Script output (`message()`), runtime warnings (e.g. `wait(0)`) and
//! runtime errors are routed through a [`DiagnosticSink`] passed explicitly
//! into parsing and execution.

use crate::issues::ParserIssue;
use std::time::Instant;

/// Receiver for everything the engine wants a human (or log) to see.
pub trait DiagnosticSink {
    /// Output of the built-in `message()` function.
    fn script_message(&mut self, text: &str);

    /// Runtime warning, e.g. an aborting `wait(0)` call.
    fn runtime_warning(&mut self, text: &str);

    /// Runtime error that terminated a handler.
    fn runtime_error(&mut self, text: &str);

    /// Parse issue, forwarded while parsing. Issues are also collected
    /// structurally on the parsed script, so sinks may ignore this.
    fn parse_issue(&mut self, _issue: &ParserIssue) {}
}

/// Default sink: emits `tracing` events, stamping script messages with the
/// engine uptime in seconds.
pub struct TracingSink {
    started: Instant,
}

impl TracingSink {
    pub fn new() -> Self {
        TracingSink {
            started: Instant::now(),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for TracingSink {
    fn script_message(&mut self, text: &str) {
        let uptime = self.started.elapsed().as_secs_f64();
        tracing::info!(target: "nksp::script", uptime, "{}", text);
    }

    fn runtime_warning(&mut self, text: &str) {
        tracing::warn!(target: "nksp::vm", "{}", text);
    }

    fn runtime_error(&mut self, text: &str) {
        tracing::error!(target: "nksp::vm", "{}", text);
    }

    fn parse_issue(&mut self, issue: &ParserIssue) {
        if issue.is_error() {
            tracing::error!(target: "nksp::parser", "{}", issue);
        } else {
            tracing::warn!(target: "nksp::parser", "{}", issue);
        }
    }
}

/// Sink that swallows everything.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn script_message(&mut self, _text: &str) {}

    fn runtime_warning(&mut self, _text: &str) {}

    fn runtime_error(&mut self, _text: &str) {}
}

/// Sink that collects everything in memory. Used by tests and by tooling
/// that wants to present script output itself.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticSink for BufferSink {
    fn script_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn runtime_warning(&mut self, text: &str) {
        self.warnings.push(text.to_string());
    }

    fn runtime_error(&mut self, text: &str) {
        self.errors.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_collects() {
        let mut sink = BufferSink::new();
        sink.script_message("hello");
        sink.runtime_warning("careful");
        sink.runtime_error("boom");
        assert_eq!(sink.messages, vec!["hello"]);
        assert_eq!(sink.warnings, vec!["careful"]);
        assert_eq!(sink.errors, vec!["boom"]);
    }
}

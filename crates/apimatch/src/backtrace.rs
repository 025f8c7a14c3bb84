//! Diagnostic trail of matcher decisions.

use serde_json::Value;
use std::fmt;

/// Values and patterns at or above this many bytes are left out of the trail.
pub const MAX_SNIPPET_LEN: usize = 50;

/// Observer notified by the matcher on every node and expander it evaluates.
///
/// Implementations only watch; they cannot change a match outcome.
pub trait Backtrace {
    fn matcher_can_match(&mut self, name: &str, value: &Value, result: bool);
    fn matcher_entrance(&mut self, name: &str, value: &Value, pattern: &Value);
    fn matcher_succeed(&mut self, name: &str, value: &Value, pattern: &Value);
    fn matcher_failed(&mut self, name: &str, value: &Value, pattern: &Value, error: &str);

    fn expander_entrance(&mut self, _name: &str, _value: &Value) {}
    fn expander_succeed(&mut self, _name: &str, _value: &Value) {}
    fn expander_failed(&mut self, _name: &str, _value: &Value, _error: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub matcher: String,
    pub value: String,
    pub pattern: String,
    pub error: String,
}

/// Records short leaf-level failures.
///
/// A failure is kept only if a `matcher_can_match` armed the collector and no
/// success disarmed it since, and both the value and the pattern are strings
/// shorter than [`MAX_SNIPPET_LEN`] bytes.
#[derive(Debug, Clone, Default)]
pub struct JsonBacktrace {
    entries: Vec<TraceEntry>,
    check_fail: bool,
}

impl JsonBacktrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Rendered trail lines, two per recorded failure.
    pub fn raw(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            lines.push(format!(
                "#{} Matcher {} failed to match value \"{}\" with \"{}\" pattern",
                lines.len() + 1,
                entry.matcher,
                entry.value,
                entry.pattern
            ));
            lines.push(format!(
                "#{} Matcher {} error: {}",
                lines.len() + 1,
                entry.matcher,
                entry.error
            ));
        }
        lines
    }
}

impl fmt::Display for JsonBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw().join("\n"))
    }
}

fn short_string(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if s.len() < MAX_SNIPPET_LEN => Some(s),
        _ => None,
    }
}

fn single_line(s: &str) -> String {
    s.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Backtrace for JsonBacktrace {
    fn matcher_can_match(&mut self, _name: &str, _value: &Value, result: bool) {
        if result {
            self.check_fail = true;
        }
    }

    fn matcher_entrance(&mut self, _name: &str, _value: &Value, _pattern: &Value) {}

    fn matcher_succeed(&mut self, _name: &str, _value: &Value, _pattern: &Value) {
        self.check_fail = false;
    }

    fn matcher_failed(&mut self, name: &str, value: &Value, pattern: &Value, error: &str) {
        if !self.check_fail {
            return;
        }
        let (Some(value), Some(pattern)) = (short_string(value), short_string(pattern)) else {
            return;
        };
        self.entries.push(TraceEntry {
            matcher: name.to_string(),
            value: single_line(value),
            pattern: single_line(pattern),
            error: single_line(error),
        });
    }
}

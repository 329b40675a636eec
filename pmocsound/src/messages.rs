//! Engine diagnostics.
//!
//! Engines report free-form text tagged with a message class. The class is
//! mapped to a [`Severity`] and handed to the [`MessageSink`] given to the
//! engine factory; there is no process-wide callback.

use std::fmt;

/// Message classes emitted by block engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    Warning,
    /// Output of the program itself (print opcodes and the like).
    Orchestra,
    Realtime,
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Trace,
}

impl From<MessageKind> for Severity {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Error => Severity::Error,
            MessageKind::Warning => Severity::Warning,
            MessageKind::Orchestra => Severity::Info,
            MessageKind::Realtime | MessageKind::Default => Severity::Trace,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Receiver of engine diagnostics.
pub trait MessageSink: Send + Sync {
    fn message(&self, severity: Severity, text: &str);

    fn engine_message(&self, kind: MessageKind, text: &str) {
        self.message(kind.into(), text);
    }
}

/// Forwards engine diagnostics to `tracing`, tagged with the element name.
#[derive(Debug, Clone)]
pub struct TracingMessageSink {
    element: String,
}

impl TracingMessageSink {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
        }
    }

    pub fn element(&self) -> &str {
        &self.element
    }
}

impl MessageSink for TracingMessageSink {
    fn message(&self, severity: Severity, text: &str) {
        // Engines usually terminate their lines themselves.
        let text = text.trim_end();
        match severity {
            Severity::Error => tracing::error!(element = %self.element, "{}", text),
            Severity::Warning => tracing::warn!(element = %self.element, "{}", text),
            Severity::Info => tracing::info!(element = %self.element, "{}", text),
            Severity::Trace => tracing::trace!(element = %self.element, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Severity, String)>>);

    impl MessageSink for Recorder {
        fn message(&self, severity: Severity, text: &str) {
            self.0.lock().unwrap().push((severity, text.to_string()));
        }
    }

    #[test]
    fn test_kind_to_severity() {
        assert_eq!(Severity::from(MessageKind::Error), Severity::Error);
        assert_eq!(Severity::from(MessageKind::Warning), Severity::Warning);
        assert_eq!(Severity::from(MessageKind::Orchestra), Severity::Info);
        assert_eq!(Severity::from(MessageKind::Realtime), Severity::Trace);
        assert_eq!(Severity::from(MessageKind::Default), Severity::Trace);
    }

    #[test]
    fn test_engine_message_goes_through_mapping() {
        let recorder = Recorder::default();
        recorder.engine_message(MessageKind::Orchestra, "instr 1: note on");
        let messages = recorder.0.lock().unwrap();
        assert_eq!(
            messages.as_slice(),
            &[(Severity::Info, "instr 1: note on".to_string())]
        );
    }

    #[test]
    fn test_tracing_sink_accepts_every_severity() {
        let sink = TracingMessageSink::new("csoundfilter0");
        for severity in [
            Severity::Error,
            Severity::Warning,
            Severity::Info,
            Severity::Trace,
        ] {
            sink.message(severity, "message\n");
        }
        assert_eq!(sink.element(), "csoundfilter0");
    }
}

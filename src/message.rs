// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Structured, severity-tagged messages reported to a client-supplied [`MessageSink`].
//!
//! This is distinct from the crate's use of the [`log`] facade: `log` carries unstructured
//! crate-internal diagnosis (`trace!`/`debug!`/`warn!`), while [`Message`] is the documented,
//! stable channel through which recoverable per-node conditions (an excluded file, a name that had
//! to be mangled, a symlink that could not be resolved) are surfaced to the caller without aborting
//! the operation in progress.

use std::fmt;

/// Severity of a reported [`Message`], ordered from least to most severe.
///
/// Named and ordered after the outcome classes a recursive tree-add or a write pass can produce:
/// a [`Severity::Sorry`] is reported, skips the offending node, and continues; a
/// [`Severity::Fatal`] aborts the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    /// Lowest-detail diagnostic information, useful only while debugging the crate itself.
    Debug,
    /// A note about normal operation the caller may want visibility into.
    Note,
    /// Information about a change made on the caller's behalf (e.g. a name was mangled).
    Update,
    /// A hint about a possible improvement or a non-default choice being made.
    Hint,
    /// A condition that may indicate a problem but did not prevent progress.
    Warning,
    /// A node or feature was skipped because it could not be represented; traversal continues.
    Sorry,
    /// The whole operation failed and has been aborted.
    Fatal,
    /// An assertion about internal state failed; should never be observed.
    Never,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Note => "NOTE",
            Severity::Update => "UPDATE",
            Severity::Hint => "HINT",
            Severity::Warning => "WARNING",
            Severity::Sorry => "SORRY",
            Severity::Fatal => "FATAL",
            Severity::Never => "NEVER",
        };
        f.write_str(s)
    }
}

/// A single reported condition: a severity, a stable numeric code, and a human-readable text.
#[derive(Debug, Clone)]
pub struct Message {
    /// How severe the condition is.
    pub severity: Severity,
    /// A stable code identifying the kind of condition, for callers that want to match on it
    /// rather than parse `text`.
    pub code: u16,
    /// A human-readable description, already formatted with any relevant node path or name.
    pub text: String,
}

impl Message {
    /// Builds a new message.
    pub fn new(severity: Severity, code: u16, text: impl Into<String>) -> Message {
        Message {
            severity,
            code,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({:04}) {}", self.severity, self.code, self.text)
    }
}

/// Receives [`Message`]s reported during tree construction and image writing.
///
/// Implementations decide what to do with a message: collect it, print it, filter it by a minimum
/// severity threshold. A [`MessageSink`] never causes an operation to fail by itself — only a
/// [`Severity::Fatal`] message paired with an `Err` return from the call that produced it does
/// that; the sink is purely an observation channel.
pub trait MessageSink {
    /// Receives one message. Called synchronously from whichever thread produced it.
    fn report(&self, message: &Message);
}

/// A [`MessageSink`] that forwards every message to the [`log`] facade at a level derived from
/// [`Severity`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn report(&self, message: &Message) {
        match message.severity {
            Severity::Never | Severity::Fatal => log::error!("{message}"),
            Severity::Sorry | Severity::Warning => log::warn!("{message}"),
            Severity::Hint | Severity::Update => log::info!("{message}"),
            Severity::Note => log::debug!("{message}"),
            Severity::Debug => log::trace!("{message}"),
        }
    }
}

/// A [`MessageSink`] that silently discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn report(&self, _message: &Message) {}
}

/// A [`MessageSink`] that accumulates every message it receives, for tests and for callers that
/// want to inspect the full report after an operation completes.
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: std::sync::Mutex<Vec<Message>>,
}

impl CollectingSink {
    /// Builds an empty sink.
    pub fn new() -> CollectingSink {
        CollectingSink::default()
    }

    /// Returns a clone of every message collected so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().expect("sink mutex poisoned").clone()
    }

    /// Returns true if any collected message is at least as severe as `min`.
    pub fn has_severity_at_least(&self, min: Severity) -> bool {
        self.messages
            .lock()
            .expect("sink mutex poisoned")
            .iter()
            .any(|m| m.severity >= min)
    }
}

impl MessageSink for CollectingSink {
    fn report(&self, message: &Message) {
        self.messages
            .lock()
            .expect("sink mutex poisoned")
            .push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Fatal > Severity::Warning);
        assert!(Severity::Warning > Severity::Note);
    }

    #[test]
    fn collecting_sink_accumulates() {
        let sink = CollectingSink::new();
        sink.report(&Message::new(Severity::Warning, 1, "first"));
        sink.report(&Message::new(Severity::Sorry, 2, "second"));
        assert_eq!(sink.messages().len(), 2);
        assert!(sink.has_severity_at_least(Severity::Warning));
        assert!(!sink.has_severity_at_least(Severity::Fatal));
    }

    #[test]
    fn display_format() {
        let m = Message::new(Severity::Hint, 42, "example");
        assert_eq!(format!("{m}"), "[HINT] (0042) example");
    }
}

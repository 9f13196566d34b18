//! Change tracking for the optimization pipeline.
//!
//! Every pass records what it did into an [`EventLog`]: blocks and statements it
//! removed, nodes it inserted, call sites it inlined or declined, and the effects and
//! cost the finished body ended up with. The log is append-only and shared by
//! reference, so concurrent optimization of many bodies can record into one log.
//!
//! # Example
//!
//! ```rust
//! use ssaopt::optimizer::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::PhiInserted)
//!     .method("f")
//!     .location(4)
//!     .pass("slot2reg");
//! log.info("pipeline finished");
//!
//! assert_eq!(log.count_kind(EventKind::PhiInserted), 1);
//! assert_eq!(log.summary(), "1 phi inserted");
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

/// Categories of recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An unreachable block was removed.
    BlockEliminated,
    /// A statement was removed.
    StatementEliminated,
    /// A pending node was inserted into the stream.
    NodeInserted,
    /// A phi node was inserted by SSA construction.
    PhiInserted,
    /// A call site was inlined.
    CalleeInlined,
    /// A call site was considered for inlining and declined.
    InlineDeclined,
    /// The effects of a body were refined.
    EffectsRefined,
    /// Effect refinement gave up on a body.
    RefinementAbandoned,
    /// The inlining cost of a body was computed.
    CostComputed,

    /// A pass completed.
    PassCompleted,
    /// The pipeline stopped early.
    PipelineStopped,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::BlockEliminated => "block eliminated",
            Self::StatementEliminated => "statement eliminated",
            Self::NodeInserted => "node inserted",
            Self::PhiInserted => "phi inserted",
            Self::CalleeInlined => "callee inlined",
            Self::InlineDeclined => "inline declined",
            Self::EffectsRefined => "effects refined",
            Self::RefinementAbandoned => "refinement abandoned",
            Self::CostComputed => "cost computed",
            Self::PassCompleted => "pass completed",
            Self::PipelineStopped => "pipeline stopped",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Returns `true` if this event kind represents a change to a body.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::BlockEliminated
                | Self::StatementEliminated
                | Self::NodeInserted
                | Self::PhiInserted
                | Self::CalleeInlined
                | Self::EffectsRefined
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The kind of event.
    pub kind: EventKind,
    /// The method the event occurred in, if applicable.
    pub method: Option<Arc<str>>,
    /// Statement or block index within the method, if applicable.
    pub location: Option<usize>,
    /// Description of what happened.
    pub message: String,
    /// Name of the pass that generated this event.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(method) = &self.method {
            write!(f, " in {method}")?;
        }
        if let Some(pass) = &self.pass {
            write!(f, " ({pass})")?;
        }
        Ok(())
    }
}

/// Builder for an event; the event is recorded when the builder is dropped.
#[must_use = "the event is recorded when the builder is dropped"]
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<Arc<str>>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and location.
    pub fn at(mut self, method: impl Into<Arc<str>>, location: usize) -> Self {
        self.method = Some(method.into());
        self.location = Some(location);
        self
    }

    /// Sets the method.
    pub fn method(mut self, method: impl Into<Arc<str>>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the location.
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the message; defaults to the kind's description.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Sets the pass name.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Append-only collection of events.
///
/// Recording only needs a shared reference.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no events have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for event in other {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts the events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates over the events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Iterates over the events recorded for `method`.
    pub fn filter_method<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.method.as_deref() == Some(method))
    }

    /// Returns a copy of the log.
    #[must_use]
    pub fn take(&self) -> EventLog {
        self.clone()
    }

    /// Counts events by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns a one-line summary of the transformations recorded.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator over the events of a log.
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl Extend<Event> for EventLog {
    fn extend<T: IntoIterator<Item = Event>>(&mut self, iter: T) {
        for event in iter {
            self.events.push(event);
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        log.record(EventKind::BlockEliminated)
            .at("f", 3)
            .pass("compact 1");
        assert_eq!(log.len(), 1);
        let event = log.iter().next().expect("event");
        assert_eq!(event.message, "block eliminated");
        assert_eq!(event.location, Some(3));
        assert_eq!(event.to_string(), "[block eliminated] block eliminated in f (compact 1)");
    }

    #[test]
    fn test_merge_and_filters() {
        let a = EventLog::new();
        a.record(EventKind::PhiInserted).method("f");
        let b = EventLog::new();
        b.record(EventKind::PhiInserted).method("g");
        b.warn("odd");
        a.merge(&b);
        assert_eq!(a.count_kind(EventKind::PhiInserted), 2);
        assert_eq!(a.filter_method("g").count(), 1);
        assert!(a.has(EventKind::Warning));
        assert_eq!(a.take().len(), 3);
    }

    #[test]
    fn test_summary() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");
        log.info("started");
        assert_eq!(log.summary(), "1 events");
        log.record(EventKind::StatementEliminated);
        log.record(EventKind::StatementEliminated);
        log.record(EventKind::CalleeInlined);
        assert_eq!(log.summary(), "1 callee inlined, 2 statement eliminated");
    }
}

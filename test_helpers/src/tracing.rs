//! Capture of tracing events for assertions on log output.
use std::{collections::BTreeMap, fmt, sync::Arc};

use observability_deps::tracing::{
    field::{Field, Visit},
    span::{Attributes, Id, Record},
    subscriber::{self, DefaultGuard, NoSubscriber, Subscriber},
    Dispatch, Event, Level, Metadata,
};
use parking_lot::Mutex;

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Event target, usually the module path.
    pub target: String,
    /// Recorded fields, including `message`.
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// The `message` field, if recorded.
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").map(String::as_str)
    }
}

type SharedEvents = Arc<Mutex<Vec<CapturedEvent>>>;

/// Captures every event emitted on the current thread while it is alive.
///
/// The capture is installed as the thread default subscriber on creation and
/// uninstalled when dropped.
#[derive(Debug)]
pub struct TracingCapture {
    events: SharedEvents,
    _guard: DefaultGuard,
    /// See <https://github.com/tokio-rs/tracing/issues/2874>.
    _dont_drop_me: Dispatch,
}

impl TracingCapture {
    /// Starts capturing on the current thread.
    #[expect(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        let dont_drop_me = Dispatch::new(NoSubscriber::new());
        let events = SharedEvents::default();
        let guard = subscriber::set_default(CaptureSubscriber {
            events: Arc::clone(&events),
        });
        Self {
            events,
            _guard: guard,
            _dont_drop_me: dont_drop_me,
        }
    }

    /// Events captured so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Events captured at `level`.
    pub fn events_at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == level)
            .cloned()
            .collect()
    }
}

impl fmt::Display for TracingCapture {
    /// One line per event: `level = ...; field = value; ...`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, event) in self.events.lock().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "level = {}; ", event.level)?;
            for (k, v) in &event.fields {
                write!(f, "{k} = {v}; ")?;
            }
        }
        Ok(())
    }
}

struct CaptureSubscriber {
    events: SharedEvents,
}

impl Subscriber for CaptureSubscriber {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            fields: visitor.fields,
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

#[derive(Default)]
struct FieldVisitor {
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_owned(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_owned(), value.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use observability_deps::tracing::{debug, warn};

    #[test]
    fn test_capture() {
        let capture = TracingCapture::new();
        debug!(answer = 42, "first");
        warn!(name = "x", "second");

        let events = capture.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message(), Some("first"));
        assert_eq!(events[0].fields["answer"], "42");

        let warnings = capture.events_at(Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].fields["name"], "x");

        assert_eq!(
            capture.to_string(),
            "level = DEBUG; answer = 42; message = first; \nlevel = WARN; message = second; name = x; "
        );
    }
}

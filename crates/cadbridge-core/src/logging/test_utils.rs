//! In-memory log capture for assertions.
//!
//! [`capture_logs`] installs a thread-local subscriber that records every
//! event with its level, message, and fields rendered as strings.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level.
    pub level: Level,
    /// Message text.
    pub message: String,
    /// Other fields, `Display`-formatted where possible.
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// A recorded field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Handle on the events recorded so far. Also the capturing layer.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedLogs {
    /// Snapshot of all events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().clone()
    }

    /// First event at `level` whose message contains `needle`.
    pub fn find(&self, level: Level, needle: &str) -> Option<CapturedEvent> {
        self.0
            .lock()
            .iter()
            .find(|e| e.level == level && e.message.contains(needle))
            .cloned()
    }

    /// Whether an event at `level` mentions `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.find(level, needle).is_some()
    }
}

#[derive(Default)]
struct Recorder {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Recorder {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            let _ = self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for Recorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = Recorder::default();
        event.record(&mut recorder);
        self.0.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: recorder.message,
            fields: recorder.fields,
        });
    }
}

/// Capture every event emitted on this thread until the guard drops.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry().with(logs.clone()).set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_message_and_fields() {
        let (logs, _guard) = capture_logs();
        tracing::warn!(alias = "move", kept = "element.move_element", "name collision");
        let event = logs.find(Level::WARN, "collision").unwrap();
        assert_eq!(event.field("kept"), Some("element.move_element"));
        assert!(!logs.has_event(Level::ERROR, "collision"));
    }

    #[test]
    fn display_fields_are_unquoted() {
        let (logs, _guard) = capture_logs();
        let code = "OK";
        tracing::info!(code = %code, elapsed_ms = 3_u64, "request completed");
        let event = logs.find(Level::INFO, "completed").unwrap();
        assert_eq!(event.field("code"), Some("OK"));
        assert_eq!(event.field("elapsed_ms"), Some("3"));
    }

    #[test]
    fn capture_ends_with_guard() {
        let (logs, guard) = capture_logs();
        tracing::debug!("inside");
        drop(guard);
        tracing::debug!("outside");
        assert_eq!(logs.events().len(), 1);
    }
}

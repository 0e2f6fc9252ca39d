//! Recording [`ConnectionHandler`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::runtime::connection::{ConnectionHandle, ConnectionHandler};

/// Records every message and fresh connect. Clones share the same record.
///
/// With a greeting set, the greeting is sent on every fresh connect, the
/// way real callers resubscribe.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    messages: Arc<Mutex<Vec<Value>>>,
    fresh_connects: Arc<AtomicUsize>,
    greeting: Option<String>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().clone()
    }

    pub fn fresh_connect_count(&self) -> usize {
        self.fresh_connects.load(Ordering::SeqCst)
    }
}

impl ConnectionHandler for RecordingHandler {
    type Message = Value;

    fn on_message(&self, message: Value, _connection: &ConnectionHandle) {
        self.messages.lock().push(message);
    }

    fn on_fresh_connect(&self, connection: &ConnectionHandle) {
        self.fresh_connects.fetch_add(1, Ordering::SeqCst);
        if let Some(greeting) = &self.greeting {
            connection
                .send(greeting.as_str())
                .expect("connection is open during on_fresh_connect");
        }
    }
}

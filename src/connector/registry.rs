//! Topic registry
//!
//! Maps each topic to the ordered list of handlers registered for it. A topic
//! key exists only while it has at least one handler, so the set of keys is
//! exactly the set of transport subscriptions the connector must hold. The
//! registry itself performs no I/O: `register` and `deregister` report the
//! 0→1 and 1→0 transitions and the caller acts on them.
//!
//! Callers must synchronize access (the connector keeps it behind a mutex).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::connector::envelope::Envelope;

/// A message handler. Identity is the `Arc` allocation, so keep a clone of
/// the handler to unsubscribe it later.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Wraps a closure as a `Handler`.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Result of removing a handler from a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    NotRegistered,
    Removed,
    /// The topic has no handlers left.
    LastRemoved,
}

#[derive(Default)]
pub struct TopicRegistry {
    topics: HashMap<String, Vec<Handler>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to `topic`. Returns true when this is the topic's
    /// first handler.
    pub fn register(&mut self, topic: &str, handler: Handler) -> bool {
        let handlers = self.topics.entry(topic.to_string()).or_default();
        handlers.push(handler);
        handlers.len() == 1
    }

    /// Removes the most recent registration of `handler` from `topic`.
    pub fn deregister(&mut self, topic: &str, handler: &Handler) -> Removal {
        let Some(handlers) = self.topics.get_mut(topic) else {
            return Removal::NotRegistered;
        };
        let Some(pos) = handlers.iter().rposition(|h| Arc::ptr_eq(h, handler)) else {
            return Removal::NotRegistered;
        };

        handlers.remove(pos);
        if handlers.is_empty() {
            self.topics.remove(topic);
            Removal::LastRemoved
        } else {
            Removal::Removed
        }
    }

    /// Snapshot of the handlers for `topic`, in registration order.
    pub fn handlers(&self, topic: &str) -> Vec<Handler> {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    pub fn contains(&self, topic: &str, handler: &Handler) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|handlers| handlers.iter().any(|h| Arc::ptr_eq(h, handler)))
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Drops every registration and returns the topics that had handlers.
    pub fn clear(&mut self) -> Vec<String> {
        self.topics.drain().map(|(topic, _)| topic).collect()
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (topic, handlers) in &self.topics {
            map.entry(topic, &handlers.len());
        }
        map.finish()
    }
}

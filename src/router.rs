//! Topic → handler demultiplexing.
//!
//! Handlers are invoked while the router's read lock is held and
//! [`TopicRouter::clear`] takes the write lock, so once `clear` returns no
//! handler registered before it will run again. Frames routed afterwards find
//! no handlers and are discarded, which is also what happens to frames for
//! topics nobody registered.
//!
//! Handlers must not call back into the router.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::trace;

/// Callback invoked with the raw body of every frame on its topic.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, topic: &str, body: &str);
}

impl<F> FrameHandler for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn handle(&self, topic: &str, body: &str) {
        self(topic, body)
    }
}

/// Identifies one registration, for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    handler: Box<dyn FrameHandler>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    topics: HashMap<String, Vec<Registration>>,
}

/// Maps topic names to handlers.
#[derive(Default)]
pub struct TopicRouter {
    inner: RwLock<Inner>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Handlers on one topic run in
    /// registration order.
    pub fn register(&self, topic: impl Into<String>, handler: impl FrameHandler + 'static) -> HandlerId {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner
            .topics
            .entry(topic.into())
            .or_default()
            .push(Registration {
                id,
                handler: Box::new(handler),
            });
        id
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        inner.topics.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|registration| registration.id != id);
            removed |= registrations.len() != before;
            !registrations.is_empty()
        });
        removed
    }

    /// Remove every handler for `topic`.
    pub fn remove_topic(&self, topic: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .remove(topic);
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .clear();
    }

    /// Deliver `body` to every handler of `topic`. Returns how many ran.
    pub fn route(&self, topic: &str, body: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let Some(registrations) = inner.topics.get(topic) else {
            trace!(topic, "no handler registered, discarding frame");
            return 0;
        };
        for registration in registrations {
            registration.handler.handle(topic, body);
        }
        registrations.len()
    }

    /// Topics with at least one handler.
    pub fn topics(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("topics", &self.topics())
            .finish()
    }
}

//! Per-object, topic-based publish/subscribe event bus.
//!
//! An [`Eventer`] owns a set of named topics. Every subscriber owns exactly
//! one bounded [`tokio::sync::mpsc`] channel, and [`Eventer::publish`] fans a
//! value out to every channel with `try_send`:
//!
//! * the publisher never blocks;
//! * when a subscriber's buffer is full the **newest** value is dropped for
//!   that subscriber, so a capacity-1 subscription keeps the first unread
//!   sample until it is drained;
//! * within one subscription values arrive in publish order.
//!
//! Publishing only takes read locks (topic map, then the topic's subscriber
//! list), so concurrent publishers never block each other. Subscribe and
//! unsubscribe take the subscriber list's write lock.
//!
//! | Operation | Unknown topic |
//! |---|---|
//! | [`Eventer::publish`] | silent no-op |
//! | [`Eventer::subscribe`] | [`BotError::NoSuchTopic`] |
//! | [`Eventer::add_event`] while frozen | [`ConfigError::Frozen`] |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use botkit_types::{BotError, ConfigError, Event, Value};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Buffer size of a plain [`Eventer::subscribe`] ("latest sample" streams).
pub const DEFAULT_CAPACITY: usize = 1;

/// Buffer size used by the tasks behind [`Eventer::on`] and [`Eventer::once`].
pub const LISTENER_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Topic
// ─────────────────────────────────────────────────────────────────────────────

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

struct Topic {
    name: String,
    // `None` once the topic has been deleted.
    subscribers: RwLock<Option<Vec<Subscriber>>>,
}

impl Topic {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: RwLock::new(Some(Vec::new())),
        }
    }

    fn attach(&self, sub: Subscriber) -> bool {
        match self.subscribers.write().as_mut() {
            Some(list) => {
                list.push(sub);
                true
            }
            None => false,
        }
    }

    fn publish(&self, event: &Event) -> usize {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        for sub in subscribers.iter().flatten() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(topic = %self.name, subscriber = sub.id, "subscriber full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    fn remove(&self, id: u64) {
        if let Some(list) = self.subscribers.write().as_mut() {
            list.retain(|sub| sub.id != id);
        }
    }

    /// Drop every sender so receivers observe end-of-stream.
    fn close(&self) {
        self.subscribers.write().take();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Eventer
// ─────────────────────────────────────────────────────────────────────────────

struct Inner {
    topics: RwLock<BTreeMap<String, Arc<Topic>>>,
    frozen: AtomicBool,
    next_id: AtomicU64,
}

/// A set of named topics belonging to one object (robot, device, master…).
///
/// Clone it cheaply: all clones share the same topics.
#[derive(Clone)]
pub struct Eventer {
    inner: Arc<Inner>,
}

impl Default for Eventer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Eventer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eventer")
            .field("events", &self.events())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Eventer {
    /// Empty bus, not frozen.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: RwLock::new(BTreeMap::new()),
                frozen: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Declare the topic `name`. Declaring an existing topic is a no-op.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Frozen`] while the owner is running.
    pub fn add_event(&self, name: &str) -> Result<(), ConfigError> {
        if self.is_frozen() {
            return Err(ConfigError::Frozen {
                what: format!("event registry (adding '{name}')"),
            });
        }
        self.inner
            .topics
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(name)));
        Ok(())
    }

    /// Remove the topic `name`. Its subscriptions see end-of-stream once
    /// they have drained what was already buffered.
    pub fn delete_event(&self, name: &str) {
        let removed = self.inner.topics.write().remove(name);
        if let Some(topic) = removed {
            topic.close();
            debug!(topic = %name, "topic deleted");
        }
    }

    /// Names of every declared topic, sorted.
    pub fn events(&self) -> Vec<String> {
        self.inner.topics.read().keys().cloned().collect()
    }

    /// Whether `name` is a declared topic.
    pub fn has_event(&self, name: &str) -> bool {
        self.inner.topics.read().contains_key(name)
    }

    /// Fan `data` out to every current subscriber of `name`.
    ///
    /// Returns how many subscribers accepted the value. Publishing to an
    /// unknown or deleted topic returns 0.
    pub fn publish(&self, name: &str, data: Value) -> usize {
        let topic = self.inner.topics.read().get(name).cloned();
        match topic {
            Some(topic) => topic.publish(&Event::new(name, data)),
            None => {
                trace!(topic = %name, "publish to unknown topic ignored");
                0
            }
        }
    }

    /// Subscribe to `name` with [`DEFAULT_CAPACITY`].
    pub fn subscribe(&self, name: &str) -> Result<Subscription, BotError> {
        self.subscribe_with_capacity(name, DEFAULT_CAPACITY)
    }

    /// Subscribe to `name` with a buffer of `capacity` values (minimum 1).
    ///
    /// # Errors
    ///
    /// [`BotError::NoSuchTopic`] when `name` was never declared.
    pub fn subscribe_with_capacity(
        &self,
        name: &str,
        capacity: usize,
    ) -> Result<Subscription, BotError> {
        let topic = self
            .inner
            .topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BotError::NoSuchTopic(name.to_string()))?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if !topic.attach(Subscriber { id, tx }) {
            return Err(BotError::NoSuchTopic(name.to_string()));
        }

        Ok(Subscription {
            id,
            topic_name: name.to_string(),
            topic: Arc::downgrade(&topic),
            rx,
        })
    }

    /// Call `handler` with every value published on `name`, sequentially,
    /// from a dedicated task. The task ends when the topic is deleted or the
    /// returned [`Listener`] is cancelled.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn on<F>(&self, name: &str, handler: F) -> Result<Listener, BotError>
    where
        F: Fn(Value) + Send + 'static,
    {
        let mut sub = self.subscribe_with_capacity(name, LISTENER_CAPACITY)?;
        let task = tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                handler(event.data);
            }
        });
        Ok(Listener::new(name, task))
    }

    /// Like [`Eventer::on`] but unsubscribes after the first delivery.
    pub fn once<F>(&self, name: &str, handler: F) -> Result<Listener, BotError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let mut sub = self.subscribe_with_capacity(name, LISTENER_CAPACITY)?;
        let task = tokio::spawn(async move {
            if let Some(event) = sub.recv().await {
                sub.unsubscribe();
                handler(event.data);
            }
        });
        Ok(Listener::new(name, task))
    }

    /// Reject further [`Eventer::add_event`] calls.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    /// Accept new topics again.
    pub fn thaw(&self) {
        self.inner.frozen.store(false, Ordering::SeqCst);
    }

    /// Whether [`Eventer::add_event`] is currently rejected.
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// Receiving end of one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    topic_name: String,
    topic: Weak<Topic>,
    rx: mpsc::Receiver<Event>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic_name)
            .finish()
    }
}

impl Subscription {
    /// Topic this subscription receives from.
    pub fn topic(&self) -> &str {
        &self.topic_name
    }

    /// Wait for the next value.
    ///
    /// Returns `None` once the subscription is closed (unsubscribed or the
    /// topic was deleted) and everything buffered has been consumed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next buffered value, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Everything currently buffered, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Stop receiving new values. Values buffered before the call can still
    /// be drained. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(topic) = self.topic.upgrade() {
            topic.remove(self.id);
        }
        self.topic = Weak::new();
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to the task behind [`Eventer::on`] / [`Eventer::once`].
///
/// Dropping the handle leaves the task running; call [`Listener::cancel`]
/// to stop it.
#[derive(Debug)]
pub struct Listener {
    topic: String,
    task: JoinHandle<()>,
}

impl Listener {
    fn new(topic: &str, task: JoinHandle<()>) -> Self {
        Self {
            topic: topic.to_string(),
            task,
        }
    }

    /// Topic the handler is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Abort the task. A handler call already running finishes first.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// `true` once the task has ended: cancelled, topic deleted, or `once` fired.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

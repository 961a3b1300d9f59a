//! Named-channel pub/sub over one WebSocket per API surface.
//!
//! Each surface (controls, MFD) owns one [`Registry`] and one background
//! [`Connection`]. The registry multiplexes any number of listeners onto a
//! single server-side subscription per channel:
//!
//! ```text
//!   listener A ─┐
//!   listener B ─┼─ Registry ── {"Subscribe": name} ──► Connection task ──► socket
//!   listener C ─┘     ▲                                      │
//!                     └──────── dispatch(name, value) ◄──────┘
//! ```
//!
//! - The first listener on a channel leads to `Subscribe` if the socket is
//!   open; otherwise the channel is picked up by the subscribe burst on open.
//! - The last listener leaving leads to `Unsubscribe`; later messages for the
//!   channel are dropped.
//! - Subscription frames never sit in the outbox. The registry tracks which
//!   channels the current socket has been told about and wakes the
//!   connection task, which asks for the difference with [`Registry::sync`].
//!   A change made before a reconnect therefore cannot reach the new socket
//!   after its subscribe burst.
//! - Listeners run synchronously on the connection task in receipt order,
//!   always outside the registry lock.
//! - A terminal close latches `failed`: every later `subscribe`/`send` errors
//!   and one notification is pushed.

// Rust guideline compliant 2026-02

pub mod connection;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, Notify};

use crate::notifications::Notifications;
use crate::protocol::{encode, DisplayKind, MfdRequest, Request};

pub use connection::{Connection, ConnectionState, Surface};

/// Channel identifier on a surface.
pub trait Topic: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Wire frame subscribing to this channel.
    fn subscribe_frame(&self) -> String;
    /// Wire frame unsubscribing from this channel.
    fn unsubscribe_frame(&self) -> String;
}

impl Topic for String {
    fn subscribe_frame(&self) -> String {
        encode(&Request::Subscribe(self.clone()))
    }

    fn unsubscribe_frame(&self) -> String {
        encode(&Request::Unsubscribe(self.clone()))
    }
}

impl Topic for DisplayKind {
    fn subscribe_frame(&self) -> String {
        encode(&MfdRequest::Subscribe(*self))
    }

    fn unsubscribe_frame(&self) -> String {
        encode(&MfdRequest::Unsubscribe(*self))
    }
}

/// Errors from `subscribe`/`send` on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The socket closed for good; the transport stays failed.
    Failed,
    /// The transport was shut down by the client.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "websocket connection failed"),
            Self::Closed => write!(f, "websocket connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Inbound message that does not fit the surface protocol.
#[derive(Debug)]
pub enum ProtocolError {
    /// Text frame that is not valid JSON for the expected shape.
    Decode(serde_json::Error),
    /// Binary frame on a text-only surface.
    UnexpectedBinary,
    /// Text frame while binary frames of a batch are outstanding.
    UnexpectedText,
    /// Binary frame with no announced batch outstanding.
    UnannouncedFrame,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "invalid message: {e}"),
            Self::UnexpectedBinary => write!(f, "unexpected binary message"),
            Self::UnexpectedText => write!(f, "text message while frames are outstanding"),
            Self::UnannouncedFrame => write!(f, "frame received without announcement"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e)
    }
}

/// Callback receiving channel values. `None` means "no known state yet".
pub type Listener<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

/// Handle for one listener registration.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) removes the
/// listener; the last listener of a channel unsubscribes the channel.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Handle that runs `release` once when dropped or unsubscribed.
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

struct RegistryState<K, T> {
    listeners: HashMap<K, Vec<(u64, Listener<T>)>>,
    latest: HashMap<K, T>,
    /// Channels the current socket is subscribed to.
    synced: HashSet<K>,
    next_id: u64,
    open: bool,
    failed: bool,
    closed: bool,
}

/// Listener sets and connection flags of one surface.
pub struct Registry<K: Topic, T> {
    label: &'static str,
    replay_latest: bool,
    outbox: mpsc::UnboundedSender<String>,
    changed: Arc<Notify>,
    notifications: Notifications,
    state: Mutex<RegistryState<K, T>>,
}

impl<K: Topic, T> fmt::Debug for Registry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<K, T> Registry<K, T>
where
    K: Topic,
    T: Clone + Send + Sync + 'static,
{
    /// Create a registry whose outgoing frames go to `outbox`.
    ///
    /// With `replay_latest`, the last value of each channel is cached and
    /// handed to new listeners instead of `None`.
    pub fn new(
        label: &'static str,
        replay_latest: bool,
        outbox: mpsc::UnboundedSender<String>,
        notifications: Notifications,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            replay_latest,
            outbox,
            changed: Arc::new(Notify::new()),
            notifications,
            state: Mutex::new(RegistryState {
                listeners: HashMap::new(),
                latest: HashMap::new(),
                synced: HashSet::new(),
                next_id: 0,
                open: false,
                failed: false,
                closed: false,
            }),
        })
    }

    /// Surface name used in logs and notifications.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Add a listener for `topic`.
    ///
    /// The listener is called before this returns, with `None` or the cached
    /// latest value.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Failed`] once the socket closed for good and
    /// [`TransportError::Closed`] after shutdown.
    pub fn subscribe<F>(self: &Arc<Self>, topic: K, listener: F) -> Result<Subscription, TransportError>
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(listener);

        let (id, initial) = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            if state.failed {
                return Err(TransportError::Failed);
            }
            if state.closed {
                return Err(TransportError::Closed);
            }

            let id = state.next_id;
            state.next_id += 1;

            let first = !state.listeners.contains_key(&topic);
            state
                .listeners
                .entry(topic.clone())
                .or_default()
                .push((id, Arc::clone(&listener)));

            if first && state.open {
                self.changed.notify_one();
            }

            let initial = if self.replay_latest {
                state.latest.get(&topic).cloned()
            } else {
                None
            };
            (id, initial)
        };

        listener(initial.as_ref());

        let registry: Weak<Self> = Arc::downgrade(self);
        Ok(Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unsubscribe(&topic, id);
            }
        }))
    }

    fn unsubscribe(&self, topic: &K, id: u64) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        let Some(set) = state.listeners.get_mut(topic) else {
            return;
        };
        set.retain(|(listener_id, _)| *listener_id != id);
        if !set.is_empty() {
            return;
        }

        state.listeners.remove(topic);
        state.latest.remove(topic);
        if state.open {
            self.changed.notify_one();
        }
    }

    /// Queue a raw frame for the socket.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::subscribe`], or with [`TransportError::Closed`]
    /// when the connection task is gone.
    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        {
            let state = self.state.lock().expect("registry lock poisoned");
            if state.failed {
                return Err(TransportError::Failed);
            }
            if state.closed {
                return Err(TransportError::Closed);
            }
        }
        self.outbox.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Deliver `value` to every listener of `topic`. Returns how many ran.
    pub fn dispatch(&self, topic: &K, value: T) -> usize {
        let listeners: Vec<Listener<T>> = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            let Some(set) = state.listeners.get(topic) else {
                log::trace!("[{}] Dropping message for {:?}", self.label, topic);
                return 0;
            };
            let listeners = set.iter().map(|(_, l)| Arc::clone(l)).collect();
            if self.replay_latest {
                state.latest.insert(topic.clone(), value.clone());
            }
            listeners
        };

        for listener in &listeners {
            listener(Some(&value));
        }
        listeners.len()
    }

    /// Woken whenever [`Self::sync`] may have frames to send.
    pub fn changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changed)
    }

    /// Frames that bring the socket's subscriptions in line with the
    /// listener sets: `Unsubscribe` for channels whose last listener left,
    /// `Subscribe` for channels that gained their first. Empty while the
    /// socket is closed.
    pub fn sync(&self) -> Vec<String> {
        let mut state = self.state.lock().expect("registry lock poisoned");
        if !state.open {
            return Vec::new();
        }

        let RegistryState {
            listeners, synced, ..
        } = &mut *state;
        let mut frames = Vec::new();
        synced.retain(|topic| {
            let keep = listeners.contains_key(topic);
            if !keep {
                log::debug!("[{}] Unsubscribing from {:?}", self.label, topic);
                frames.push(topic.unsubscribe_frame());
            }
            keep
        });
        for topic in listeners.keys() {
            if synced.insert(topic.clone()) {
                log::debug!("[{}] Subscribing to {:?}", self.label, topic);
                frames.push(topic.subscribe_frame());
            }
        }
        frames
    }

    /// Socket opened: returns the subscribe burst for every active channel.
    pub fn opened(&self) -> Vec<String> {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.open = true;
        let synced: HashSet<K> = state.listeners.keys().cloned().collect();
        state.synced = synced;
        state.synced.iter().map(Topic::subscribe_frame).collect()
    }

    /// Socket lost; a reconnect may follow.
    pub fn disconnected(&self) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.open = false;
        state.synced.clear();
    }

    /// Socket closed for good. Latches `failed` and notifies the user once.
    pub fn fail(&self) {
        let newly_failed = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            state.open = false;
            state.synced.clear();
            !std::mem::replace(&mut state.failed, true)
        };
        if newly_failed {
            self.notifications
                .push(format!("{} stream closed", self.label));
        }
    }

    /// Client-initiated shutdown.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.open = false;
        state.synced.clear();
        state.closed = true;
    }

    /// Whether the transport has failed.
    pub fn is_failed(&self) -> bool {
        self.state.lock().expect("registry lock poisoned").failed
    }

    /// Whether the socket is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().expect("registry lock poisoned").open
    }

    /// Channels with at least one listener.
    pub fn topics(&self) -> Vec<K> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .listeners
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestRegistry = Registry<String, u32>;

    fn registry(replay: bool) -> (Arc<TestRegistry>, mpsc::UnboundedReceiver<String>, Notifications) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifications = Notifications::new();
        (Registry::new("Controls", replay, tx, notifications.clone()), rx, notifications)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    #[test]
    fn test_two_listeners_before_open_share_one_subscribe() {
        let (registry, mut rx, _) = registry(false);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let _a = registry
            .subscribe("GEAR".to_string(), move |v| s1.lock().unwrap().push(("a", v.copied())))
            .unwrap();
        let s2 = Arc::clone(&seen);
        let _b = registry
            .subscribe("GEAR".to_string(), move |v| s2.lock().unwrap().push(("b", v.copied())))
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![("a", None), ("b", None)]);
        assert!(registry.sync().is_empty());

        assert_eq!(registry.opened(), vec![r#"{"Subscribe":"GEAR"}"#.to_string()]);
        assert!(registry.sync().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_subscribe_while_open_sends_once() {
        let (registry, _rx, _) = registry(false);
        registry.opened();
        let changes = registry.changes();

        let _a = registry.subscribe("GEAR".to_string(), |_| {}).unwrap();
        let _b = registry.subscribe("GEAR".to_string(), |_| {}).unwrap();

        assert!(changes.notified().now_or_never().is_some());
        assert_eq!(registry.sync(), vec![r#"{"Subscribe":"GEAR"}"#.to_string()]);
        assert!(registry.sync().is_empty());
    }

    #[test]
    fn test_last_unsubscribe_sends_one_unsubscribe_and_drops_messages() {
        let (registry, _rx, _) = registry(false);
        registry.opened();

        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = Arc::clone(&hits);
        let a = registry
            .subscribe("GEAR".to_string(), move |v| {
                if v.is_some() {
                    h1.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        let b = registry.subscribe("GEAR".to_string(), |_| {}).unwrap();
        registry.sync();

        assert_eq!(registry.dispatch(&"GEAR".to_string(), 1), 2);

        a.unsubscribe();
        assert!(registry.sync().is_empty());
        drop(b);
        assert_eq!(registry.sync(), vec![r#"{"Unsubscribe":"GEAR"}"#.to_string()]);
        assert!(registry.sync().is_empty());

        assert_eq!(registry.dispatch(&"GEAR".to_string(), 2), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.topics().is_empty());
    }

    #[test]
    fn test_unsubscribe_while_closed_sends_nothing() {
        let (registry, _rx, _) = registry(false);
        let sub = registry.subscribe("GEAR".to_string(), |_| {}).unwrap();
        drop(sub);
        assert!(registry.sync().is_empty());
        assert!(registry.opened().is_empty());
        assert!(registry.sync().is_empty());
    }

    #[test]
    fn test_changes_before_reconnect_do_not_follow_the_burst() {
        let (registry, mut rx, _) = registry(false);
        registry.opened();

        // Subscribed and dropped again before the task got to sync.
        drop(registry.subscribe("GEAR".to_string(), |_| {}).unwrap());
        registry.disconnected();

        let _gear = registry.subscribe("GEAR".to_string(), |_| {}).unwrap();
        let mut wire = registry.opened();
        wire.extend(registry.sync());
        wire.extend(drain(&mut rx));

        assert_eq!(wire, vec![r#"{"Subscribe":"GEAR"}"#.to_string()]);
    }

    #[test]
    fn test_subscribe_and_drop_between_syncs_sends_nothing() {
        let (registry, _rx, _) = registry(false);
        registry.opened();

        drop(registry.subscribe("GEAR".to_string(), |_| {}).unwrap());
        assert!(registry.sync().is_empty());
    }

    #[test]
    fn test_reopen_resubscribes_every_channel() {
        let (registry, _rx, _) = registry(false);
        let _a = registry.subscribe("A".to_string(), |_| {}).unwrap();
        let _b = registry.subscribe("B".to_string(), |_| {}).unwrap();

        registry.opened();
        registry.disconnected();
        assert!(!registry.is_open());

        let mut burst = registry.opened();
        burst.sort();
        assert_eq!(burst, vec![r#"{"Subscribe":"A"}"#, r#"{"Subscribe":"B"}"#]);
    }

    #[test]
    fn test_failure_latches_and_notifies_once() {
        let (registry, _rx, notifications) = registry(false);
        registry.fail();
        registry.fail();

        assert!(registry.is_failed());
        assert_eq!(
            registry.subscribe("GEAR".to_string(), |_| {}).unwrap_err(),
            TransportError::Failed
        );
        assert_eq!(registry.send("x".into()).unwrap_err(), TransportError::Failed);

        let entries = notifications.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Controls stream closed");
    }

    #[test]
    fn test_close_rejects_without_notification() {
        let (registry, _rx, notifications) = registry(false);
        registry.close();
        assert_eq!(registry.send("x".into()).unwrap_err(), TransportError::Closed);
        assert!(notifications.entries().is_empty());
    }

    #[test]
    fn test_replay_latest_hands_cached_value_to_new_listener() {
        let (registry, _rx, _) = registry(true);
        let _a = registry.subscribe("MFD".to_string(), |_| {}).unwrap();
        registry.dispatch(&"MFD".to_string(), 7);

        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let _b = registry
            .subscribe("MFD".to_string(), move |v| *s.lock().unwrap() = v.copied())
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn test_listener_may_subscribe_reentrantly() {
        let (registry, _rx, _) = registry(false);
        let inner = Arc::new(Mutex::new(Vec::new()));

        let reg = Arc::clone(&registry);
        let keep = Arc::clone(&inner);
        let _a = registry
            .subscribe("A".to_string(), move |v| {
                if v.is_some() {
                    let sub = reg.subscribe("B".to_string(), |_| {}).unwrap();
                    keep.lock().unwrap().push(sub);
                }
            })
            .unwrap();

        registry.dispatch(&"A".to_string(), 1);
        assert_eq!(inner.lock().unwrap().len(), 1);
        assert!(registry.topics().contains(&"B".to_string()));
    }
}

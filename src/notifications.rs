//! User-visible error notifications.
//!
//! Failures that the user needs to see (a stream closing for good, a
//! rejected API call) are pushed here rather than returned to whoever
//! happened to be waiting. A UI subscribes and renders the active list;
//! the CLI logs it.
//!
//! # Example
//!
//! ```ignore
//! let notifications = Notifications::new();
//! let _sub = notifications.subscribe(|entries| {
//!     for n in entries {
//!         eprintln!("[{}] {}", n.id, n.message);
//!     }
//! });
//! notifications.push("Controls stream closed");
//! ```

// Rust guideline compliant 2026-02

use std::fmt;
use std::sync::{Arc, Mutex};

/// Identifier of an active notification.
///
/// Ids are never reused, so removing an already removed id is a no-op.
pub type NotificationId = u64;

/// One active notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Identifier used to dismiss it.
    pub id: NotificationId,
    /// Human readable message.
    pub message: String,
}

type Listener = Arc<dyn Fn(&[Notification]) + Send + Sync>;

#[derive(Default)]
struct Inner {
    active: Vec<Notification>,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Shared list of active notifications.
///
/// Cloning is cheap and every clone observes the same list.
#[derive(Clone, Default)]
pub struct Notifications {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Notifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifications")
            .field("active", &self.entries().len())
            .finish_non_exhaustive()
    }
}

/// Listener registration returned by [`Notifications::subscribe`].
///
/// The listener is removed when this is dropped.
#[must_use = "dropping the subscription removes the listener"]
pub struct NotificationSubscription {
    inner: Arc<Mutex<Inner>>,
    id: u64,
}

impl fmt::Debug for NotificationSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSubscription")
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().expect("notifications lock poisoned");
        inner.listeners.retain(|(id, _)| *id != self.id);
    }
}

impl Notifications {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the active notifications, oldest first.
    pub fn entries(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .expect("notifications lock poisoned")
            .active
            .clone()
    }

    /// Register a listener. It is called immediately with the current list
    /// and again after every change.
    pub fn subscribe<F>(&self, listener: F) -> NotificationSubscription
    where
        F: Fn(&[Notification]) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let (id, entries) = {
            let mut inner = self.inner.lock().expect("notifications lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, inner.active.clone())
        };

        listener(&entries);

        NotificationSubscription {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Add a notification and notify listeners.
    pub fn push(&self, message: impl Into<String>) -> NotificationId {
        let message = message.into();
        log::error!("{}", message);

        let id = {
            let mut inner = self.inner.lock().expect("notifications lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            inner.active.push(Notification { id, message });
            id
        };
        self.notify();
        id
    }

    /// Dismiss a notification.
    pub fn remove(&self, id: NotificationId) {
        let removed = {
            let mut inner = self.inner.lock().expect("notifications lock poisoned");
            let before = inner.active.len();
            inner.active.retain(|n| n.id != id);
            inner.active.len() != before
        };
        if removed {
            self.notify();
        }
    }

    /// Pass `result` through, pushing a notification for failures.
    ///
    /// The error is still returned so the caller can stop what it was doing.
    /// [`ApiError`](crate::api::ApiError)s read `"<kind>: <message>"`.
    pub fn surface<T, E: fmt::Display>(&self, result: Result<T, E>) -> Result<T, E> {
        if let Err(ref e) = result {
            self.push(e.to_string());
        }
        result
    }

    fn notify(&self) {
        let (entries, listeners): (Vec<Notification>, Vec<Listener>) = {
            let inner = self.inner.lock().expect("notifications lock poisoned");
            (
                inner.active.clone(),
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            )
        };
        for listener in listeners {
            listener(&entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiErrorKind};

    #[test]
    fn test_push_and_remove() {
        let notifications = Notifications::new();
        let a = notifications.push("Controls stream closed");
        let b = notifications.push("Mfds stream closed");
        assert_ne!(a, b);
        assert_eq!(notifications.entries().len(), 2);

        notifications.remove(a);
        let entries = notifications.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Mfds stream closed");

        // removing twice is harmless because ids are not reused
        notifications.remove(a);
        assert_eq!(notifications.entries().len(), 1);
    }

    #[test]
    fn test_subscribe_receives_current_and_updates() {
        let notifications = Notifications::new();
        notifications.push("first");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sub = notifications.subscribe(move |entries| {
            seen_clone.lock().unwrap().push(entries.len());
        });

        notifications.push("second");
        drop(sub);
        notifications.push("third");

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_surface_pushes_api_errors() {
        let notifications = Notifications::new();
        let ok: Result<u8, ApiError> = Ok(1);
        assert!(notifications.surface(ok).is_ok());
        assert!(notifications.entries().is_empty());

        let err: Result<u8, ApiError> = Err(ApiError::new(ApiErrorKind::Request, "bad sdp"));
        assert!(notifications.surface(err).is_err());
        assert_eq!(notifications.entries()[0].message, "Request: bad sdp");
    }
}

//! Switch controllers: typed state machines over control channels.
//!
//! A controller subscribes to one or more channels on a [`ControlsClient`],
//! reduces every response to a typed position and keeps the result in a
//! [`StateCell`]. Actions follow one pattern:
//!
//! 1. register a wait for the target position,
//! 2. send the activating input,
//! 3. await the target position,
//! 4. send the rest input (momentary controls only).
//!
//! Registering before sending means a fast echo from the backend cannot slip
//! past the wait.

// Rust guideline compliant 2026-02

pub mod five_way;
pub mod push_button;
pub mod three_way;

pub use five_way::{Axis, FiveWay, FiveWaySwitch};
pub use push_button::{ButtonState, PushButton};
pub use three_way::{Push3WayButton, ThreeWay, Toggle3WaySwitch};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::controls::ControlsClient;
use crate::protocol::Input;
use crate::pubsub::{Subscription, TransportError};

/// Typed position of a control.
pub trait Position: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Position for a raw channel value, `None` for values outside the range.
    fn from_raw(raw: i16) -> Option<Self>;

    /// Raw channel value of this position.
    fn raw(self) -> i16;
}

/// A state wait ended without the target being reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The controller was destroyed.
    Closed,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "controller destroyed while waiting"),
        }
    }
}

impl std::error::Error for WaitError {}

/// Failure of a controller action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    /// An input could not be sent.
    Transport(TransportError),
    /// The target position was never confirmed.
    Wait(WaitError),
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "switch input failed: {e}"),
            Self::Wait(e) => write!(f, "switch wait failed: {e}"),
        }
    }
}

impl std::error::Error for SwitchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Wait(e) => Some(e),
        }
    }
}

impl From<TransportError> for SwitchError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<WaitError> for SwitchError {
    fn from(e: WaitError) -> Self {
        Self::Wait(e)
    }
}

type StateListener<S> = Arc<dyn Fn(Option<S>) + Send + Sync>;

struct Waiter<S> {
    id: u64,
    target: S,
    tx: oneshot::Sender<()>,
}

struct CellInner<S> {
    state: Option<S>,
    listeners: Vec<(u64, StateListener<S>)>,
    waiters: Vec<Waiter<S>>,
    next_id: u64,
    closed: bool,
}

/// Current position of a controller, its listeners and pending waits.
pub struct StateCell<S> {
    inner: Mutex<CellInner<S>>,
}

impl<S> fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell").finish_non_exhaustive()
    }
}

impl<S: Position> StateCell<S> {
    /// Cell in the unknown state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CellInner {
                state: None,
                listeners: Vec::new(),
                waiters: Vec::new(),
                next_id: 0,
                closed: false,
            }),
        })
    }

    /// Current position, `None` until the first update.
    pub fn get(&self) -> Option<S> {
        self.inner.lock().expect("state lock poisoned").state
    }

    /// Apply an inbound update.
    ///
    /// `Some` replaces the position, `None` keeps it. Either way every
    /// listener sees the resulting position and every wait whose target
    /// matches it resolves.
    pub fn update(&self, next: Option<S>) {
        let (state, listeners, fired) = {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            if inner.closed {
                return;
            }
            if next.is_some() {
                inner.state = next;
            }
            let state = inner.state;
            let listeners: Vec<StateListener<S>> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();

            let mut fired = Vec::new();
            if let Some(current) = state {
                let (hit, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.waiters)
                    .into_iter()
                    .partition(|w| w.target == current);
                inner.waiters = keep;
                fired = hit;
            }
            (state, listeners, fired)
        };

        for listener in &listeners {
            listener(state);
        }
        for waiter in fired {
            let _ = waiter.tx.send(());
        }
    }

    /// Add a listener. It is called with the current position before this
    /// returns.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(Option<S>) + Send + Sync + 'static,
    {
        let listener: StateListener<S> = Arc::new(listener);
        let (id, state) = {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            if !inner.closed {
                inner.listeners.push((id, Arc::clone(&listener)));
            }
            (id, inner.state)
        };

        listener(state);

        let cell = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(cell) = cell.upgrade() {
                cell.inner
                    .lock()
                    .expect("state lock poisoned")
                    .listeners
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    /// Wait for the next update that leaves the cell at `target`.
    ///
    /// The current position does not count, only updates delivered after
    /// this call.
    pub fn wait_for(self: &Arc<Self>, target: S) -> StateWait<S> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("state lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        // On a closed cell the sender drops here and the wait ends Closed.
        if !inner.closed {
            inner.waiters.push(Waiter { id, target, tx });
        }
        StateWait {
            cell: Arc::downgrade(self),
            id,
            rx,
            finished: false,
        }
    }

    /// Number of waits still registered.
    pub fn pending_waits(&self) -> usize {
        self.inner.lock().expect("state lock poisoned").waiters.len()
    }

    /// Whether [`Self::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("state lock poisoned").closed
    }

    /// Drop every listener and end every wait with [`WaitError::Closed`].
    pub fn close(&self) {
        let (listeners, waiters) = {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            inner.closed = true;
            (
                std::mem::take(&mut inner.listeners),
                std::mem::take(&mut inner.waiters),
            )
        };
        drop(listeners);
        drop(waiters);
    }

    fn cancel_wait(&self, id: u64) {
        self.inner
            .lock()
            .expect("state lock poisoned")
            .waiters
            .retain(|w| w.id != id);
    }
}

/// Pending wait for a position. Dropping it deregisters the wait.
#[must_use = "a wait does nothing unless awaited"]
pub struct StateWait<S: Position> {
    cell: Weak<StateCell<S>>,
    id: u64,
    rx: oneshot::Receiver<()>,
    finished: bool,
}

impl<S: Position> StateWait<S> {
    /// Give up on the wait.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<S: Position> fmt::Debug for StateWait<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateWait")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<S: Position> Future for StateWait<S> {
    type Output = Result<(), WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.finished = true;
                Poll::Ready(result.map_err(|_| WaitError::Closed))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: Position> Drop for StateWait<S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(cell) = self.cell.upgrade() {
            cell.cancel_wait(self.id);
        }
    }
}

/// Channel subscriptions and state shared by every controller.
#[derive(Debug)]
pub struct SwitchCore<S: Position> {
    controls: ControlsClient,
    cell: Arc<StateCell<S>>,
    channels: Mutex<Vec<Subscription>>,
}

impl<S: Position> SwitchCore<S> {
    pub(crate) fn new(controls: ControlsClient) -> Self {
        Self {
            controls,
            cell: StateCell::new(),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to `channel`, handing every integer reading to `on_raw`.
    pub(crate) fn watch<F>(&self, channel: &str, on_raw: F) -> Result<(), TransportError>
    where
        F: Fn(&StateCell<S>, i16) + Send + Sync + 'static,
    {
        let cell = Arc::clone(&self.cell);
        let name = channel.to_string();
        let subscription = self.controls.subscribe(channel, move |response| {
            let Some(response) = response else {
                return;
            };
            match response.integer() {
                Some(raw) => on_raw(&cell, raw),
                None => log::debug!("[Switch] {} response without integer output", name),
            }
        })?;
        self.channels
            .lock()
            .expect("switch lock poisoned")
            .push(subscription);
        Ok(())
    }

    /// Subscribe to `channel` as a plain positional control.
    pub(crate) fn watch_position(&self, channel: &str) -> Result<(), TransportError> {
        let name = channel.to_string();
        self.watch(channel, move |cell, raw| match S::from_raw(raw) {
            Some(position) => cell.update(Some(position)),
            None => log::debug!("[Switch] {} ignoring unknown value {}", name, raw),
        })
    }

    /// Register a wait for `target`, send `active`, await the target, then
    /// send `rest` if given.
    pub(crate) async fn actuate(
        &self,
        channel: &str,
        active: i16,
        target: S,
        rest: Option<i16>,
    ) -> Result<(), SwitchError> {
        if self.cell.is_closed() {
            return Err(WaitError::Closed.into());
        }
        let wait = self.cell.wait_for(target);
        self.controls.send(Input::integer(channel, active))?;
        wait.await?;
        if let Some(rest) = rest {
            self.controls.send(Input::integer(channel, rest))?;
        }
        Ok(())
    }

    /// Current position.
    pub fn state(&self) -> Option<S> {
        self.cell.get()
    }

    /// State cell backing this controller.
    pub fn cell(&self) -> &Arc<StateCell<S>> {
        &self.cell
    }

    /// Release every channel and end pending waits.
    pub fn destroy(&self) {
        let channels = std::mem::take(&mut *self.channels.lock().expect("switch lock poisoned"));
        drop(channels);
        self.cell.close();
    }
}

impl<S: Position> Drop for SwitchCore<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Operations common to every controller.
pub trait Switch {
    /// Typed position of the controller.
    type State: Position;

    /// Shared controller core.
    fn core(&self) -> &SwitchCore<Self::State>;

    /// Current position, `None` while unknown.
    fn state(&self) -> Option<Self::State> {
        self.core().state()
    }

    /// Listen to every update. The listener is called with the current
    /// position before this returns.
    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<Self::State>) + Send + Sync + 'static,
    {
        self.core().cell().subscribe(listener)
    }

    /// Wait until an update leaves the controller at `target`.
    fn on_change(&self, target: Self::State) -> StateWait<Self::State> {
        self.core().cell().wait_for(target)
    }

    /// Release all channel subscriptions. Pending waits end with
    /// [`WaitError::Closed`] and later actions fail.
    fn destroy(&self) {
        self.core().destroy();
    }
}

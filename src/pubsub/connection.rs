//! Background WebSocket task for one API surface.
//!
//! The task owns the socket. It sends the surface's subscribe burst after
//! every (re)connect, sends subscription changes as the surface reports
//! them, forwards queued outgoing frames, answers pings and
//! hands every data frame to the [`Surface`], which dispatches it to
//! listeners before the next frame is read.
//!
//! # Closing
//!
//! With the default [`ReconnectPolicy`] the first close is terminal: the
//! surface is told it failed and the task exits. With reconnect attempts
//! configured the task backs off exponentially and re-subscribes after each
//! reconnect; only when the attempts run out does the surface fail.
//!
//! A [`ProtocolError`] from the surface is always terminal.
//!
//! On shutdown, frames already queued are written before the close frame.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;

use super::ProtocolError;
use crate::config::ReconnectPolicy;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Protocol side of a surface, driven by the connection task.
///
/// Implementations can also be driven by hand, e.g. from a different
/// WebSocket implementation or from tests.
pub trait Surface: Send + Sync + 'static {
    /// Name for logs (`Controls`, `Mfds`).
    fn label(&self) -> &'static str;

    /// The socket opened. Returns the frames to send first.
    fn opened(&self) -> Vec<String>;

    /// Woken when [`Surface::sync`] may have frames to send.
    fn changes(&self) -> Arc<Notify>;

    /// Subscription changes since the last open or sync.
    fn sync(&self) -> Vec<String>;

    /// A text or binary frame arrived. Returns frames to send in reply.
    fn received(&self, message: WsMessage) -> Result<Vec<String>, ProtocolError>;

    /// The socket closed and a reconnect may follow.
    fn disconnected(&self);

    /// The socket closed for good.
    fn failed(&self, reason: &str);

    /// The client shut the transport down.
    fn shut_down(&self);
}

/// Connection state observable from outside the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the socket.
    Connecting,
    /// Socket open, subscriptions sent.
    Connected,
    /// Waiting before the next attempt.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Milliseconds until the attempt.
        next_retry_ms: u64,
    },
    /// Closed for good.
    Failed(String),
    /// Shut down by the client.
    Closed,
}

impl ConnectionState {
    /// Whether the task has exited.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Closed)
    }
}

/// Handle to a running connection task. Dropping it shuts the task down.
#[derive(Debug)]
pub struct Connection {
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
}

impl Connection {
    /// Spawn the connection task for `surface`.
    ///
    /// `outbox` carries frames queued by the surface's registry. Must be
    /// called from within a tokio runtime.
    pub fn spawn<S: Surface>(
        url: String,
        surface: Arc<S>,
        outbox: mpsc::UnboundedReceiver<String>,
        policy: ReconnectPolicy,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);

        tokio::spawn(run_connection_loop(
            url,
            surface,
            outbox,
            policy,
            state_tx,
            cancel.clone(),
        ));

        Self { cancel, state }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receiver for state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the socket and stop the task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum LoopExit {
    Shutdown,
    Disconnected(String),
    Fatal(String),
}

async fn run_connection_loop<S: Surface>(
    url: String,
    surface: Arc<S>,
    mut outbox: mpsc::UnboundedReceiver<String>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    let label = surface.label();
    let mut attempt: u32 = 0;

    loop {
        state.send_replace(ConnectionState::Connecting);
        log::info!("[{}] Connecting to {}", label, url);

        let connected = tokio::select! {
            result = ws::connect(&url) => result,
            () = cancel.cancelled() => {
                surface.shut_down();
                state.send_replace(ConnectionState::Closed);
                return;
            }
        };

        let reason = match connected {
            Ok((mut writer, mut reader)) => {
                log::info!("[{}] WebSocket connected", label);
                attempt = 0;
                state.send_replace(ConnectionState::Connected);

                let exit = match send_all(&mut writer, surface.opened()).await {
                    Ok(()) => {
                        run_message_loop(&*surface, &mut writer, &mut reader, &mut outbox, &cancel)
                            .await
                    }
                    Err(e) => LoopExit::Disconnected(format!("{e:#}")),
                };

                match exit {
                    LoopExit::Shutdown => {
                        log::info!("[{}] Shutdown requested, closing connection", label);
                        while let Ok(frame) = outbox.try_recv() {
                            if writer.send_text(&frame).await.is_err() {
                                break;
                            }
                        }
                        let _ = writer.close().await;
                        surface.shut_down();
                        state.send_replace(ConnectionState::Closed);
                        return;
                    }
                    LoopExit::Fatal(reason) => {
                        log::error!("[{}] Protocol error: {}", label, reason);
                        let _ = writer.close().await;
                        surface.failed(&reason);
                        state.send_replace(ConnectionState::Failed(reason));
                        return;
                    }
                    LoopExit::Disconnected(reason) => reason,
                }
            }
            Err(e) => format!("{e:#}"),
        };

        surface.disconnected();

        let Some(delay) = policy.delay_for(attempt) else {
            log::warn!("[{}] Stream closed: {}", label, reason);
            surface.failed(&reason);
            state.send_replace(ConnectionState::Failed(reason));
            return;
        };

        attempt += 1;
        let next_retry_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "[{}] Disconnected ({}), reconnecting in {}ms (attempt {}/{})",
            label,
            reason,
            next_retry_ms,
            attempt,
            policy.max_attempts
        );
        state.send_replace(ConnectionState::Reconnecting {
            attempt,
            next_retry_ms,
        });

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => {
                surface.shut_down();
                state.send_replace(ConnectionState::Closed);
                return;
            }
        }
    }
}

async fn send_all(writer: &mut WsWriter, frames: Vec<String>) -> anyhow::Result<()> {
    for frame in frames {
        writer.send_text(&frame).await?;
    }
    Ok(())
}

async fn run_message_loop<S: Surface>(
    surface: &S,
    writer: &mut WsWriter,
    reader: &mut WsReader,
    outbox: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> LoopExit {
    let changes = surface.changes();
    loop {
        tokio::select! {
            () = cancel.cancelled() => return LoopExit::Shutdown,

            msg = reader.recv() => match msg {
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = writer.send_pong(data).await {
                        return LoopExit::Disconnected(format!("{e:#}"));
                    }
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    return LoopExit::Disconnected(format!("closed by server ({code} {reason})"));
                }
                Some(Ok(message)) => match surface.received(message) {
                    Ok(replies) => {
                        if let Err(e) = send_all(writer, replies).await {
                            return LoopExit::Disconnected(format!("{e:#}"));
                        }
                    }
                    Err(e) => return LoopExit::Fatal(e.to_string()),
                },
                Some(Err(e)) => return LoopExit::Disconnected(format!("{e:#}")),
                None => return LoopExit::Disconnected("stream ended".to_string()),
            },

            () = changes.notified() => {
                if let Err(e) = send_all(writer, surface.sync()).await {
                    return LoopExit::Disconnected(format!("{e:#}"));
                }
            }

            Some(frame) = outbox.recv() => {
                log::trace!("[{}] -> {}", surface.label(), frame);
                if let Err(e) = writer.send_text(&frame).await {
                    return LoopExit::Disconnected(format!("{e:#}"));
                }
            }
        }
    }
}

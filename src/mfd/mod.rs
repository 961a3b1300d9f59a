//! MFD frame streaming.
//!
//! Two ways to get display frames from the backend:
//!
//! - [`MfdClient`]: JPEG frames over the `/api/mfds` WebSocket, batched and
//!   acknowledged (see [`batch`]).
//! - [`webrtc`]: a receive-only WebRTC video stream negotiated through
//!   `POST /api/mfd`.

// Rust guideline compliant 2026-02

pub mod batch;
pub mod webrtc;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, watch, Notify};

use crate::api;
use crate::config::PanelConfig;
use crate::notifications::Notifications;
use crate::protocol::{encode, DisplayKind, MfdRequest};
use crate::pubsub::{
    Connection, ConnectionState, ProtocolError, Registry, Subscription, Surface, TransportError,
};
use crate::ws::WsMessage;

use batch::FrameBatch;

/// Route of the MFD frame stream below `/api`.
pub const MFDS_PATH: &str = "/mfds";

/// One JPEG frame of a display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Display the frame belongs to.
    pub kind: DisplayKind,
    /// JPEG data.
    pub jpeg: Bytes,
}

/// Handle to the MFD frame socket. Cheap to clone.
///
/// New listeners receive the latest frame of their display, if one has been
/// seen since the display was subscribed.
#[derive(Debug, Clone)]
pub struct MfdClient {
    registry: Arc<Registry<DisplayKind, Frame>>,
    connection: Option<Arc<Connection>>,
}

impl MfdClient {
    /// Open the MFD socket for the configured backend.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured host does not form a valid URL.
    pub fn connect(config: &PanelConfig, notifications: Notifications) -> anyhow::Result<Self> {
        let url = api::ws_url(config, MFDS_PATH)?;
        let (mut client, outbox) = Self::detached(notifications);
        let connection = Connection::spawn(url, Arc::new(client.surface()), outbox, config.reconnect);
        client.connection = Some(Arc::new(connection));
        Ok(client)
    }

    /// Client without a socket. Outgoing frames are returned through the
    /// receiver and inbound frames are fed through [`Self::surface`].
    pub fn detached(notifications: Notifications) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            registry: Registry::new("Mfds", true, tx, notifications),
            connection: None,
        };
        (client, rx)
    }

    /// Listen to the frames of a display.
    ///
    /// `listener` is called with the latest frame (or `None`) before this
    /// returns.
    pub fn subscribe<F>(&self, kind: DisplayKind, listener: F) -> Result<Subscription, TransportError>
    where
        F: Fn(Option<&Frame>) + Send + Sync + 'static,
    {
        self.registry.subscribe(kind, listener)
    }

    /// Protocol side of this client. Each call starts with a fresh batch,
    /// so use one surface per socket.
    pub fn surface(&self) -> MfdSurface {
        MfdSurface {
            registry: Arc::clone(&self.registry),
            batch: Mutex::new(FrameBatch::new()),
        }
    }

    /// Whether the socket closed for good.
    pub fn is_failed(&self) -> bool {
        self.registry.is_failed()
    }

    /// Connection state receiver, `None` for detached clients.
    pub fn connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.connection.as_ref().map(|c| c.watch())
    }

    /// Close the socket. Every clone stops working.
    pub fn shutdown(&self) {
        match &self.connection {
            Some(connection) => connection.shutdown(),
            None => self.registry.close(),
        }
    }
}

/// MFD protocol: announcements, binary frames, one acknowledgement per batch.
#[derive(Debug)]
pub struct MfdSurface {
    registry: Arc<Registry<DisplayKind, Frame>>,
    batch: Mutex<FrameBatch>,
}

impl MfdSurface {
    fn acknowledge() -> Vec<String> {
        vec![encode(&MfdRequest::Acknowledge)]
    }
}

impl Surface for MfdSurface {
    fn label(&self) -> &'static str {
        self.registry.label()
    }

    fn opened(&self) -> Vec<String> {
        // Frames of a batch cut off by a reconnect are not resent.
        *self.batch.lock().expect("batch lock poisoned") = FrameBatch::new();
        self.registry.opened()
    }

    fn changes(&self) -> Arc<Notify> {
        self.registry.changes()
    }

    fn sync(&self) -> Vec<String> {
        self.registry.sync()
    }

    fn received(&self, message: WsMessage) -> Result<Vec<String>, ProtocolError> {
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        match message {
            WsMessage::Text(text) => {
                batch.announce(&text)?;
                log::trace!("[Mfds] Announcement {}", text);
                if batch.is_pending() {
                    Ok(Vec::new())
                } else {
                    Ok(Self::acknowledge())
                }
            }
            WsMessage::Binary(data) => {
                let (kind, complete) = batch.accept()?;
                drop(batch);

                if data.is_empty() {
                    log::trace!("[Mfds] No frame for {}", kind);
                } else {
                    self.registry.dispatch(
                        &kind,
                        Frame {
                            kind,
                            jpeg: Bytes::from(data),
                        },
                    );
                }

                if complete {
                    Ok(Self::acknowledge())
                } else {
                    Ok(Vec::new())
                }
            }
            WsMessage::Ping(_) | WsMessage::Close { .. } => Ok(Vec::new()),
        }
    }

    fn disconnected(&self) {
        self.registry.disconnected();
    }

    fn failed(&self, reason: &str) {
        log::debug!("[Mfds] Failed: {}", reason);
        self.registry.fail();
    }

    fn shut_down(&self) {
        self.registry.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    fn announce(kinds: &str) -> WsMessage {
        WsMessage::Text(format!(r#"{{"list":{kinds}}}"#))
    }

    type Seen = Arc<Mutex<Vec<(DisplayKind, Vec<u8>)>>>;

    fn record(client: &MfdClient, kind: DisplayKind, seen: &Seen) -> Subscription {
        let seen = Arc::clone(seen);
        client
            .subscribe(kind, move |frame| {
                if let Some(frame) = frame {
                    seen.lock().unwrap().push((frame.kind, frame.jpeg.to_vec()));
                }
            })
            .unwrap()
    }

    #[test]
    fn test_batch_dispatches_in_order_then_acknowledges_once() {
        let (client, mut outbox) = MfdClient::detached(Notifications::new());
        let surface = client.surface();
        let seen: Seen = Arc::default();
        let _left = record(&client, DisplayKind::LeftMfcd, &seen);
        let _right = record(&client, DisplayKind::RightMfcd, &seen);

        let mut burst = surface.opened();
        burst.sort();
        assert_eq!(burst, vec![r#"{"Subscribe":"LeftMfcd"}"#, r#"{"Subscribe":"RightMfcd"}"#]);

        let replies = surface.received(announce(r#"["LeftMfcd","RightMfcd"]"#)).unwrap();
        assert!(replies.is_empty());
        assert!(surface.received(WsMessage::Binary(vec![0xff, 0xd8, 1])).unwrap().is_empty());
        let replies = surface.received(WsMessage::Binary(vec![0xff, 0xd8, 2])).unwrap();
        assert_eq!(replies, vec![r#""Aknowledge""#.to_string()]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (DisplayKind::LeftMfcd, vec![0xff, 0xd8, 1]),
                (DisplayKind::RightMfcd, vec![0xff, 0xd8, 2]),
            ]
        );

        assert!(matches!(
            surface.received(WsMessage::Binary(vec![3])),
            Err(ProtocolError::UnannouncedFrame)
        ));
        assert!(drain(&mut outbox).is_empty());
    }

    #[test]
    fn test_empty_frames_count_but_are_not_dispatched() {
        let (client, _outbox) = MfdClient::detached(Notifications::new());
        let surface = client.surface();
        let seen: Seen = Arc::default();
        let _center = record(&client, DisplayKind::CenterMfd, &seen);

        surface.received(announce(r#"["LeftMfcd","CenterMfd"]"#)).unwrap();
        surface.received(WsMessage::Binary(Vec::new())).unwrap();
        let replies = surface.received(WsMessage::Binary(vec![9])).unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![(DisplayKind::CenterMfd, vec![9])]);
    }

    #[test]
    fn test_new_listener_gets_latest_frame() {
        let (client, _outbox) = MfdClient::detached(Notifications::new());
        let surface = client.surface();
        let _first = client.subscribe(DisplayKind::LeftMfcd, |_| {}).unwrap();

        surface.received(announce(r#"["LeftMfcd"]"#)).unwrap();
        surface.received(WsMessage::Binary(vec![1, 2, 3])).unwrap();

        let latest = Arc::new(Mutex::new(None));
        let l = Arc::clone(&latest);
        let _second = client
            .subscribe(DisplayKind::LeftMfcd, move |f| *l.lock().unwrap() = f.cloned())
            .unwrap();

        let frame = latest.lock().unwrap().clone().unwrap();
        assert_eq!(frame.jpeg, Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn test_last_unsubscribe_sends_unsubscribe() {
        let (client, mut outbox) = MfdClient::detached(Notifications::new());
        let surface = client.surface();
        surface.opened();

        let sub = client.subscribe(DisplayKind::RightMfcd, |_| {}).unwrap();
        assert_eq!(surface.sync(), vec![r#"{"Subscribe":"RightMfcd"}"#]);

        drop(sub);
        assert_eq!(surface.sync(), vec![r#"{"Unsubscribe":"RightMfcd"}"#]);
        assert!(drain(&mut outbox).is_empty());
    }

    #[test]
    fn test_reopen_discards_outstanding_batch() {
        let (client, _outbox) = MfdClient::detached(Notifications::new());
        let surface = client.surface();
        let seen: Seen = Arc::default();
        let _left = record(&client, DisplayKind::LeftMfcd, &seen);

        surface.opened();
        surface.received(announce(r#"["LeftMfcd","RightMfcd"]"#)).unwrap();
        surface.received(WsMessage::Binary(vec![1])).unwrap();

        surface.disconnected();
        surface.opened();

        assert!(matches!(
            surface.received(WsMessage::Binary(vec![2])),
            Err(ProtocolError::UnannouncedFrame)
        ));
        assert_eq!(*seen.lock().unwrap(), vec![(DisplayKind::LeftMfcd, vec![1])]);
    }

    #[test]
    fn test_text_mid_batch_is_protocol_error() {
        let (client, _outbox) = MfdClient::detached(Notifications::new());
        let surface = client.surface();
        surface.received(announce(r#"["LeftMfcd","RightMfcd"]"#)).unwrap();
        surface.received(WsMessage::Binary(vec![1])).unwrap();

        assert!(matches!(
            surface.received(announce(r#"["LeftMfcd"]"#)),
            Err(ProtocolError::UnexpectedText)
        ));
    }

    #[test]
    fn test_failure_notifies_mfds_stream_closed() {
        let notifications = Notifications::new();
        let (client, _outbox) = MfdClient::detached(notifications.clone());
        client.surface().failed("stream ended");

        assert_eq!(
            client.subscribe(DisplayKind::LeftMfcd, |_| {}).unwrap_err(),
            TransportError::Failed
        );
        assert_eq!(notifications.entries()[0].message, "Mfds stream closed");
    }
}

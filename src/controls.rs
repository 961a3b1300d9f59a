//! Controls surface client (`/api/controls/stream`).
//!
//! [`ControlsClient`] is the context object for the controls socket: create
//! one per backend with [`ControlsClient::connect`], clone it into every
//! controller, and drop the last clone (or call
//! [`ControlsClient::shutdown`]) to close the socket.
//!
//! ```ignore
//! let controls = ControlsClient::connect(&config, notifications.clone())?;
//! let _sub = controls.subscribe("MASTER_ARM_SW", |resp| {
//!     if let Some(resp) = resp {
//!         println!("master arm = {:?}", resp.integer());
//!     }
//! })?;
//! controls.send(Input::integer("MASTER_ARM_SW", 1))?;
//! ```

// Rust guideline compliant 2026-02

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};

use crate::api;
use crate::config::PanelConfig;
use crate::notifications::Notifications;
use crate::protocol::{encode, Input, Request, Response};
use crate::pubsub::{
    Connection, ConnectionState, ProtocolError, Registry, Subscription, Surface, TransportError,
};
use crate::ws::WsMessage;

/// Route of the controls stream below `/api`.
pub const CONTROLS_PATH: &str = "/controls/stream";

/// Handle to the controls socket. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControlsClient {
    registry: Arc<Registry<String, Response>>,
    connection: Option<Arc<Connection>>,
}

impl ControlsClient {
    /// Open the controls socket for the configured backend.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured host does not form a valid URL.
    /// Connection failures surface later through [`Self::connection_state`].
    pub fn connect(config: &PanelConfig, notifications: Notifications) -> anyhow::Result<Self> {
        let url = api::ws_url(config, CONTROLS_PATH)?;
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
            registry: Registry::new("Controls", false, tx, notifications),
            connection: None,
        };
        (client, rx)
    }

    /// Listen to a channel.
    ///
    /// `listener` is called with `None` before this returns, then with every
    /// response for the channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] once the socket failed or was shut down.
    pub fn subscribe<F>(&self, name: impl Into<String>, listener: F) -> Result<Subscription, TransportError>
    where
        F: Fn(Option<&Response>) + Send + Sync + 'static,
    {
        self.registry.subscribe(name.into(), listener)
    }

    /// Send an input command.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Failed`] once the socket closed for good.
    pub fn send(&self, input: Input) -> Result<(), TransportError> {
        log::debug!("[Controls] Input {}", input);
        self.registry.send(encode(&Request::Input(input)))
    }

    /// Protocol side of this client, for driving it by hand.
    pub fn surface(&self) -> ControlsSurface {
        ControlsSurface {
            registry: Arc::clone(&self.registry),
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

/// Controls protocol: each text frame is one [`Response`].
#[derive(Debug, Clone)]
pub struct ControlsSurface {
    registry: Arc<Registry<String, Response>>,
}

impl Surface for ControlsSurface {
    fn label(&self) -> &'static str {
        self.registry.label()
    }

    fn opened(&self) -> Vec<String> {
        self.registry.opened()
    }

    fn changes(&self) -> Arc<Notify> {
        self.registry.changes()
    }

    fn sync(&self) -> Vec<String> {
        self.registry.sync()
    }

    fn received(&self, message: WsMessage) -> Result<Vec<String>, ProtocolError> {
        let WsMessage::Text(text) = message else {
            return Err(ProtocolError::UnexpectedBinary);
        };
        let response: Response = serde_json::from_str(&text)?;
        log::trace!("[Controls] <- {}", text);
        let name = response.name.clone();
        self.registry.dispatch(&name, response);
        Ok(Vec::new())
    }

    fn disconnected(&self) {
        self.registry.disconnected();
    }

    fn failed(&self, reason: &str) {
        log::debug!("[Controls] Failed: {}", reason);
        self.registry.fail();
    }

    fn shut_down(&self) {
        self.registry.close();
    }
}

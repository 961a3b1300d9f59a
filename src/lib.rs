//! tcd-panel - cockpit panel client for the tcd backend.
//!
//! Connects to the backend's HTTP/WebSocket API to mirror and drive cockpit
//! controls and to receive multi-function display frames.
//!
//! # Architecture
//!
//! - **Transport** - one WebSocket per surface, channel pub/sub on top
//! - **Controls** - `Response`/`Input` messages for named control channels
//! - **Switches** - typed controller state machines over control channels
//! - **MFD** - batched JPEG frames, or a WebRTC stream negotiated over HTTP
//!
//! # Modules
//!
//! - [`pubsub`] - channel registry and connection task
//! - [`controls`] - controls surface client
//! - [`switch`] - push buttons, rockers, toggles and the five-way hat
//! - [`mfd`] - MFD frame stream and WebRTC signaling
//! - [`api`] - HTTP client and API errors
//! - [`config`] - configuration loading/saving
//! - [`notifications`] - user-visible error list

pub mod api;
pub mod commands;
pub mod config;
pub mod controls;
pub mod mfd;
pub mod notifications;
pub mod protocol;
pub mod pubsub;
pub mod switch;
pub mod ws;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, ApiErrorKind};
pub use config::{PanelConfig, ReconnectPolicy};
pub use controls::ControlsClient;
pub use mfd::{Frame, MfdClient};
pub use notifications::{Notification, Notifications};
pub use protocol::{DisplayKind, Input, InputValue, Response};
pub use pubsub::{ConnectionState, Subscription, TransportError};
pub use switch::{
    FiveWay, FiveWaySwitch, Push3WayButton, PushButton, Switch, SwitchError, ThreeWay,
    Toggle3WaySwitch, WaitError,
};

//! CLI subcommand implementations for tcd-panel.
//!
//! Commands are organized into submodules by surface:
//!
//! - [`controls`] - watching channels and driving controls
//! - [`mfd`] - saving MFD frames and negotiating the WebRTC stream
//!
//! Every command opens its own connection and closes it before returning.
//!
//! ```ignore
//! use tcd_panel::commands;
//!
//! commands::controls::click(&config, "MASTER_CAUTION").await?;
//! commands::mfd::frames(&config, DisplayKind::LeftMfcd, &out, 10).await?;
//! ```

pub mod controls;
pub mod mfd;

use anyhow::Result;
use tokio::sync::watch;

use crate::pubsub::ConnectionState;

/// Wait until the socket is open. Fails if it closes first.
pub(crate) async fn until_connected(state: &mut watch::Receiver<ConnectionState>) -> Result<()> {
    let reached = state
        .wait_for(|s| matches!(s, ConnectionState::Connected) || s.is_terminal())
        .await
        .map(|s| s.clone());
    match reached {
        Ok(ConnectionState::Connected) => Ok(()),
        Ok(ConnectionState::Failed(reason)) => anyhow::bail!("connection failed: {reason}"),
        _ => anyhow::bail!("connection closed"),
    }
}

/// Resolve once the connection task has exited, with the final state.
pub(crate) async fn until_terminal(mut state: watch::Receiver<ConnectionState>) -> ConnectionState {
    let reached = state
        .wait_for(ConnectionState::is_terminal)
        .await
        .map(|s| s.clone());
    reached.unwrap_or(ConnectionState::Closed)
}

/// Error for a connection that ended while a command still needed it.
pub(crate) fn ended(state: ConnectionState) -> anyhow::Error {
    match state {
        ConnectionState::Failed(reason) => anyhow::anyhow!("stream closed: {reason}"),
        _ => anyhow::anyhow!("stream closed"),
    }
}

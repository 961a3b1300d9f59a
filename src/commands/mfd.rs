//! MFD commands: save JPEG frames, negotiate a WebRTC stream.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::{ended, until_terminal};
use crate::api::ApiClient;
use crate::config::PanelConfig;
use crate::mfd::webrtc::{negotiate, RustRtcPeer};
use crate::mfd::{Frame, MfdClient};
use crate::notifications::Notifications;
use crate::protocol::DisplayKind;

/// File name for the `index`-th frame of `kind`.
pub fn frame_path(dir: &Path, kind: DisplayKind, index: usize) -> PathBuf {
    dir.join(format!("{}-{:04}.jpg", kind.as_str(), index))
}

/// Save `count` frames of `kind` into `out`.
pub async fn frames(config: &PanelConfig, kind: DisplayKind, out: &Path, count: usize) -> Result<()> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;

    let mfds = MfdClient::connect(config, Notifications::new())
        .context("failed to open MFD stream")?;
    let state = mfds.connection_state().context("MFD client has no connection")?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let subscription = mfds.subscribe(kind, move |frame| {
        if let Some(frame) = frame {
            let _ = tx.send(frame.clone());
        }
    })?;

    let terminal = until_terminal(state.clone());
    tokio::pin!(terminal);

    for index in 0..count {
        let frame = tokio::select! {
            frame = rx.recv() => frame.context("frame channel closed")?,
            closed = &mut terminal => return Err(ended(closed)),
        };
        let path = frame_path(out, kind, index);
        tokio::fs::write(&path, &frame.jpeg)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("[Mfds] Saved {} ({} bytes)", path.display(), frame.jpeg.len());
    }

    subscription.unsubscribe();
    mfds.shutdown();
    until_terminal(state).await;
    Ok(())
}

/// Negotiate a WebRTC stream of `kind` and keep it open until Ctrl-C.
pub async fn offer(config: &PanelConfig, kind: DisplayKind) -> Result<()> {
    let notifications = Notifications::new();
    let api = ApiClient::new(config.clone());
    let peer = RustRtcPeer::new(&config.ice_servers);

    notifications.surface(negotiate(&peer, &api, kind).await)?;
    println!("{kind} stream negotiated, Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_path() {
        let path = frame_path(Path::new("/tmp/frames"), DisplayKind::RightMfcd, 7);
        assert_eq!(path, PathBuf::from("/tmp/frames/RightMfcd-0007.jpg"));
    }
}

//! WebRTC signaling for the MFD video stream.
//!
//! The backend only accepts a fully gathered offer (no trickle ICE):
//!
//! ```text
//!   client                                    backend
//!     |-- add recv-only video transceiver        |
//!     |-- create offer, set local description    |
//!     |-- wait for ICE gathering to complete     |
//!     |-- POST /api/mfd {kind, desc: offer} ---->|
//!     |<---------------------- {desc: answer} ---|
//!     |-- set remote description                 |
//! ```
//!
//! The peer connection sits behind [`MediaPeer`] so the handshake can run
//! against any implementation. [`RustRtcPeer`] is the real one.

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use rustrtc::{
    IceServer, MediaKind, PeerConnection, RtcConfiguration, SdpType as RtcSdpType,
    SessionDescription, TransceiverDirection,
};

use crate::api::{ApiClient, ApiError};
use crate::protocol::{DisplayKind, MfdAnswer, MfdOffer, SdpType, SessionDesc};

/// Route of the signaling endpoint below `/api`.
pub const MFD_PATH: &str = "/mfd";

/// Local end of a receive-only video session.
#[async_trait]
pub trait MediaPeer: Send + Sync {
    /// Add a receive-only video transceiver, create an offer and set it as
    /// the local description.
    async fn create_offer(&self) -> anyhow::Result<()>;

    /// Wait for ICE gathering to finish. Returns the local offer SDP with
    /// every candidate included.
    async fn gathered_offer(&self) -> anyhow::Result<String>;

    /// Apply the backend's answer as the remote description.
    async fn apply_answer(&self, sdp: &str) -> anyhow::Result<()>;
}

/// Failure while negotiating a stream.
#[derive(Debug)]
pub enum NegotiateError {
    /// The local peer connection failed.
    Peer(anyhow::Error),
    /// The signaling request failed.
    Api(ApiError),
    /// The backend answered with something other than an answer.
    NotAnAnswer(SdpType),
}

impl fmt::Display for NegotiateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer(e) => write!(f, "WebRTC: {e:#}"),
            Self::Api(e) => write!(f, "{e}"),
            Self::NotAnAnswer(t) => write!(f, "Unexpected: expected SDP answer, got {t:?}"),
        }
    }
}

impl std::error::Error for NegotiateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Peer(e) => Some(&**e),
            Self::Api(e) => Some(e),
            Self::NotAnAnswer(_) => None,
        }
    }
}

impl From<ApiError> for NegotiateError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

/// Negotiate a video stream of `kind` on `peer`.
///
/// # Errors
///
/// - [`NegotiateError::Peer`] if the offer cannot be created or the answer
///   is rejected by the peer.
/// - [`NegotiateError::Api`] if the signaling request fails.
/// - [`NegotiateError::NotAnAnswer`] if the backend replies with an offer.
pub async fn negotiate<P>(peer: &P, api: &ApiClient, kind: DisplayKind) -> Result<(), NegotiateError>
where
    P: MediaPeer + ?Sized,
{
    peer.create_offer().await.map_err(NegotiateError::Peer)?;
    let sdp = peer.gathered_offer().await.map_err(NegotiateError::Peer)?;
    log::debug!("[WebRTC] Gathered offer for {} ({} bytes)", kind, sdp.len());

    let offer = MfdOffer {
        kind,
        desc: SessionDesc {
            sdp_type: SdpType::Offer,
            sdp,
        },
    };
    let answer: MfdAnswer = api.post(MFD_PATH, &offer).await?;
    if answer.desc.sdp_type != SdpType::Answer {
        return Err(NegotiateError::NotAnAnswer(answer.desc.sdp_type));
    }

    peer.apply_answer(&answer.desc.sdp)
        .await
        .map_err(NegotiateError::Peer)?;
    log::info!("[WebRTC] {} stream negotiated", kind);
    Ok(())
}

/// [`MediaPeer`] backed by a `rustrtc` peer connection.
pub struct RustRtcPeer {
    pc: PeerConnection,
}

impl fmt::Debug for RustRtcPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustRtcPeer").finish_non_exhaustive()
    }
}

impl RustRtcPeer {
    /// Peer connection using the given STUN/TURN URLs.
    pub fn new(ice_urls: &[String]) -> Self {
        let ice_servers = ice_urls
            .iter()
            .map(|url| IceServer {
                urls: vec![url.clone()],
                username: None,
                credential: None,
                credential_type: rustrtc::IceCredentialType::Password,
            })
            .collect();
        let config = RtcConfiguration {
            ice_servers,
            ..Default::default()
        };
        Self {
            pc: PeerConnection::new(config),
        }
    }

    /// Underlying peer connection, for reading tracks and events.
    pub fn connection(&self) -> &PeerConnection {
        &self.pc
    }
}

#[async_trait]
impl MediaPeer for RustRtcPeer {
    async fn create_offer(&self) -> anyhow::Result<()> {
        self.pc
            .add_transceiver(MediaKind::Video, TransceiverDirection::RecvOnly);
        let offer = self
            .pc
            .create_offer()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create offer: {e}"))?;
        self.pc
            .set_local_description(offer)
            .map_err(|e| anyhow::anyhow!("Failed to set local description: {e}"))?;
        Ok(())
    }

    async fn gathered_offer(&self) -> anyhow::Result<String> {
        self.pc.wait_for_gathering_complete().await;
        let desc = self
            .pc
            .local_description()
            .context("no local description after gathering")?;
        Ok(desc.to_sdp_string())
    }

    async fn apply_answer(&self, sdp: &str) -> anyhow::Result<()> {
        let answer = SessionDescription::parse(RtcSdpType::Answer, sdp)
            .map_err(|e| anyhow::anyhow!("Invalid SDP answer: {e}"))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set remote description: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiErrorKind;
    use crate::config::PanelConfig;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct FakePeer {
        calls: Mutex<Vec<String>>,
        fail_offer: bool,
    }

    #[async_trait]
    impl MediaPeer for FakePeer {
        async fn create_offer(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("create_offer".into());
            if self.fail_offer {
                anyhow::bail!("no codecs");
            }
            Ok(())
        }

        async fn gathered_offer(&self) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push("gathered_offer".into());
            Ok("v=0 offer".into())
        }

        async fn apply_answer(&self, sdp: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("apply_answer {sdp}"));
            Ok(())
        }
    }

    fn api_for(server: &MockServer) -> ApiClient {
        ApiClient::new(PanelConfig {
            host: server.address().to_string(),
            ..PanelConfig::default()
        })
    }

    #[tokio::test]
    async fn test_negotiate_posts_gathered_offer_and_applies_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mfd"))
            .and(body_json(serde_json::json!({
                "kind": "CenterMfd",
                "desc": {"type": "offer", "sdp": "v=0 offer"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "desc": {"type": "answer", "sdp": "v=0 answer"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let peer = FakePeer::default();
        negotiate(&peer, &api_for(&server), DisplayKind::CenterMfd)
            .await
            .unwrap();

        assert_eq!(
            *peer.calls.lock().unwrap(),
            vec!["create_offer", "gathered_offer", "apply_answer v=0 answer"]
        );
    }

    #[tokio::test]
    async fn test_backend_request_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mfd"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"Request": "display not available"})),
            )
            .mount(&server)
            .await;

        let peer = FakePeer::default();
        let err = negotiate(&peer, &api_for(&server), DisplayKind::LeftMfcd)
            .await
            .unwrap_err();

        match &err {
            NegotiateError::Api(e) => assert_eq!(e.kind, ApiErrorKind::Request),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "Request: display not available");
        assert_eq!(peer.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_peer_failure_skips_signaling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let peer = FakePeer {
            fail_offer: true,
            ..FakePeer::default()
        };
        let err = negotiate(&peer, &api_for(&server), DisplayKind::RightMfcd)
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiateError::Peer(_)));
    }

    #[tokio::test]
    async fn test_offer_instead_of_answer_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mfd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "desc": {"type": "offer", "sdp": "v=0"}
            })))
            .mount(&server)
            .await;

        let peer = FakePeer::default();
        let err = negotiate(&peer, &api_for(&server), DisplayKind::LeftMfcd)
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiateError::NotAnAnswer(SdpType::Offer)));
        assert_eq!(peer.calls.lock().unwrap().len(), 2);
    }
}

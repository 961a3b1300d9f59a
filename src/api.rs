//! HTTP API client for the panel backend.
//!
//! All backend routes live under `http://<host>/api`. In debug mode the
//! port is forced to the configured debug port, so a panel served by a dev
//! server on another port still reaches the backend.

// Rust guideline compliant 2026-02

use std::fmt;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::PanelConfig;

/// Classification of an API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The backend failed internally.
    Internal,
    /// The backend rejected the request.
    Request,
    /// The request never got a response (connect, TLS, I/O).
    Network,
    /// Unexpected status or body that the backend's error enum does not cover.
    Unexpected,
}

impl ApiErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "Internal",
            Self::Request => "Request",
            Self::Network => "Network",
            Self::Unexpected => "Unexpected",
        }
    }
}

/// Failed API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// What went wrong.
    pub kind: ApiErrorKind,
    /// Backend or transport message.
    pub message: String,
}

impl ApiError {
    /// Build an error.
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error body returned by the backend.
#[derive(Debug, Deserialize)]
enum ServerError {
    Internal(String),
    Request(String),
}

impl From<ServerError> for ApiError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::Internal(m) => Self::new(ApiErrorKind::Internal, m),
            ServerError::Request(m) => Self::new(ApiErrorKind::Request, m),
        }
    }
}

/// Build `http://<host>/api<path>`, applying the debug port override.
pub fn api_url(config: &PanelConfig, path: &str) -> anyhow::Result<Url> {
    let raw = format!("http://{}/api{}", config.host, path);
    let mut url = Url::parse(&raw).map_err(|e| anyhow::anyhow!("invalid API url {raw}: {e}"))?;
    if config.debug && url.set_port(Some(config.debug_port)).is_err() {
        anyhow::bail!("cannot set debug port on {raw}");
    }
    Ok(url)
}

/// WebSocket URL for a streaming route (`ws://<host>/api<path>`).
pub fn ws_url(config: &PanelConfig, path: &str) -> anyhow::Result<String> {
    Ok(crate::ws::http_to_ws_scheme(api_url(config, path)?.as_str()))
}

/// JSON client for the backend's request/response routes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: PanelConfig,
}

impl ApiClient {
    /// Create a client for the configured backend.
    pub fn new(config: PanelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// POST `body` as JSON to `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] with kind `Network` when the request cannot be
    /// sent, `Internal`/`Request` when the backend reports an error, and
    /// `Unexpected` for any other failure status or undecodable body.
    pub async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = api_url(&self.config, path)
            .map_err(|e| ApiError::new(ApiErrorKind::Unexpected, format!("{e:#}")))?;

        log::debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::Network, e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::Network, e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ServerError>(&bytes) {
                Ok(server) => server.into(),
                Err(_) => ApiError::new(
                    ApiErrorKind::Unexpected,
                    format!("{} {}", status, String::from_utf8_lossy(&bytes)),
                ),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            ApiError::new(ApiErrorKind::Unexpected, format!("invalid response body: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str, debug: bool) -> PanelConfig {
        PanelConfig {
            host: host.to_string(),
            debug,
            ..PanelConfig::default()
        }
    }

    #[test]
    fn test_api_url_uses_host_and_prefix() {
        let url = api_url(&config("panel.local:8080", false), "/mfd").unwrap();
        assert_eq!(url.as_str(), "http://panel.local:8080/api/mfd");
    }

    #[test]
    fn test_debug_overrides_port() {
        let url = api_url(&config("panel.local:5173", true), "/mfd").unwrap();
        assert_eq!(url.as_str(), "http://panel.local:3511/api/mfd");
    }

    #[test]
    fn test_ws_url() {
        let url = ws_url(&config("127.0.0.1:3511", false), "/controls/stream").unwrap();
        assert_eq!(url, "ws://127.0.0.1:3511/api/controls/stream");
    }

    #[test]
    fn test_server_error_classification() {
        let e: ServerError = serde_json::from_str(r#"{"Request":"unknown display"}"#).unwrap();
        let api: ApiError = e.into();
        assert_eq!(api.kind, ApiErrorKind::Request);
        assert_eq!(api.to_string(), "Request: unknown display");

        let e: ServerError = serde_json::from_str(r#"{"Internal":"webrtc error"}"#).unwrap();
        assert_eq!(ApiError::from(e).kind, ApiErrorKind::Internal);
    }
}

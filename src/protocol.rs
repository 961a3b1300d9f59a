//! Wire types for the panel backend.
//!
//! Every message on both WebSocket surfaces is JSON produced by serde's
//! externally tagged enum representation, so the shapes below are the
//! protocol. Unknown variants fail at decode time.
//!
//! # Controls surface (`/api/controls/stream`)
//!
//! ```text
//! client → server   {"Subscribe": "NAME"}
//!                   {"Unsubscribe": "NAME"}
//!                   {"Input": {"name": "NAME", "value": "Toggle" | {"Integer": 1}}}
//! server → client   {"name": "NAME", "outputs": [{"Integer": 1}, {"String": "..."}]}
//! ```
//!
//! # MFD surface (`/api/mfds`)
//!
//! ```text
//! client → server   {"Subscribe": "LeftMfcd"} | {"Unsubscribe": "LeftMfcd"} | "Aknowledge"
//! server → client   {"list": ["LeftMfcd", "RightMfcd"]}, then one binary JPEG per entry
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client request on the controls surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Start receiving responses for a channel.
    Subscribe(String),
    /// Stop receiving responses for a channel.
    Unsubscribe(String),
    /// Drive a control.
    Input(Input),
}

/// Server response carrying the outputs of one control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Channel the outputs belong to.
    pub name: String,
    /// Output values, usually a single integer or string.
    pub outputs: Vec<Output>,
}

impl Response {
    /// First integer output, if any.
    pub fn integer(&self) -> Option<i16> {
        self.outputs.iter().find_map(|o| match o {
            Output::Integer(n) => Some(*n),
            Output::String(_) => None,
        })
    }

    /// First string output, if any.
    pub fn string(&self) -> Option<&str> {
        self.outputs.iter().find_map(|o| match o {
            Output::String(s) => Some(s.as_str()),
            Output::Integer(_) => None,
        })
    }
}

/// A single control output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    /// Text output (displays, frequencies).
    String(String),
    /// Discrete position or gauge value.
    Integer(i16),
}

/// Command sent to a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Channel to drive.
    pub name: String,
    /// What to do with it.
    pub value: InputValue,
}

impl Input {
    /// Build an input for `name`.
    pub fn new(name: impl Into<String>, value: InputValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Step the control up by one.
    pub fn increase(name: impl Into<String>) -> Self {
        Self::new(name, InputValue::Increase)
    }

    /// Step the control down by one.
    pub fn decrease(name: impl Into<String>) -> Self {
        Self::new(name, InputValue::Decrease)
    }

    /// Flip a two-state control.
    pub fn toggle(name: impl Into<String>) -> Self {
        Self::new(name, InputValue::Toggle)
    }

    /// Move the control to an absolute position.
    pub fn integer(name: impl Into<String>, value: i16) -> Self {
        Self::new(name, InputValue::Integer(value))
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.value)
    }
}

/// Payload of an [`Input`]. Serializes as a bare tag or `{"Integer": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputValue {
    /// Increment.
    Increase,
    /// Decrement.
    Decrease,
    /// Toggle.
    Toggle,
    /// Absolute position.
    Integer(i16),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increase => write!(f, "INC"),
            Self::Decrease => write!(f, "DEC"),
            Self::Toggle => write!(f, "TOGGLE"),
            Self::Integer(i) => write!(f, "{i}"),
        }
    }
}

impl std::str::FromStr for InputValue {
    type Err = String;

    /// Parses `inc`, `dec`, `toggle` (any case) or an integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inc" | "increase" => Ok(Self::Increase),
            "dec" | "decrease" => Ok(Self::Decrease),
            "toggle" => Ok(Self::Toggle),
            other => other
                .parse::<i16>()
                .map(Self::Integer)
                .map_err(|_| format!("invalid input value: {s}")),
        }
    }
}

/// Display whose frames the MFD surface can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayKind {
    /// Left multi-function color display.
    LeftMfcd,
    /// Right multi-function color display.
    RightMfcd,
    /// Center display.
    CenterMfd,
}

impl DisplayKind {
    /// All known displays.
    pub const ALL: [Self; 3] = [Self::LeftMfcd, Self::RightMfcd, Self::CenterMfd];

    /// Wire name of the display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftMfcd => "LeftMfcd",
            Self::RightMfcd => "RightMfcd",
            Self::CenterMfd => "CenterMfd",
        }
    }
}

impl fmt::Display for DisplayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DisplayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown display: {s}"))
    }
}

/// Client request on the MFD surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfdRequest {
    /// Start streaming a display.
    Subscribe(DisplayKind),
    /// Stop streaming a display.
    Unsubscribe(DisplayKind),
    /// All frames of the last batch were received; the server may send the next one.
    /// The spelling is the backend's.
    #[serde(rename = "Aknowledge")]
    Acknowledge,
}

/// Announcement preceding a batch of binary frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAnnouncement {
    /// Kinds of the frames that follow, in order.
    pub list: Vec<DisplayKind>,
}

/// Session description as exchanged with the signaling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDesc {
    /// `offer` or `answer`.
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Raw SDP text.
    pub sdp: String,
}

/// SDP direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Local offer.
    Offer,
    /// Remote answer.
    Answer,
}

/// Body of `POST /api/mfd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfdOffer {
    /// Display to stream.
    pub kind: DisplayKind,
    /// Fully gathered SDP offer.
    pub desc: SessionDesc,
}

/// Response of `POST /api/mfd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfdAnswer {
    /// SDP answer from the backend.
    pub desc: SessionDesc,
}

/// Serialize a message for the wire.
pub fn encode<T: Serialize>(msg: &T) -> String {
    serde_json::to_string(msg).expect("protocol types are serializable")
}

//! Session state, generations and captured payloads

use crate::camera::Facing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counter distinguishing successive decode loops.
///
/// Incremented every time the session enters `Initializing`; events stamped
/// with any other value are stale and ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Wrap a raw counter value
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text read from a ticket QR code. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPayload {
    raw: String,
    captured_at: DateTime<Utc>,
}

impl DecodedPayload {
    /// Stamp `raw` with the current time; `None` for an empty payload
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return None;
        }
        Some(Self {
            raw,
            captured_at: Utc::now(),
        })
    }

    /// The payload exactly as decoded
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// When the code was read
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Ticket identifier submitted to the check-in service.
    ///
    /// Payload schemas are not interpreted; the trimmed text is the identifier.
    pub fn ticket_id(&self) -> &str {
        self.raw.trim()
    }
}

/// Where the scan session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing running; waiting for `start`
    Idle,
    /// Camera acquisition in flight
    Initializing,
    /// Decode loop running
    Scanning,
    /// Stopped by the operator
    Paused,
    /// A ticket was read; awaiting review
    Captured(DecodedPayload),
    /// Camera could not be acquired or was lost
    CameraFault(String),
    /// Decoder failed fatally
    DecodeFault(String),
}

impl SessionState {
    /// Short lowercase name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Scanning => "scanning",
            SessionState::Paused => "paused",
            SessionState::Captured(_) => "captured",
            SessionState::CameraFault(_) => "camera-fault",
            SessionState::DecodeFault(_) => "decode-fault",
        }
    }

    /// Operator-facing status line
    pub fn status_message(&self) -> String {
        match self {
            SessionState::Idle => "Idle".to_string(),
            SessionState::Initializing => "Initializing...".to_string(),
            SessionState::Scanning => "Ready to scan".to_string(),
            SessionState::Paused => "Scanner stopped".to_string(),
            SessionState::Captured(_) => "Scan complete".to_string(),
            SessionState::CameraFault(msg) => format!("Camera error: {msg}"),
            SessionState::DecodeFault(msg) => format!("Scanner error: {msg}"),
        }
    }

    /// Whether this is an error state awaiting `retry`
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            SessionState::CameraFault(_) | SessionState::DecodeFault(_)
        )
    }

    /// Captured payload, if any
    pub fn payload(&self) -> Option<&DecodedPayload> {
        match self {
            SessionState::Captured(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Snapshot published to observers on every state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Current state
    #[serde(flatten)]
    pub state: SessionState,
    /// Status line for display
    pub message: String,
    /// Live generation counter
    pub generation: Generation,
    /// Facing used by the next or current acquisition
    pub facing: Facing,
}

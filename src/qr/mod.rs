//! QR decoding and the decode-engine boundary
//!
//! A [`DecodeEngine`] turns a live [`VideoSource`] into a stream of decode
//! attempts. Each attempt is reported through an [`EngineSink`] that stamps it
//! with the scan generation the engine was started for, so the session can
//! recognise events from engines it has already abandoned.
//!
//! [`VideoSource`]: crate::camera::VideoSource

mod decoder;
mod encoder;
mod engine;

pub use decoder::FrameDecoder;
pub use encoder::QrEncoder;
pub use engine::{FrameLoopEngine, FrameLoopFactory};

use crate::camera::VideoSource;
use crate::error::{Error, Result};
use crate::session::Generation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Why a decode attempt produced no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeErrorKind {
    /// No code visible in this frame. Expected at frame rate; never a fault.
    NotFoundTransient,
    /// The camera stopped delivering frames
    DeviceDisconnected,
    /// The host revoked camera access mid-scan
    PermissionRevoked,
    /// Frames or payload in a form the engine cannot handle
    UnsupportedFormat,
    /// Anything else the engine could not recover from
    Other,
}

impl DecodeErrorKind {
    /// Classify a capture or decode error
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::NoQrCodeFound | Error::QrDecode(_) => Self::NotFoundTransient,
            Error::FrameCapture(_) | Error::CameraNotFound(_) => Self::DeviceDisconnected,
            Error::PermissionDenied(_) => Self::PermissionRevoked,
            Error::Image(_) | Error::PayloadNotText(_) => Self::UnsupportedFormat,
            _ => Self::Other,
        }
    }

    /// Whether this kind is routine noise
    pub fn is_transient(self) -> bool {
        self == Self::NotFoundTransient
    }

    /// Whether the fault lies with the camera rather than the decoder
    pub fn is_camera_fault(self) -> bool {
        matches!(self, Self::DeviceDisconnected | Self::PermissionRevoked)
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFoundTransient => "not-found",
            Self::DeviceDisconnected => "device-disconnected",
            Self::PermissionRevoked => "permission-revoked",
            Self::UnsupportedFormat => "unsupported-format",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// A code was read
    Decoded(String),
    /// No payload this time
    Failed {
        /// Failure class
        kind: DecodeErrorKind,
        /// Engine-provided detail
        message: String,
    },
}

/// A decode attempt tagged with the generation of the engine that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    /// Generation the engine was started for
    pub generation: Generation,
    /// What happened
    pub outcome: EngineOutcome,
}

type Deliver = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Success/error callbacks handed to an engine on start.
#[derive(Clone)]
pub struct EngineSink {
    generation: Generation,
    deliver: Deliver,
}

impl EngineSink {
    /// Create a sink delivering events for `generation` through `deliver`
    pub fn new(generation: Generation, deliver: impl Fn(EngineEvent) + Send + Sync + 'static) -> Self {
        Self {
            generation,
            deliver: Arc::new(deliver),
        }
    }

    /// Generation this sink stamps on its events
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Report a decoded payload
    pub fn success(&self, payload: impl Into<String>) {
        (self.deliver)(EngineEvent {
            generation: self.generation,
            outcome: EngineOutcome::Decoded(payload.into()),
        });
    }

    /// Report a failed attempt
    pub fn error(&self, kind: DecodeErrorKind, message: impl Into<String>) {
        (self.deliver)(EngineEvent {
            generation: self.generation,
            outcome: EngineOutcome::Failed {
                kind,
                message: message.into(),
            },
        });
    }
}

impl fmt::Debug for EngineSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// The decoding collaborator driven by the scan session.
///
/// Engines give no hard-cancel guarantee: an event may still arrive after
/// `stop`, which is why every event carries its generation.
/// A code that decodes to no data is reported as noise, never as a success.
pub trait DecodeEngine: Send {
    /// Begin decoding frames from `source`, reporting through `sink`
    fn start(&mut self, source: VideoSource, sink: EngineSink) -> Result<()>;

    /// Stop decoding. Idempotent.
    fn stop(&mut self);

    /// Free everything the engine holds
    fn destroy(self: Box<Self>);
}

/// Creates a fresh engine for each scan generation
pub trait EngineFactory: Send + Sync {
    /// Build an engine that has not been started
    fn create(&self) -> Box<dyn DecodeEngine>;
}

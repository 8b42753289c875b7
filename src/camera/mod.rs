//! Camera discovery and acquisition
//!
//! The scan session never talks to hardware directly. It asks a
//! [`CameraBackend`] for the available devices once, resolves the wanted
//! [`Facing`] through the [`CameraDeviceManager`], and acquires an exclusive
//! [`CameraHandle`] per scan generation. The V4L2 backend lives behind the
//! `camera` feature.

mod config;
mod manager;

#[cfg(feature = "camera")]
mod device;

pub use config::{CameraConfig, PixelFormat};
pub use manager::CameraDeviceManager;

#[cfg(feature = "camera")]
pub use device::{V4lBackend, V4lCamera, V4lDeviceInfo, list_devices};

use crate::error::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Direction a camera points relative to the operator holding the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear camera, pointed at the attendee's ticket
    #[default]
    Environment,
    /// Front camera, pointed at the operator
    User,
}

impl Facing {
    /// The other facing direction
    pub fn opposite(self) -> Self {
        match self {
            Facing::Environment => Facing::User,
            Facing::User => Facing::Environment,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Facing::Environment => "environment",
            Facing::User => "user",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facing {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(Facing::Environment),
            "user" | "front" => Ok(Facing::User),
            other => Err(format!(
                "Unknown facing '{other}', expected 'environment' or 'user'"
            )),
        }
    }
}

/// A video input the host reported during enumeration.
///
/// Descriptors are immutable; flipping the camera resolves a different
/// descriptor rather than editing the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Backend-specific identifier (e.g. "/dev/video0"), or a facing constraint when unbound
    pub id: String,
    /// Facing direction of the device
    pub facing: Facing,
    /// Human-readable device name, when known
    pub label: Option<String>,
}

impl CameraDescriptor {
    /// Create a descriptor for an enumerated device
    pub fn new(id: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            facing,
            label: None,
        }
    }

    /// Attach a human-readable label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Descriptor carrying only a facing constraint, used when enumeration produced nothing.
    /// The backend picks whichever device satisfies the constraint at acquisition time.
    pub fn unbound(facing: Facing) -> Self {
        Self {
            id: format!("facing:{facing}"),
            facing,
            label: None,
        }
    }

    /// Whether this descriptor names a concrete device
    pub fn is_bound(&self) -> bool {
        !self.id.starts_with("facing:")
    }
}

/// Frames flowing out of an acquired camera
pub type VideoSource = Arc<dyn FrameSource>;

/// Something a decode engine can pull frames from
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Capture the next frame
    async fn next_frame(&self) -> Result<DynamicImage>;
}

/// Exclusive ownership of an acquired camera.
///
/// Implementations must make `release` idempotent and also release on drop,
/// so that every exit path frees the hardware.
pub trait CameraHandle: Send {
    /// Device this handle was acquired for
    fn descriptor(&self) -> &CameraDescriptor;

    /// Frame source to hand to a decode engine
    fn video_source(&self) -> VideoSource;

    /// Stop streaming and give the device back to the host
    fn release(&mut self);
}

/// Host platform access to video inputs
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// List available video inputs. Errors are advisory; callers treat them as "no devices".
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>>;

    /// Open the device described by `descriptor` for exclusive capture
    async fn acquire(&self, descriptor: &CameraDescriptor) -> Result<Box<dyn CameraHandle>>;
}

//! Video input enumeration and facing resolution

use crate::camera::{CameraBackend, CameraDescriptor, Facing};

/// Snapshot of the host's video inputs taken once at startup.
///
/// Enumeration is advisory: when the host refuses it the manager is simply
/// empty, which disables camera flipping but never blocks a scan.
#[derive(Debug, Clone, Default)]
pub struct CameraDeviceManager {
    cameras: Vec<CameraDescriptor>,
}

impl CameraDeviceManager {
    /// Query the backend once. Failures degrade to an empty device list.
    pub async fn discover(backend: &dyn CameraBackend) -> Self {
        match backend.enumerate().await {
            Ok(cameras) => {
                tracing::info!(count = cameras.len(), "Enumerated video inputs");
                Self { cameras }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Camera enumeration unavailable, continuing without it");
                Self::default()
            }
        }
    }

    /// Build a manager from an already known device list
    pub fn from_descriptors(cameras: Vec<CameraDescriptor>) -> Self {
        Self { cameras }
    }

    /// Devices found at startup
    pub fn list_cameras(&self) -> &[CameraDescriptor] {
        &self.cameras
    }

    /// Whether flipping between cameras is possible
    pub fn has_multiple_cameras(&self) -> bool {
        self.cameras.len() > 1
    }

    /// Pick the device for `facing`.
    ///
    /// With no enumeration data an unbound descriptor is returned so acquisition
    /// can still try the facing constraint. With enumeration data, a missing
    /// facing is reported as not found.
    pub fn resolve(&self, facing: Facing) -> Option<CameraDescriptor> {
        if self.cameras.is_empty() {
            return Some(CameraDescriptor::unbound(facing));
        }

        self.cameras.iter().find(|c| c.facing == facing).cloned()
    }
}

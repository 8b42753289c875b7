//! Capture settings applied when a camera is acquired

use crate::camera::Facing;
use serde::{Deserialize, Serialize};

/// Capture settings shared by every acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames per second
    pub fps: u32,

    /// Pixel format requested from the driver
    pub format: PixelFormat,

    /// Number of mapped buffers kept by the driver
    pub buffer_count: u32,

    /// Name substring identifying the rear (ticket-facing) camera
    pub environment_hint: Option<String>,

    /// Name substring identifying the front (operator-facing) camera
    pub user_hint: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        // Tickets are held close; 720p resolves a phone-screen QR comfortably.
        Self {
            width: 1280,
            height: 720,
            fps: 15,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
            environment_hint: None,
            user_hint: None,
        }
    }
}

impl CameraConfig {
    /// Preset for older webcams without MJPEG support
    pub fn compatible() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Yuyv,
            ..Default::default()
        }
    }

    /// Facing implied by the configured name hints, if any matches `name`
    pub fn hinted_facing(&self, name: &str) -> Option<Facing> {
        let name = name.to_lowercase();
        let matches = |hint: &Option<String>| {
            hint.as_ref()
                .is_some_and(|h| !h.trim().is_empty() && name.contains(&h.trim().to_lowercase()))
        };

        if matches(&self.environment_hint) {
            Some(Facing::Environment)
        } else if matches(&self.user_hint) {
            Some(Facing::User)
        } else {
            None
        }
    }
}

/// Pixel format for camera capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Motion JPEG (compressed, recommended for high resolution)
    Mjpeg,
    /// YUYV 4:2:2 (uncompressed, better compatibility)
    Yuyv,
    /// RGB24 (uncompressed, high bandwidth)
    Rgb24,
}

impl PixelFormat {
    /// Convert to V4L2 FourCC code
    #[cfg(feature = "camera")]
    pub fn to_fourcc(self) -> v4l::FourCC {
        match self {
            PixelFormat::Mjpeg => v4l::FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => v4l::FourCC::new(b"RGB3"),
        }
    }

    /// Parse from a user-provided string (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "mjpg" => Some(PixelFormat::Mjpeg),
            "yuyv" => Some(PixelFormat::Yuyv),
            "rgb" | "rgb24" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }
}

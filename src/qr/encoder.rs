//! Ticket QR rendering

use crate::error::{Error, Result};
use image::{DynamicImage, Luma};
use qrcode::{EcLevel, QrCode};
use std::path::Path;

/// Renders ticket identifiers as printable QR codes
pub struct QrEncoder {
    ecc_level: EcLevel,
    min_size: u32,
}

impl QrEncoder {
    /// Encoder with quartile error correction, tolerant of creased paper tickets
    pub fn new() -> Self {
        Self {
            ecc_level: EcLevel::Q,
            min_size: 400,
        }
    }

    /// Override the error correction level
    pub fn with_ecc_level(mut self, ecc_level: EcLevel) -> Self {
        self.ecc_level = ecc_level;
        self
    }

    /// Render `text` as a QR image
    pub fn render(&self, text: &str) -> Result<DynamicImage> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), self.ecc_level)
            .map_err(|e| Error::QrEncode(format!("Failed to create QR code: {e}")))?;

        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();

        Ok(DynamicImage::ImageLuma8(image))
    }

    /// Render `text` and write it as a PNG file
    pub fn write_png(&self, text: &str, path: &Path) -> Result<()> {
        self.render(text)?
            .save_with_format(path, image::ImageFormat::Png)?;
        tracing::info!(path = %path.display(), "Wrote ticket QR");
        Ok(())
    }
}

impl Default for QrEncoder {
    fn default() -> Self {
        Self::new()
    }
}

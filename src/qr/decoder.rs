//! Single-frame QR decoding using rqrr

use crate::error::{Error, Result};
use image::{DynamicImage, GrayImage};

/// Reads the first QR code in a frame as text
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameDecoder;

impl FrameDecoder {
    /// Create a decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode the first readable QR code in `img`.
    ///
    /// Returns [`Error::NoQrCodeFound`] when no grid is present and
    /// [`Error::QrDecode`] when every detected grid is unreadable.
    pub fn decode(&self, img: &DynamicImage) -> Result<String> {
        self.decode_gray(img.to_luma8())
    }

    /// Decode from an already grayscale frame
    pub fn decode_gray(&self, img: GrayImage) -> Result<String> {
        let mut prepared = rqrr::PreparedImage::prepare(img);
        let grids = prepared.detect_grids();

        if grids.is_empty() {
            return Err(Error::NoQrCodeFound);
        }

        let mut last_failure = None;
        for grid in grids {
            let mut bytes = Vec::new();
            match grid.decode_to(&mut bytes) {
                Ok(meta) => {
                    tracing::trace!(
                        version = ?meta.version,
                        ecc_level = meta.ecc_level,
                        length = bytes.len(),
                        "Decoded QR grid"
                    );
                    let len = bytes.len();
                    return String::from_utf8(bytes).map_err(|_| Error::PayloadNotText(len));
                }
                Err(e) => last_failure = Some(format!("{e:?}")),
            }
        }

        Err(Error::QrDecode(
            last_failure.unwrap_or_else(|| "unreadable grid".to_string()),
        ))
    }
}

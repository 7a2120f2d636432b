//! Image decoding with an explicit fail-open result.
//!
//! Only the JPEG family is accepted. Stickers (WebP), PNG screenshots and
//! anything unreadable come back as [`DecodeOutcome::Skipped`] so the caller
//! can let the message through without a verdict.

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

/// Why a payload could not be turned into pixels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("unsupported encoding: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt or truncated image: {0}")]
    Corrupt(String),
}

/// Dense RGB8 pixel grid, row-major.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    image: RgbImage,
}

impl PixelGrid {
    pub const CHANNELS: u8 = 3;

    /// Wrap raw RGB bytes. Returns `None` when `data` is not `width * height * 3` long.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        Self::CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Square-resize to `edge` x `edge` (model input shape).
    pub fn resized(&self, edge: u32) -> PixelGrid {
        if self.width() == edge && self.height() == edge {
            return self.clone();
        }
        PixelGrid {
            image: imageops::resize(&self.image, edge, edge, FilterType::Triangle),
        }
    }
}

/// Result of [`decode`]: pixels, or the reason the image goes unmoderated.
#[derive(Debug)]
pub enum DecodeOutcome {
    Decoded(PixelGrid),
    Skipped(DecodeError),
}

impl DecodeOutcome {
    pub fn is_decoded(&self) -> bool {
        matches!(self, DecodeOutcome::Decoded(_))
    }
}

/// Decode a JPEG payload into an RGB pixel grid.
pub fn decode(bytes: &[u8]) -> DecodeOutcome {
    if bytes.is_empty() {
        return DecodeOutcome::Skipped(DecodeError::Empty);
    }

    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => {}
        Ok(other) => {
            let name = other
                .extensions_str()
                .first()
                .copied()
                .unwrap_or("unknown")
                .to_string();
            return DecodeOutcome::Skipped(DecodeError::UnsupportedFormat(name));
        }
        Err(e) => return DecodeOutcome::Skipped(DecodeError::Corrupt(e.to_string())),
    }

    match image::load_from_memory_with_format(bytes, ImageFormat::Jpeg) {
        Ok(img) => DecodeOutcome::Decoded(PixelGrid {
            image: img.to_rgb8(),
        }),
        Err(e) => DecodeOutcome::Skipped(DecodeError::Corrupt(e.to_string())),
    }
}

//! Sticker conversion: any decodable image to a 512px WebP.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

/// Telegram stickers are 512px on their longest side.
pub const STICKER_EDGE: u32 = 512;

/// Re-encode `bytes` as a WebP sticker, scaled to fit `STICKER_EDGE`.
pub fn to_webp(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let scaled = img.resize(STICKER_EDGE, STICKER_EDGE, FilterType::Lanczos3);
    let rgba = DynamicImage::ImageRgba8(scaled.to_rgba8());

    let mut out = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)?;
    Ok(out)
}

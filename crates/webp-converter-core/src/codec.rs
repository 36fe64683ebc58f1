use image::codecs::webp::{WebPEncoder, WebPQuality};
use image::{ColorType, DynamicImage};

use crate::error::{Error, Result};

/// Largest width or height libwebp accepts
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Encodes raw image file bytes into the converter's target format
pub trait ImageCodec: Send + Sync {
    /// Extension given to output files, without the dot
    fn extension(&self) -> &str;

    /// Decode `bytes` and re-encode them. `quality` applies to lossy output
    /// only; both values are always handed to the encoder.
    fn encode(&self, bytes: &[u8], quality: u8, lossless: bool) -> Result<Vec<u8>>;
}

/// WebP encoder backed by the `image` crate (libwebp)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpCodec;

impl ImageCodec for WebpCodec {
    fn extension(&self) -> &str {
        "webp"
    }

    #[allow(deprecated)]
    fn encode(&self, bytes: &[u8], quality: u8, lossless: bool) -> Result<Vec<u8>> {
        let img = image::load_from_memory(bytes)?;
        let (width, height) = (img.width(), img.height());
        if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
            return Err(Error::Codec(format!(
                "image dimensions exceed WebP limit of {}px: {}x{}",
                WEBP_MAX_DIMENSION, width, height
            )));
        }

        let webp_quality = if lossless {
            WebPQuality::lossless()
        } else {
            WebPQuality::lossy(quality.min(100))
        };

        let mut output = Vec::new();
        let encoder = WebPEncoder::new_with_quality(&mut output, webp_quality);

        // libwebp only takes 8-bit RGB(A); keep alpha only when present
        if img.color().has_alpha() {
            let rgba = to_rgba(img);
            encoder.encode(rgba.as_raw(), width, height, ColorType::Rgba8)?;
        } else {
            let rgb = img.to_rgb8();
            encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8)?;
        }

        Ok(output)
    }
}

fn to_rgba(img: DynamicImage) -> image::RgbaImage {
    match img {
        DynamicImage::ImageRgba8(buffer) => buffer,
        other => other.to_rgba8(),
    }
}

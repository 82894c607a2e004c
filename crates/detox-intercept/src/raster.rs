//! Decode, black out and re-encode images

use crate::error::{InterceptError, Result};
use detox_guard::Rect;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat, Rgba};
use imageproc::drawing::draw_filled_rect_mut;
use std::io::Cursor;
use tracing::warn;

/// Media type used when the source type cannot be written back
pub const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

/// Formats we re-encode in their own type
const NATIVE_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// A decoded image being redacted
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image =
            image::load_from_memory(bytes).map_err(|e| InterceptError::Decode(e.to_string()))?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Fill every rectangle with an opaque `color`; returns how many were painted
    pub fn fill(&mut self, rects: &[Rect], color: [u8; 3]) -> usize {
        let (width, height) = (self.width(), self.height());
        let mut canvas = self.image.to_rgba8();
        let paint = Rgba([color[0], color[1], color[2], 255]);

        let mut painted = 0;
        for pixels in rects.iter().filter_map(|r| r.to_pixels(width, height)) {
            let rect = imageproc::rect::Rect::at(pixels.x as i32, pixels.y as i32)
                .of_size(pixels.width, pixels.height);
            draw_filled_rect_mut(&mut canvas, rect, paint);
            painted += 1;
        }

        self.image = DynamicImage::ImageRgba8(canvas);
        painted
    }

    /// Encode as `media_type`, or as JPEG when that type cannot be written.
    /// Returns the bytes and the media type actually produced.
    pub fn encode(&self, media_type: &str, jpeg_quality: u8) -> Result<(Vec<u8>, String)> {
        let format = ImageFormat::from_mime_type(media_type)
            .filter(|format| NATIVE_FORMATS.contains(format));

        match format {
            Some(ImageFormat::Jpeg) | None => {
                Ok((self.encode_jpeg(jpeg_quality)?, FALLBACK_MEDIA_TYPE.to_string()))
            }
            Some(format) => {
                let mut buffer = Cursor::new(Vec::new());
                match self.image.write_to(&mut buffer, format) {
                    Ok(()) => Ok((buffer.into_inner(), media_type.to_string())),
                    Err(e) => {
                        warn!(media_type = %media_type, error = %e, "Re-encoding as JPEG");
                        Ok((self.encode_jpeg(jpeg_quality)?, FALLBACK_MEDIA_TYPE.to_string()))
                    }
                }
            }
        }
    }

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        // JPEG has no alpha channel
        let rgb = self.image.to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| InterceptError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// RGBA value at `(x, y)`, `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.to_rgba8().get_pixel_checked(x, y).map(|p| p.0)
    }
}

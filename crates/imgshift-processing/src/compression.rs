use crate::generator::GenerateError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// JPEG quality used for every JPEG variant (and unknown extensions).
pub const JPEG_QUALITY: u8 = 90;

/// WebP quality. Variants are near-lossless copies of the original.
pub const WEBP_QUALITY: f32 = 100.0;

/// Output format for generated variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "gif" => Some(OutputFormat::Gif),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }

    /// Format implied by the extension of a storage key.
    ///
    /// Keys with no extension, or an unrecognised one, are written as JPEG.
    pub fn from_key(key: &str) -> Self {
        let file = key.rsplit('/').next().unwrap_or(key);
        file.rsplit_once('.')
            .and_then(|(_, ext)| Self::parse(ext))
            .unwrap_or(OutputFormat::Jpeg)
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn to_image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::WebP => ImageFormat::WebP,
        }
    }
}

/// Initial buffer size for a JPEG of the given dimensions, about 2 bits per pixel.
fn jpeg_capacity_hint(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize) / 4
}

/// Image encoder for the supported output formats
pub struct ImageCompressor;

impl ImageCompressor {
    /// Encode an image in the given format
    pub fn compress(img: &DynamicImage, format: OutputFormat) -> Result<Bytes, GenerateError> {
        match format {
            OutputFormat::Jpeg => Self::compress_jpeg(img),
            OutputFormat::Png => Self::compress_png(img),
            OutputFormat::Gif => Self::compress_gif(img),
            OutputFormat::WebP => Self::compress_webp(img),
        }
    }

    /// JPEG has no alpha channel, so the image is flattened to RGB first
    fn compress_jpeg(img: &DynamicImage) -> Result<Bytes, GenerateError> {
        let (width, height) = img.dimensions();
        let mut buffer = Vec::with_capacity(jpeg_capacity_hint(width, height));
        let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);

        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(encoder)
            .map_err(|e| GenerateError::Encode(format!("JPEG: {}", e)))?;

        Ok(Bytes::from(buffer))
    }

    /// Lossless PNG at the strongest compression level
    fn compress_png(img: &DynamicImage) -> Result<Bytes, GenerateError> {
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            CompressionType::Best,
            PngFilterType::Adaptive,
        );

        img.write_with_encoder(encoder)
            .map_err(|e| GenerateError::Encode(format!("PNG: {}", e)))?;

        Ok(Bytes::from(buffer))
    }

    fn compress_gif(img: &DynamicImage) -> Result<Bytes, GenerateError> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut cursor, ImageFormat::Gif)
            .map_err(|e| GenerateError::Encode(format!("GIF: {}", e)))?;

        Ok(Bytes::from(buffer))
    }

    fn compress_webp(img: &DynamicImage) -> Result<Bytes, GenerateError> {
        let (width, height) = img.dimensions();

        // Convert to RGBA for WebP encoding
        let rgba_img = img.to_rgba8();

        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = encoder.encode(WEBP_QUALITY);

        if webp_data.is_empty() {
            return Err(GenerateError::Encode(
                "WebP: encoder produced no output".to_string(),
            ));
        }

        Ok(Bytes::copy_from_slice(&webp_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_capacity_hint_large_dimensions() {
        assert_eq!(jpeg_capacity_hint(400, 200), 20_000);
        // 70000 * 70000 does not fit in a u32.
        assert_eq!(jpeg_capacity_hint(70_000, 70_000), 1_225_000_000);
        assert_eq!(jpeg_capacity_hint(0, u32::MAX), 0);
    }

    #[test]
    fn test_format_from_key() {
        assert_eq!(OutputFormat::from_key("2025/09/w300/photo.jpg"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_key("a/b.PNG"), OutputFormat::Png);
        assert_eq!(OutputFormat::from_key("a/b.gif"), OutputFormat::Gif);
        assert_eq!(OutputFormat::from_key("a/b.webp"), OutputFormat::WebP);
        assert_eq!(OutputFormat::from_key("a/noext"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_key("a.dir/noext"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_key("a/b.tiff"), OutputFormat::Jpeg);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(OutputFormat::Jpeg.to_mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::WebP.to_mime_type(), "image/webp");
    }

    #[test]
    fn test_compress_outputs_expected_container() {
        let img = DynamicImage::new_rgba8(16, 8);
        for format in [
            OutputFormat::Jpeg,
            OutputFormat::Png,
            OutputFormat::Gif,
            OutputFormat::WebP,
        ] {
            let data = ImageCompressor::compress(&img, format).unwrap();
            let guessed = image::guess_format(&data).unwrap();
            assert_eq!(guessed, format.to_image_format(), "format: {:?}", format);
        }
    }
}

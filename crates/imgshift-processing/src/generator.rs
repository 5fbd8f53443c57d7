//! Variant generation
//!
//! Decoding and encoding are CPU bound, so async callers go through
//! [`generate_blocking`], which runs the generator on tokio's blocking pool.

use crate::compression::{ImageCompressor, OutputFormat};
use crate::image::{decode, ImageResize};
use bytes::Bytes;
use image::GenericImageView;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Generation task failed: {0}")]
    Task(String),
}

/// What to produce from an original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSpec {
    /// Maximum width. `None` keeps the original dimensions.
    pub width: Option<u32>,
    pub format: OutputFormat,
}

impl VariantSpec {
    pub fn new(width: Option<u32>, format: OutputFormat) -> Self {
        Self { width, format }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedVariant {
    pub data: Bytes,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Turns original image bytes into a variant.
pub trait VariantGenerator: Send + Sync {
    fn generate(
        &self,
        original: &[u8],
        spec: &VariantSpec,
    ) -> Result<GeneratedVariant, GenerateError>;
}

/// Generator backed by the `image` and `webp` crates
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageGenerator;

impl VariantGenerator for ImageGenerator {
    fn generate(
        &self,
        original: &[u8],
        spec: &VariantSpec,
    ) -> Result<GeneratedVariant, GenerateError> {
        let start = std::time::Instant::now();
        let img = decode(original)?;
        let (orig_width, orig_height) = img.dimensions();

        let img = match spec.width {
            Some(max_width) => ImageResize::fit_to_width(img, max_width),
            None => img,
        };
        let (width, height) = img.dimensions();
        let data = ImageCompressor::compress(&img, spec.format)?;

        tracing::debug!(
            orig_width,
            orig_height,
            width,
            height,
            format = ?spec.format,
            input_bytes = original.len(),
            output_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Generated image variant"
        );

        Ok(GeneratedVariant {
            data,
            content_type: spec.format.to_mime_type(),
            width,
            height,
            format: spec.format,
        })
    }
}

/// Run a generator on the blocking thread pool.
pub async fn generate_blocking(
    generator: Arc<dyn VariantGenerator>,
    original: Bytes,
    spec: VariantSpec,
) -> Result<GeneratedVariant, GenerateError> {
    tokio::task::spawn_blocking(move || generator.generate(&original, &spec))
        .await
        .map_err(|e| GenerateError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn fixture(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    #[test]
    fn test_downscales_keeping_aspect_ratio() {
        let original = fixture(800, 600, ImageFormat::Jpeg);
        let variant = ImageGenerator
            .generate(&original, &VariantSpec::new(Some(300), OutputFormat::Jpeg))
            .unwrap();

        assert_eq!((variant.width, variant.height), (300, 225));
        assert_eq!(variant.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&variant.data).unwrap();
        assert_eq!(decoded.dimensions(), (300, 225));
    }

    #[test]
    fn test_never_upscales() {
        let original = fixture(200, 100, ImageFormat::Png);
        let variant = ImageGenerator
            .generate(&original, &VariantSpec::new(Some(300), OutputFormat::Png))
            .unwrap();
        assert_eq!((variant.width, variant.height), (200, 100));
    }

    #[test]
    fn test_webp_counterpart_keeps_dimensions() {
        let original = fixture(64, 32, ImageFormat::Png);
        let variant = ImageGenerator
            .generate(&original, &VariantSpec::new(None, OutputFormat::WebP))
            .unwrap();
        assert_eq!(variant.content_type, "image/webp");
        assert_eq!(image::guess_format(&variant.data).unwrap(), ImageFormat::WebP);
        assert_eq!((variant.width, variant.height), (64, 32));
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let result = ImageGenerator.generate(
            b"definitely not an image",
            &VariantSpec::new(Some(300), OutputFormat::Jpeg),
        );
        assert!(matches!(result, Err(GenerateError::Decode(_))));
    }

    #[tokio::test]
    async fn test_generate_blocking() {
        let original = Bytes::from(fixture(400, 400, ImageFormat::Png));
        let generator: Arc<dyn VariantGenerator> = Arc::new(ImageGenerator);
        let variant = generate_blocking(
            generator,
            original,
            VariantSpec::new(Some(100), OutputFormat::Png),
        )
        .await
        .unwrap();
        assert_eq!((variant.width, variant.height), (100, 100));
    }
}

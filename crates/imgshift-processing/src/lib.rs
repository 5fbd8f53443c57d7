//! Image variant generation: decode, downscale by width, re-encode.

pub mod compression;
pub mod generator;
pub mod image;

pub use compression::{ImageCompressor, OutputFormat, JPEG_QUALITY, WEBP_QUALITY};
pub use generator::{
    generate_blocking, GenerateError, GeneratedVariant, ImageGenerator, VariantGenerator,
    VariantSpec,
};
pub use self::image::{decode, ImageResize};

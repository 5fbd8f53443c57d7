mod resize;

pub use resize::ImageResize;

use crate::generator::GenerateError;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

/// Decode image bytes, guessing the format from the content.
pub fn decode(data: &[u8]) -> Result<DynamicImage, GenerateError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| GenerateError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| GenerateError::Decode(e.to_string()))?;
    Ok(img)
}

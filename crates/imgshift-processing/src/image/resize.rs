use image::{DynamicImage, GenericImageView};

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Dimensions for fitting `orig_width` into `max_width`, keeping the aspect ratio.
    ///
    /// Returns `None` when the image is already narrow enough (images are never upscaled).
    pub fn fit_width(orig_width: u32, orig_height: u32, max_width: u32) -> Option<(u32, u32)> {
        if max_width == 0 || orig_width <= max_width {
            return None;
        }
        let aspect_ratio = orig_height as f64 / orig_width as f64;
        let height = (max_width as f64 * aspect_ratio).round() as u32;
        Some((max_width, height.max(1)))
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> image::imageops::FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            image::imageops::FilterType::Triangle
        } else if max_ratio > 1.5 {
            image::imageops::FilterType::CatmullRom
        } else {
            image::imageops::FilterType::Lanczos3
        }
    }

    /// Downscale to at most `max_width` pixels wide. Narrower images are returned as-is.
    pub fn fit_to_width(img: DynamicImage, max_width: u32) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        match Self::fit_width(orig_width, orig_height, max_width) {
            Some((width, height)) => {
                let filter = Self::select_filter(orig_width, orig_height, width, height);
                img.resize_exact(width, height, filter)
            }
            None => img,
        }
    }
}

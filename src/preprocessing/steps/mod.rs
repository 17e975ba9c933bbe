//! Individual image transforms
//!
//! Each step consumes a buffer and returns a new one; none of them mutate
//! shared state.

pub mod brightness;
pub mod colorspace;
pub mod denoise;
pub mod grayscale;
pub mod normalize;
pub mod resize;
pub mod sharpen;

use image::DynamicImage;

/// Collapse any buffer into one of the four 8-bit layouts, keeping alpha if present.
pub(crate) fn into_8bit(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => image,
        other => {
            let color = other.color();
            match (color.has_color(), color.has_alpha()) {
                (false, false) => DynamicImage::ImageLuma8(other.to_luma8()),
                (false, true) => DynamicImage::ImageLumaA8(other.to_luma_alpha8()),
                (true, false) => DynamicImage::ImageRgb8(other.to_rgb8()),
                (true, true) => DynamicImage::ImageRgba8(other.to_rgba8()),
            }
        }
    }
}

use crate::error::PreprocessError;
use image::DynamicImage;

/// Collapse to a single 8-bit luma channel (alpha is discarded)
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PreprocessError> {
    match image {
        DynamicImage::ImageLuma8(_) => Ok(image),
        other => Ok(DynamicImage::ImageLuma8(other.to_luma8())),
    }
}

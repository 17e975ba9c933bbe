use crate::error::PreprocessError;
use image::DynamicImage;

/// Force 8-bit sRGB and drop any alpha channel
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PreprocessError> {
    match image {
        DynamicImage::ImageRgb8(_) => Ok(image),
        other => Ok(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgba, RgbaImage};

    #[test]
    fn test_drops_alpha() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 0]));
        let result = apply(DynamicImage::ImageRgba8(img)).unwrap();
        assert!(!result.color().has_alpha());
        assert_eq!(result.color().channel_count(), 3);
        assert_eq!(result.to_rgb8().get_pixel(1, 1).0, [1, 2, 3]);
    }

    #[test]
    fn test_expands_gray_to_rgb() {
        let img = GrayImage::new(5, 4);
        let result = apply(DynamicImage::ImageLuma8(img)).unwrap();
        assert!(matches!(result, DynamicImage::ImageRgb8(_)));
        assert_eq!((result.width(), result.height()), (5, 4));
    }
}

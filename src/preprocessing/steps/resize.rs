use crate::error::PreprocessError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Width that keeps the aspect ratio when the height becomes `target_height`
pub fn width_for_height(width: u32, height: u32, target_height: u32) -> u32 {
    if height == 0 {
        return width.max(1);
    }
    let scaled = (width as f64 * target_height as f64 / height as f64).round();
    (scaled as u32).max(1)
}

/// Largest height not above `target_height` whose aspect-preserving resize
/// stays within `max_pixels`. Never below 1.
pub fn height_within_pixels(width: u32, height: u32, target_height: u32, max_pixels: u64) -> u32 {
    let pixels = |h: u32| width_for_height(width, height, h) as u64 * h as u64;
    if pixels(target_height) <= max_pixels {
        return target_height;
    }

    // Pixel count grows with the square of the height
    let aspect = width.max(1) as f64 / height.max(1) as f64;
    let mut bounded = ((max_pixels as f64 / aspect).sqrt().floor() as u32).clamp(1, target_height);
    while bounded > 1 && pixels(bounded) > max_pixels {
        bounded -= 1;
    }
    bounded
}

/// Resize so the height equals `target_height`, preserving aspect ratio.
/// Uses Lanczos3 in both directions.
pub fn to_height(image: DynamicImage, target_height: u32) -> Result<DynamicImage, PreprocessError> {
    if target_height == 0 {
        return Err(PreprocessError::Transform(
            "Resize target height must be positive".to_string(),
        ));
    }

    let (width, height) = image.dimensions();
    if height == target_height {
        return Ok(image);
    }

    let new_width = width_for_height(width, height, target_height);
    tracing::debug!(
        "Resizing {}x{} -> {}x{}",
        width,
        height,
        new_width,
        target_height
    );
    Ok(image.resize_exact(new_width, target_height, FilterType::Lanczos3))
}

/// Shrink the image to fit inside a `max_side` square. Smaller images are returned untouched.
pub fn fit_within(image: &DynamicImage, max_side: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_side && height <= max_side {
        return image.clone();
    }
    image.resize(max_side, max_side, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_resize_upscales_to_height() {
        let img = GrayImage::new(200, 800);
        let result = to_height(DynamicImage::ImageLuma8(img), 1500).unwrap();
        assert_eq!(result.height(), 1500);
        assert_eq!(result.width(), 375);
    }

    #[test]
    fn test_resize_downscales_preserving_aspect() {
        let img = GrayImage::new(1000, 2500);
        let result = to_height(DynamicImage::ImageLuma8(img), 1920).unwrap();
        assert_eq!(result.height(), 1920);
        assert_eq!(result.width(), 768);
    }

    #[test]
    fn test_resize_same_height_is_noop() {
        let img = GrayImage::new(10, 1920);
        let result = to_height(DynamicImage::ImageLuma8(img), 1920).unwrap();
        assert_eq!(result.dimensions(), (10, 1920));
    }

    #[test]
    fn test_fit_within_only_shrinks() {
        let small = DynamicImage::ImageLuma8(GrayImage::new(120, 80));
        assert_eq!(fit_within(&small, 500).dimensions(), (120, 80));

        let tall = DynamicImage::ImageLuma8(GrayImage::new(400, 1600));
        let fitted = fit_within(&tall, 500);
        assert_eq!(fitted.height(), 500);
        assert_eq!(fitted.width(), 125);
    }

    #[test]
    fn test_height_within_pixels_caps_wide_strips() {
        assert_eq!(height_within_pixels(1080, 1920, 1920, 12_000_000), 1920);

        let bounded = height_within_pixels(8000, 8, 1500, 12_000_000);
        assert!(bounded < 1500);
        assert!(width_for_height(8000, 8, bounded) as u64 * bounded as u64 <= 12_000_000);

        assert_eq!(height_within_pixels(u32::MAX, 1, 1500, 10), 1);
    }

    #[test]
    fn test_width_never_zero() {
        assert_eq!(width_for_height(1, 5000, 10), 1);
    }
}

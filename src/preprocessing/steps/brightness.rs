use super::into_8bit;
use crate::error::PreprocessError;
use image::{DynamicImage, ImageBuffer, Pixel};

/// Multiply every colour sample by `factor`. Alpha is left alone and hue is
/// unchanged, so saturation stays at 1.0.
pub fn apply(image: DynamicImage, factor: f32) -> Result<DynamicImage, PreprocessError> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(PreprocessError::Transform(format!(
            "Invalid brightness factor: {}",
            factor
        )));
    }
    if factor == 1.0 {
        return Ok(image);
    }

    let modulated = match into_8bit(image) {
        DynamicImage::ImageLuma8(mut buf) => {
            scale(&mut buf, factor);
            DynamicImage::ImageLuma8(buf)
        }
        DynamicImage::ImageLumaA8(mut buf) => {
            scale(&mut buf, factor);
            DynamicImage::ImageLumaA8(buf)
        }
        DynamicImage::ImageRgb8(mut buf) => {
            scale(&mut buf, factor);
            DynamicImage::ImageRgb8(buf)
        }
        DynamicImage::ImageRgba8(mut buf) => {
            scale(&mut buf, factor);
            DynamicImage::ImageRgba8(buf)
        }
        other => other,
    };

    Ok(modulated)
}

fn scale<P>(buf: &mut ImageBuffer<P, Vec<u8>>, factor: f32)
where
    P: Pixel<Subpixel = u8>,
{
    for pixel in buf.pixels_mut() {
        pixel.apply_without_alpha(|v| (v as f32 * factor).round().clamp(0.0, 255.0) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_brightness_increases() {
        let img = GrayImage::from_pixel(4, 4, Luma([100]));
        let result = apply(DynamicImage::ImageLuma8(img), 1.3).unwrap();
        assert_eq!(result.to_luma8().get_pixel(0, 0).0[0], 130);
    }

    #[test]
    fn test_brightness_clamps_at_white() {
        let img = GrayImage::from_pixel(4, 4, Luma([250]));
        let result = apply(DynamicImage::ImageLuma8(img), 1.3).unwrap();
        assert_eq!(result.to_luma8().get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_brightness_keeps_alpha() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 40, 77]));
        let result = apply(DynamicImage::ImageRgba8(img), 0.85).unwrap();
        let px = result.to_rgba8().get_pixel(0, 0).0;
        assert_eq!(px, [170, 85, 34, 77]);
    }

    #[test]
    fn test_negative_factor_rejected() {
        let img = GrayImage::new(2, 2);
        assert!(apply(DynamicImage::ImageLuma8(img), -1.0).is_err());
    }
}

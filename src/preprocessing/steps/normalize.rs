use super::into_8bit;
use crate::error::PreprocessError;
use image::{DynamicImage, GrayImage, ImageBuffer, Pixel};

/// Fraction of pixels clipped at each end of the histogram
const CLIP_FRACTION: f64 = 0.01;

/// Normalize contrast with a histogram stretch.
///
/// The 1st and 99th luma percentiles are mapped to 0 and 255 and the same
/// linear map is applied to every colour channel, so hue is preserved.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PreprocessError> {
    let image = into_8bit(image);
    let (low, high) = percentile_bounds(&image.to_luma8());

    // Avoid division by zero on uniform images
    if high <= low {
        return Ok(image);
    }

    let range = (high - low) as f32;
    let lut: Vec<u8> = (0..=255u16)
        .map(|v| {
            let stretched = (v as f32 - low as f32) / range * 255.0;
            stretched.round().clamp(0.0, 255.0) as u8
        })
        .collect();

    let stretched = match image {
        DynamicImage::ImageLuma8(mut buf) => {
            remap(&mut buf, &lut);
            DynamicImage::ImageLuma8(buf)
        }
        DynamicImage::ImageLumaA8(mut buf) => {
            remap(&mut buf, &lut);
            DynamicImage::ImageLumaA8(buf)
        }
        DynamicImage::ImageRgb8(mut buf) => {
            remap(&mut buf, &lut);
            DynamicImage::ImageRgb8(buf)
        }
        DynamicImage::ImageRgba8(mut buf) => {
            remap(&mut buf, &lut);
            DynamicImage::ImageRgba8(buf)
        }
        other => other,
    };

    Ok(stretched)
}

fn remap<P>(buf: &mut ImageBuffer<P, Vec<u8>>, lut: &[u8])
where
    P: Pixel<Subpixel = u8>,
{
    for pixel in buf.pixels_mut() {
        pixel.apply_without_alpha(|v| lut[v as usize]);
    }
}

/// Luma values at the lower and upper clip percentiles
fn percentile_bounds(gray: &GrayImage) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return (0, 0);
    }

    let clip = ((total as f64 * CLIP_FRACTION).floor() as u64).max(1);

    let mut low = 0u8;
    let mut seen = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= clip {
            low = value as u8;
            break;
        }
    }

    let mut high = 255u8;
    seen = 0;
    for (value, &count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen >= clip {
            high = value as u8;
            break;
        }
    }

    (low, high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn find_min_max(img: &GrayImage) -> (u8, u8) {
        img.pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])))
    }

    #[test]
    fn test_normalize_stretches_histogram() {
        // Create a low-contrast image (values 50-185)
        let img = GrayImage::from_fn(10, 10, |x, _| {
            let val = 50 + (x as u8 * 15).min(150);
            Luma([val])
        });

        let result = apply(DynamicImage::ImageLuma8(img)).unwrap();
        let (min, max) = find_min_max(&result.to_luma8());

        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_normalize_handles_uniform_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));

        let result = apply(DynamicImage::ImageLuma8(img)).unwrap();

        // Should return unchanged (no division by zero)
        assert_eq!(result.to_luma8().get_pixel(0, 0).0[0], 128);
    }

    #[test]
    fn test_normalize_keeps_colour() {
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                Rgb([60, 80, 100])
            } else {
                Rgb([120, 140, 160])
            }
        });

        let result = apply(DynamicImage::ImageRgb8(img)).unwrap();
        assert!(matches!(result, DynamicImage::ImageRgb8(_)));
        let rgb = result.to_rgb8();
        let dark = rgb.get_pixel(0, 0).0;
        let light = rgb.get_pixel(9, 0).0;
        // Channels keep their ordering and spread further apart
        assert!(dark[0] < dark[2]);
        assert!(light[2] as i32 - dark[2] as i32 > 60);
    }
}

use super::into_8bit;
use crate::config::SharpenParams;
use crate::error::PreprocessError;
use image::{DynamicImage, ImageBuffer, Pixel};
use imageproc::filter::gaussian_blur_f32;

/// Differences up to this value count as "flat" and get the `m1` amount
const FLAT_THRESHOLD: f32 = 2.0;

/// Unsharp mask: `out = in + k * (in - blur(in, sigma))`
///
/// `k` is `m1` in flat areas and `m2` across edges, so texture and edges can
/// be sharpened by different amounts.
pub fn apply(image: DynamicImage, params: SharpenParams) -> Result<DynamicImage, PreprocessError> {
    if params.sigma.is_nan() || params.sigma <= 0.0 {
        return Err(PreprocessError::Transform(format!(
            "Sharpen sigma must be positive, got {}",
            params.sigma
        )));
    }

    let sharpened = match into_8bit(image) {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(unsharp(&buf, 1, params)?),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(unsharp(&buf, 1, params)?),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(unsharp(&buf, 3, params)?),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(unsharp(&buf, 3, params)?),
        other => other,
    };

    Ok(sharpened)
}

fn unsharp<P>(
    buf: &ImageBuffer<P, Vec<u8>>,
    color_channels: usize,
    params: SharpenParams,
) -> Result<ImageBuffer<P, Vec<u8>>, PreprocessError>
where
    P: Pixel<Subpixel = u8>,
{
    let blurred = gaussian_blur_f32(buf, params.sigma);
    let stride = P::CHANNEL_COUNT as usize;

    let original = buf.as_raw();
    let mut out = original.clone();
    for (i, (value, blur)) in out.iter_mut().zip(blurred.as_raw()).enumerate() {
        if i % stride >= color_channels {
            continue;
        }
        let v = *value as f32;
        let detail = v - *blur as f32;
        let amount = if detail.abs() <= FLAT_THRESHOLD {
            params.m1
        } else {
            params.m2
        };
        *value = (v + amount * detail).round().clamp(0.0, 255.0) as u8;
    }

    ImageBuffer::from_raw(buf.width(), buf.height(), out)
        .ok_or_else(|| PreprocessError::Transform("Sharpen produced a short buffer".to_string()))
}

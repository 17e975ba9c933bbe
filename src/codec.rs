//! Boundary to the image codec: decoding, metadata, channel statistics and encoding.
//!
//! Everything above this module works on `DynamicImage` values and never
//! touches encoded bytes directly.

use crate::error::PreprocessError;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::io::Cursor;

/// Metadata captured when the source bytes are decoded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    #[serde(serialize_with = "serialize_format")]
    pub format: ImageFormat,
    pub channels: u8,
    pub has_alpha: bool,
    /// Raw EXIF orientation tag (1-8), if the container carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,
}

/// A decoded source image and the metadata read alongside it
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub metadata: ImageMetadata,
}

/// Mean and standard deviation of one 8-bit channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Short lower-case name of a format ("png", "jpg", ...)
pub fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("unknown")
}

fn serialize_format<S: Serializer>(format: &ImageFormat, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(format_name(*format))
}

/// Sniff the format from magic bytes, decode the pixels and read EXIF orientation.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, PreprocessError> {
    let format = image::guess_format(bytes)
        .map_err(|e| PreprocessError::Decode(format!("Unrecognized image data: {}", e)))?;

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let color = image.color();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::Decode("Image has no pixels".to_string()));
    }

    let metadata = ImageMetadata {
        width,
        height,
        format,
        channels: color.channel_count(),
        has_alpha: color.has_alpha(),
        orientation: read_orientation(bytes),
    };

    tracing::debug!(
        "Decoded {} image {}x{} ({} channels, orientation {:?})",
        format_name(format),
        width,
        height,
        metadata.channels,
        metadata.orientation
    );

    Ok(DecodedImage { image, metadata })
}

/// Read EXIF tag 0x0112 (Orientation) from raw container bytes.
pub fn read_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
}

/// Per-channel statistics over every channel of the buffer, alpha included.
pub fn channel_statistics(image: &DynamicImage) -> Vec<ChannelStats> {
    let color = image.color();
    let (samples, stride): (Cow<'_, [u8]>, usize) = match image {
        DynamicImage::ImageLuma8(buf) => (Cow::Borrowed(buf.as_raw().as_slice()), 1),
        DynamicImage::ImageLumaA8(buf) => (Cow::Borrowed(buf.as_raw().as_slice()), 2),
        DynamicImage::ImageRgb8(buf) => (Cow::Borrowed(buf.as_raw().as_slice()), 3),
        DynamicImage::ImageRgba8(buf) => (Cow::Borrowed(buf.as_raw().as_slice()), 4),
        _ => match (color.has_color(), color.has_alpha()) {
            (false, false) => (Cow::Owned(image.to_luma8().into_raw()), 1),
            (false, true) => (Cow::Owned(image.to_luma_alpha8().into_raw()), 2),
            (true, false) => (Cow::Owned(image.to_rgb8().into_raw()), 3),
            (true, true) => (Cow::Owned(image.to_rgba8().into_raw()), 4),
        },
    };
    let mut sums = vec![0u64; stride];
    let mut sums_sq = vec![0u64; stride];
    let mut count = 0u64;

    for pixel in samples.chunks_exact(stride) {
        for (c, &value) in pixel.iter().enumerate() {
            let v = value as u64;
            sums[c] += v;
            sums_sq[c] += v * v;
        }
        count += 1;
    }

    if count == 0 {
        return vec![
            ChannelStats {
                mean: 0.0,
                stdev: 0.0
            };
            stride
        ];
    }

    let n = count as f64;
    sums.iter()
        .zip(&sums_sq)
        .map(|(&sum, &sum_sq)| {
            let mean = sum as f64 / n;
            let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
            ChannelStats {
                mean,
                stdev: variance.sqrt(),
            }
        })
        .collect()
}

/// Encode a buffer into the given container format.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, PreprocessError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).map_err(|e| {
        PreprocessError::Transform(format!("Failed to encode {}: {}", format_name(format), e))
    })?;
    Ok(out.into_inner())
}

/// Read the dimensions of encoded bytes without decoding the pixel data.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32), PreprocessError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| PreprocessError::Decode(e.to_string()))
}

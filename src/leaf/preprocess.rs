//! Image decoding and model-input preparation.
//!
//! Arbitrary JPEG/PNG/WebP bytes go in; an upright `RgbImage` comes out
//! (EXIF orientation applied), and from that a fixed `[1, 224, 224, 3]`
//! float tensor scaled to [0, 1].

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::debug;

use super::LeafError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Side length of the square classifier input.
pub const MODEL_INPUT_SIZE: u32 = 224;

/// Colour channels in the classifier input.
pub const MODEL_INPUT_CHANNELS: usize = 3;

/// Feature extraction works on at most this many pixels per side.
pub const FEATURE_MAX_DIM: u32 = 2048;

/// Maximum input image size (in bytes) before rejecting.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Nothing shorter can carry a decodable image header.
const MIN_IMAGE_BYTES: usize = 16;

// ═══════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), LeafError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(LeafError::InvalidImage(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(LeafError::InvalidImage(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Decode to upright RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, LeafError> {
    validate_image_bytes(bytes)?;
    let img =
        image::load_from_memory(bytes).map_err(|e| LeafError::ImageDecode(e.to_string()))?;
    let img = apply_orientation(img, read_exif_orientation(bytes));
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(LeafError::InvalidImage("Image has no pixels".into()));
    }
    Ok(rgb)
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Shrink so the longest side is at most `max_dim`.
/// Uses `Cow` to avoid cloning when no downscale is needed.
pub fn pre_downscale(img: &RgbImage, max_dim: u32) -> Cow<'_, RgbImage> {
    let (w, h) = (img.width(), img.height());
    let largest = w.max(h);

    if largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Downscaling oversized image"
    );

    Cow::Owned(image::imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

// ═══════════════════════════════════════════════════════════
// Model input
// ═══════════════════════════════════════════════════════════

/// NHWC float tensor, batch size 1, values in [0, 1].
#[derive(Debug, Clone)]
pub struct InputTensor {
    pub data: Vec<f32>,
}

impl InputTensor {
    pub const SHAPE: [usize; 4] = [
        1,
        MODEL_INPUT_SIZE as usize,
        MODEL_INPUT_SIZE as usize,
        MODEL_INPUT_CHANNELS,
    ];

    pub fn len() -> usize {
        Self::SHAPE.iter().product()
    }

    /// All-zero input, used to warm up a freshly loaded model.
    pub fn zeros() -> Self {
        Self {
            data: vec![0.0; Self::len()],
        }
    }
}

/// Bilinear resize to 224×224 (aspect ratio not preserved) and scale to [0, 1].
pub fn to_input_tensor(img: &RgbImage) -> InputTensor {
    let resized = image::imageops::resize(
        img,
        MODEL_INPUT_SIZE,
        MODEL_INPUT_SIZE,
        FilterType::Triangle,
    );
    let data = resized
        .as_raw()
        .iter()
        .map(|&v| f32::from(v) / 255.0)
        .collect();
    InputTensor { data }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb};

    /// Encode a solid-colour image as PNG.
    pub(crate) fn make_test_image(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(width, height, Rgb(color)))
    }

    pub(crate) fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn decode_png_keeps_dimensions() {
        let bytes = make_test_image(300, 120, [10, 200, 30]);
        let img = decode_image(&bytes).unwrap();
        assert_eq!(img.dimensions(), (300, 120));
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 200, 30]));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_image(b"definitely not an image, just text bytes").unwrap_err();
        assert!(matches!(err, LeafError::ImageDecode(_)));
    }

    #[test]
    fn validate_rejects_tiny_input() {
        assert!(matches!(
            validate_image_bytes(&[0xFF, 0xD8]),
            Err(LeafError::InvalidImage(_))
        ));
    }

    #[test]
    fn exif_orientation_defaults_to_normal() {
        let bytes = make_test_image(4, 4, [0, 0, 0]);
        assert_eq!(read_exif_orientation(&bytes), 1);
    }

    #[test]
    fn orientation_six_rotates_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 10));
        let rotated = apply_orientation(img, 6);
        assert_eq!(rotated.to_rgb8().dimensions(), (10, 40));
    }

    #[test]
    fn tensor_has_fixed_shape_and_range() {
        let img = RgbImage::from_pixel(500, 90, Rgb([255, 128, 0]));
        let tensor = to_input_tensor(&img);
        assert_eq!(tensor.data.len(), 224 * 224 * 3);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((tensor.data[0] - 1.0).abs() < 1e-6);
        assert!(tensor.data[2].abs() < 1e-6);
    }

    #[test]
    fn pre_downscale_borrows_small_images() {
        let img = RgbImage::new(100, 50);
        assert!(matches!(pre_downscale(&img, FEATURE_MAX_DIM), Cow::Borrowed(_)));
    }

    #[test]
    fn pre_downscale_caps_longest_side() {
        let img = RgbImage::new(4096, 1024);
        let scaled = pre_downscale(&img, FEATURE_MAX_DIM);
        assert_eq!(scaled.dimensions(), (2048, 512));
    }
}

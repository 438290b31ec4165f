//! Advisory capture-quality check. Never blocks validation.

use image::RgbImage;

use super::preprocess::decode_image;
use super::QualityAssessment;

pub const MIN_BRIGHTNESS: f64 = 50.0;
pub const MAX_BRIGHTNESS: f64 = 200.0;
pub const MIN_DIMENSION: u32 = 200;

pub const MSG_TOO_DARK: &str = "Image appears too dark. Try better lighting.";
pub const MSG_OVEREXPOSED: &str = "Image appears overexposed. Reduce direct lighting.";
pub const MSG_LOW_RESOLUTION: &str = "Image resolution is too low. Move closer to the leaf.";
pub const MSG_GOOD_QUALITY: &str = "Image quality is good for analysis.";
pub const MSG_RECAPTURE: &str = "Image could not be read. Please capture the photo again.";

/// Decode and assess. Unreadable input is reported as not acceptable.
pub fn assess_quality(bytes: &[u8]) -> QualityAssessment {
    match decode_image(bytes) {
        Ok(img) => assess_image(&img),
        Err(e) => {
            tracing::debug!("Quality check on unreadable image: {e}");
            QualityAssessment {
                acceptable: false,
                suggestions: vec![MSG_RECAPTURE.to_string()],
            }
        }
    }
}

pub fn assess_image(img: &RgbImage) -> QualityAssessment {
    let mut suggestions = Vec::new();

    let brightness = mean_brightness(img);
    if brightness < MIN_BRIGHTNESS {
        suggestions.push(MSG_TOO_DARK.to_string());
    }
    if brightness > MAX_BRIGHTNESS {
        suggestions.push(MSG_OVEREXPOSED.to_string());
    }
    if img.width() < MIN_DIMENSION || img.height() < MIN_DIMENSION {
        suggestions.push(MSG_LOW_RESOLUTION.to_string());
    }

    let acceptable = suggestions.is_empty();
    if acceptable {
        suggestions.push(MSG_GOOD_QUALITY.to_string());
    }

    QualityAssessment {
        acceptable,
        suggestions,
    }
}

/// Mean of per-pixel `(r + g + b) / 3`.
fn mean_brightness(img: &RgbImage) -> f64 {
    let pixels = u64::from(img.width()) * u64::from(img.height());
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = img
        .pixels()
        .map(|p| u64::from(p.0[0]) + u64::from(p.0[1]) + u64::from(p.0[2]))
        .sum();
    total as f64 / 3.0 / pixels as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::preprocess::tests::make_test_image;
    use image::Rgb;

    #[test]
    fn well_lit_200px_image_is_acceptable() {
        let result = assess_image(&RgbImage::from_pixel(200, 200, Rgb([90, 140, 70])));
        assert!(result.acceptable);
        assert_eq!(result.suggestions, vec![MSG_GOOD_QUALITY.to_string()]);
    }

    #[test]
    fn one_pixel_short_is_flagged() {
        let result = assess_image(&RgbImage::from_pixel(199, 199, Rgb([90, 140, 70])));
        assert!(!result.acceptable);
        assert_eq!(result.suggestions, vec![MSG_LOW_RESOLUTION.to_string()]);
    }

    #[test]
    fn dark_image_is_flagged() {
        let result = assess_image(&RgbImage::from_pixel(300, 300, Rgb([10, 20, 15])));
        assert!(!result.acceptable);
        assert_eq!(result.suggestions, vec![MSG_TOO_DARK.to_string()]);
    }

    #[test]
    fn overexposed_small_image_collects_both_suggestions() {
        let result = assess_image(&RgbImage::from_pixel(100, 300, Rgb([250, 250, 250])));
        assert!(!result.acceptable);
        assert_eq!(
            result.suggestions,
            vec![MSG_OVEREXPOSED.to_string(), MSG_LOW_RESOLUTION.to_string()]
        );
    }

    #[test]
    fn assessment_is_idempotent() {
        let bytes = make_test_image(320, 240, [60, 160, 50]);
        let first = assess_quality(&bytes);
        let second = assess_quality(&bytes);
        assert_eq!(first, second);
        assert!(first.acceptable);
    }

    #[test]
    fn unreadable_bytes_are_not_acceptable() {
        let result = assess_quality(b"this is plain text, not a photograph");
        assert!(!result.acceptable);
        assert_eq!(result.suggestions, vec![MSG_RECAPTURE.to_string()]);
    }
}

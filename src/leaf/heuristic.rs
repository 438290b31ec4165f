//! Deterministic fallback classifier over raw pixel statistics.
//!
//! Four features, each scored into [0, 1], are blended with fixed weights.
//! Nothing here depends on the model, so the fallback path behaves the same
//! whether the classifier never loaded or failed mid-inference.

use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use super::preprocess::{pre_downscale, FEATURE_MAX_DIM};
use super::{ValidationMethod, ValidationResult, MSG_LEAF_FALLBACK, MSG_NOT_LEAF};

const GREEN_MIN_CHANNEL: u8 = 80;
const EDGE_INTENSITY_DELTA: f32 = 30.0;
/// Edge count at which the edge score saturates, as a fraction of all pixels.
const EDGE_SATURATION_FRACTION: f32 = 0.1;
const ASPECT_MIN: f32 = 1.5;
const ASPECT_MAX: f32 = 4.0;
const ASPECT_CENTER: f32 = 2.5;

const WEIGHT_GREEN: f32 = 0.4;
const WEIGHT_EDGE: f32 = 0.3;
const WEIGHT_ASPECT: f32 = 0.2;
const WEIGHT_VARIANCE: f32 = 0.1;

pub const ACCEPT_THRESHOLD: f32 = 0.6;
pub const MAX_FALLBACK_CONFIDENCE: f32 = 0.85;

/// Scored leaf features, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeafFeatures {
    pub green_ratio: f32,
    pub edge_density: f32,
    pub aspect_score: f32,
    pub color_variance: f32,
}

impl LeafFeatures {
    pub fn combined_score(&self) -> f32 {
        WEIGHT_GREEN * self.green_ratio
            + WEIGHT_EDGE * self.edge_density
            + WEIGHT_ASPECT * self.aspect_score
            + WEIGHT_VARIANCE * self.color_variance
    }
}

/// Extract features. Oversized images are downscaled first; the aspect
/// score always uses the original dimensions.
pub fn analyze_features(img: &RgbImage) -> LeafFeatures {
    let aspect_score = aspect_score(img.width(), img.height());
    let img = pre_downscale(img, FEATURE_MAX_DIM);

    let (green_ratio, color_variance) = color_features(&img);
    let edge_density = edge_density(&img);

    LeafFeatures {
        green_ratio,
        edge_density,
        aspect_score,
        color_variance,
    }
}

/// Accept above the threshold with a bounded confidence, otherwise reject.
pub fn decide(features: &LeafFeatures) -> ValidationResult {
    let combined = features.combined_score();
    if combined > ACCEPT_THRESHOLD {
        ValidationResult::new(
            true,
            combined.clamp(ACCEPT_THRESHOLD, MAX_FALLBACK_CONFIDENCE),
            MSG_LEAF_FALLBACK,
            ValidationMethod::Heuristic,
        )
    } else {
        ValidationResult::new(
            false,
            1.0 - combined,
            MSG_NOT_LEAF,
            ValidationMethod::Heuristic,
        )
    }
}

pub fn classify(img: &RgbImage) -> ValidationResult {
    let features = analyze_features(img);
    debug!(
        green = features.green_ratio,
        edges = features.edge_density,
        aspect = features.aspect_score,
        variance = features.color_variance,
        combined = features.combined_score(),
        "Heuristic leaf features"
    );
    decide(&features)
}

/// 1 inside [1.5, 4], decaying linearly away from 2.5 outside it.
pub fn aspect_score(width: u32, height: u32) -> f32 {
    let long = width.max(height) as f32;
    let short = width.min(height).max(1) as f32;
    let ratio = long / short;
    if (ASPECT_MIN..=ASPECT_MAX).contains(&ratio) {
        1.0
    } else {
        (1.0 - (ratio - ASPECT_CENTER).abs() / ASPECT_CENTER).max(0.0)
    }
}

/// Green-dominant pixel fraction (scored ×2) and RGB standard deviation
/// (normalised to [0, 1], scored ×3).
fn color_features(img: &RgbImage) -> (f32, f32) {
    let total = u64::from(img.width()) * u64::from(img.height());
    if total == 0 {
        return (0.0, 0.0);
    }

    let mut green_pixels = 0u64;
    let mut sums = [0f64; 3];
    for px in img.pixels() {
        let [r, g, b] = px.0;
        if g > r && g > b && g > GREEN_MIN_CHANNEL {
            green_pixels += 1;
        }
        sums[0] += f64::from(r);
        sums[1] += f64::from(g);
        sums[2] += f64::from(b);
    }

    let n = total as f64;
    let means = [sums[0] / n, sums[1] / n, sums[2] / n];
    let mut squared = 0f64;
    for px in img.pixels() {
        for (channel, mean) in px.0.iter().zip(means.iter()) {
            let d = f64::from(*channel) - mean;
            squared += d * d;
        }
    }
    let variance = (squared / (3.0 * n)).sqrt() / 255.0;

    let green_fraction = green_pixels as f64 / n;
    (
        (green_fraction * 2.0).min(1.0) as f32,
        (variance * 3.0).min(1.0) as f32,
    )
}

/// Interior pixels whose mean intensity jumps by more than 30 to the
/// right or bottom neighbour, relative to 10% of the pixel count.
fn edge_density(img: &RgbImage) -> f32 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let intensity = |x: u32, y: u32| -> f32 {
        let [r, g, b] = img.get_pixel(x, y).0;
        (f32::from(r) + f32::from(g) + f32::from(b)) / 3.0
    };

    let mut edges = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let current = intensity(x, y);
            if (current - intensity(x + 1, y)).abs() > EDGE_INTENSITY_DELTA
                || (current - intensity(x, y + 1)).abs() > EDGE_INTENSITY_DELTA
            {
                edges += 1;
            }
        }
    }

    let saturation = EDGE_SATURATION_FRACTION * (w as f32) * (h as f32);
    (edges as f32 / saturation).min(1.0)
}

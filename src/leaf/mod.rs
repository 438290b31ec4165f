//! Sugarcane leaf validation engine.
//!
//! Decides whether a photo plausibly shows a sugarcane leaf. A learned
//! classifier is tried first; when it is unavailable or misbehaves the
//! engine degrades to a deterministic pixel-statistics heuristic. Errors
//! from the model layer never reach the caller: every call ends in an
//! accept/reject decision.

pub mod classifier;
pub mod engine;
pub mod heuristic;
pub mod preprocess;
pub mod quality;

pub use classifier::{
    default_loader, ClassProbabilities, LeafClassifier, ModelLoader, UnavailableModelLoader,
};
pub use engine::{EngineStatus, LeafValidator, LoadState, ValidationStrategy};
pub use quality::assess_quality;

use serde::Serialize;
use thiserror::Error;

/// Model accept threshold for the "successful" message.
pub const HIGH_CONFIDENCE: f32 = 0.7;
/// Model accept floor; at or below this a leaf prediction is still rejected.
pub const MODERATE_CONFIDENCE: f32 = 0.5;

pub const MSG_LEAF_DETECTED: &str = "Sugarcane leaf detected successfully";
pub const MSG_LEAF_MODERATE: &str = "Sugarcane leaf detected with moderate confidence";
pub const MSG_LEAF_FALLBACK: &str = "Sugarcane leaf detected using fallback analysis";
pub const MSG_NOT_LEAF: &str =
    "This does not appear to be a sugarcane leaf. Please capture an image of a sugarcane leaf.";
pub const MSG_UNREADABLE: &str =
    "Could not read the image. Please capture or upload a JPEG, PNG or WebP photo.";

/// Engine-internal failures. Cloneable so a single shared load outcome can
/// be handed to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeafError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Model load timed out after {0}ms")]
    LoadTimeout(u64),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

/// Which path produced a validation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    Model,
    Heuristic,
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_leaf: bool,
    pub confidence: f32,
    pub message: String,
    pub method: ValidationMethod,
}

impl ValidationResult {
    pub(crate) fn new(
        is_leaf: bool,
        confidence: f32,
        message: &str,
        method: ValidationMethod,
    ) -> Self {
        Self {
            is_leaf,
            confidence: confidence.clamp(0.0, 1.0),
            message: message.to_string(),
            method,
        }
    }

    pub(crate) fn unreadable() -> Self {
        Self::new(false, 0.0, MSG_UNREADABLE, ValidationMethod::Unreadable)
    }
}

/// Advisory capture-quality verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityAssessment {
    pub acceptable: bool,
    pub suggestions: Vec<String>,
}

//! Disease detection contract and its simulated stand-in.
//!
//! No trained disease model ships with the app. `SimulatedDetector` picks a
//! label at random so the capture → record flow can be exercised end to end.

use std::sync::Mutex;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::models::{disease_info, DiseaseLabel, ScanUpdate};

pub const MIN_SIMULATED_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub label: DiseaseLabel,
    pub confidence: f64,
}

impl Detection {
    /// Treatment text for the detected label.
    pub fn recommendations(&self) -> Option<&'static str> {
        disease_info(self.label).map(|info| info.treatment)
    }

    /// Record update carrying this detection's results.
    pub fn to_scan_update(&self) -> ScanUpdate {
        ScanUpdate {
            disease_detected: Some(self.label.as_str().to_string()),
            confidence_score: Some(self.confidence),
            recommendations: self.recommendations().map(str::to_string),
            ..Default::default()
        }
    }
}

pub trait DiseaseDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Detection;

    fn name(&self) -> &str;
}

/// Uniform random label, confidence uniform in [0.7, 1.0).
pub struct SimulatedDetector {
    rng: Mutex<StdRng>,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiseaseDetector for SimulatedDetector {
    fn detect(&self, _image: &RgbImage) -> Detection {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let label = DiseaseLabel::DETECTABLE
            .choose(&mut *rng)
            .copied()
            .unwrap_or(DiseaseLabel::Healthy);
        let confidence = rng.gen_range(MIN_SIMULATED_CONFIDENCE..1.0);
        Detection { label, confidence }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::preprocess::InputTensor;
use super::LeafError;
use crate::config::EngineConfig;

/// Two-class output of the leaf classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    pub not_leaf: f32,
    pub leaf: f32,
}

impl ClassProbabilities {
    pub fn new(not_leaf: f32, leaf: f32) -> Self {
        Self { not_leaf, leaf }
    }

    /// Interpret a raw model output. Anything other than two finite,
    /// non-negative values is an inference failure.
    pub fn from_output(values: &[f32]) -> Result<Self, LeafError> {
        let [not_leaf, leaf] = values else {
            return Err(LeafError::Inference(format!(
                "expected 2 class scores, got {}",
                values.len()
            )));
        };
        if !not_leaf.is_finite() || !leaf.is_finite() || *not_leaf < 0.0 || *leaf < 0.0 {
            return Err(LeafError::Inference(format!(
                "invalid class scores [{not_leaf}, {leaf}]"
            )));
        }
        Ok(Self::new(*not_leaf, *leaf))
    }
}

/// A loaded leaf classifier. `predict` is blocking; callers run it on the
/// blocking pool.
pub trait LeafClassifier: Send + Sync {
    fn predict(&self, input: &InputTensor) -> Result<ClassProbabilities, LeafError>;

    fn name(&self) -> &str;
}

/// Produces a ready classifier. Blocking; may be slow.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn LeafClassifier>, LeafError>;
}

// ═══════════════════════════════════════════════════════════
// ONNX classifier, behind the `onnx` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx")]
mod onnx {
    use super::{ClassProbabilities, InputTensor, LeafClassifier, LeafError, ModelLoader};
    use ort::session::Session;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    /// Leaf classifier running a `[1, 224, 224, 3] -> [1, 2]` ONNX model.
    ///
    /// Uses interior mutability (Mutex) because ort::Session::run requires `&mut self`.
    pub struct OnnxLeafClassifier {
        session: Mutex<Session>,
        name: String,
    }

    impl OnnxLeafClassifier {
        pub fn load(model_path: &Path) -> Result<Self, LeafError> {
            if !model_path.exists() {
                return Err(LeafError::ModelLoad(format!(
                    "model not found at {}",
                    model_path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| LeafError::ModelLoad(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| LeafError::ModelLoad(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e: ort::Error| LeafError::ModelLoad(format!("ONNX load failed: {e}")))?;

            tracing::info!("ONNX leaf classifier loaded from {}", model_path.display());

            Ok(Self {
                session: Mutex::new(session),
                name: format!("onnx:{}", model_path.display()),
            })
        }
    }

    impl LeafClassifier for OnnxLeafClassifier {
        fn predict(&self, input: &InputTensor) -> Result<ClassProbabilities, LeafError> {
            use ort::value::TensorRef;

            let array = ndarray::Array4::from_shape_vec(
                (
                    InputTensor::SHAPE[0],
                    InputTensor::SHAPE[1],
                    InputTensor::SHAPE[2],
                    InputTensor::SHAPE[3],
                ),
                input.data.clone(),
            )
            .map_err(|e| LeafError::Inference(e.to_string()))?;
            let tensor = TensorRef::from_array_view(&array)
                .map_err(|e| LeafError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| LeafError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| LeafError::Inference(format!("ONNX inference failed: {e}")))?;

            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| LeafError::Inference(format!("Output extraction: {e}")))?;

            ClassProbabilities::from_output(data)
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// Loads `model.onnx` and runs one warm-up inference before reporting ready.
    pub struct OnnxModelLoader {
        model_path: PathBuf,
    }

    impl OnnxModelLoader {
        pub fn new(model_path: PathBuf) -> Self {
            Self { model_path }
        }
    }

    impl ModelLoader for OnnxModelLoader {
        fn load(&self) -> Result<Arc<dyn LeafClassifier>, LeafError> {
            let classifier = OnnxLeafClassifier::load(&self.model_path)?;
            classifier
                .predict(&InputTensor::zeros())
                .map_err(|e| LeafError::ModelLoad(format!("warm-up failed: {e}")))?;
            Ok(Arc::new(classifier))
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::{OnnxLeafClassifier, OnnxModelLoader};

/// Loader for builds without an inference runtime. Always fails, so the
/// engine settles on the heuristic path.
pub struct UnavailableModelLoader {
    reason: String,
}

impl UnavailableModelLoader {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ModelLoader for UnavailableModelLoader {
    fn load(&self) -> Result<Arc<dyn LeafClassifier>, LeafError> {
        Err(LeafError::ModelLoad(self.reason.clone()))
    }
}

/// The loader this build supports for `config.model_path`.
pub fn default_loader(config: &EngineConfig) -> Arc<dyn ModelLoader> {
    #[cfg(feature = "onnx")]
    {
        Arc::new(OnnxModelLoader::new(config.model_path.clone()))
    }
    #[cfg(not(feature = "onnx"))]
    {
        Arc::new(UnavailableModelLoader::new(format!(
            "built without the `onnx` feature; {} not used",
            config.model_path.display()
        )))
    }
}

// ═══════════════════════════════════════════════════════════
// Mocks
// ═══════════════════════════════════════════════════════════

/// Classifier returning a fixed outcome.
pub struct MockLeafClassifier {
    outcome: Result<ClassProbabilities, LeafError>,
}

impl MockLeafClassifier {
    pub fn returning(not_leaf: f32, leaf: f32) -> Self {
        Self {
            outcome: Ok(ClassProbabilities::new(not_leaf, leaf)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(LeafError::Inference(message.to_string())),
        }
    }
}

impl LeafClassifier for MockLeafClassifier {
    fn predict(&self, input: &InputTensor) -> Result<ClassProbabilities, LeafError> {
        if input.data.len() != InputTensor::len() {
            return Err(LeafError::Inference("wrong input length".into()));
        }
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Loader with a fixed outcome, an optional delay, and a call counter.
pub struct MockModelLoader {
    outcome: Result<Arc<dyn LeafClassifier>, LeafError>,
    delay: Duration,
    loads: AtomicUsize,
}

impl MockModelLoader {
    pub fn ready(classifier: impl LeafClassifier + 'static) -> Self {
        Self {
            outcome: Ok(Arc::new(classifier)),
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(LeafError::ModelLoad(message.to_string())),
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockModelLoader {
    fn load(&self) -> Result<Arc<dyn LeafClassifier>, LeafError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_must_have_two_scores() {
        assert!(ClassProbabilities::from_output(&[0.2, 0.8]).is_ok());
        assert!(matches!(
            ClassProbabilities::from_output(&[0.2, 0.3, 0.5]),
            Err(LeafError::Inference(_))
        ));
        assert!(ClassProbabilities::from_output(&[]).is_err());
    }

    #[test]
    fn output_rejects_non_finite_and_negative() {
        assert!(ClassProbabilities::from_output(&[f32::NAN, 0.5]).is_err());
        assert!(ClassProbabilities::from_output(&[0.5, f32::INFINITY]).is_err());
        assert!(ClassProbabilities::from_output(&[-0.1, 1.1]).is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn default_loader_without_runtime_fails() {
        let loader = default_loader(&EngineConfig::default());
        assert!(matches!(loader.load(), Err(LeafError::ModelLoad(_))));
    }

    #[test]
    fn mock_loader_counts_calls() {
        let loader = MockModelLoader::ready(MockLeafClassifier::returning(0.1, 0.9));
        let model = loader.load().unwrap();
        loader.load().unwrap();
        assert_eq!(loader.load_count(), 2);
        let probs = model.predict(&InputTensor::zeros()).unwrap();
        assert_eq!(probs, ClassProbabilities::new(0.1, 0.9));
    }
}

//! The validation engine: model lifecycle plus the primary/fallback decision.
//!
//! Lifecycle per instance:
//!
//! ```text
//! UNLOADED ──load──▶ LOADING ──ok──▶ READY ──dispose──▶ UNLOADED
//!                        └──err/timeout──▶ LOAD_FAILED ──backoff elapsed──▶ LOADING
//! ```
//!
//! At most one load is in flight. Concurrent callers await the same shared
//! future and all observe its outcome. `dispose` bumps a generation counter
//! so a load that completes afterwards is discarded instead of resurrecting
//! the model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classifier::{default_loader, ClassProbabilities, LeafClassifier, ModelLoader};
use super::preprocess::{decode_image, to_input_tensor};
use super::{heuristic, quality};
use super::{
    LeafError, QualityAssessment, ValidationMethod, ValidationResult, HIGH_CONFIDENCE,
    MODERATE_CONFIDENCE, MSG_LEAF_DETECTED, MSG_LEAF_MODERATE, MSG_NOT_LEAF,
};
use crate::config::EngineConfig;

type LoadOutcome = Result<Arc<dyn LeafClassifier>, LeafError>;
type LoadFuture = Shared<BoxFuture<'static, LoadOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    LoadFailed,
}

/// Snapshot of the engine for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: LoadState,
    pub load_attempts: u64,
    pub model: Option<String>,
    pub last_error: Option<String>,
}

/// How a single validation is carried out.
pub enum ValidationStrategy {
    Primary(Arc<dyn LeafClassifier>),
    Heuristic,
}

enum Slot {
    Unloaded,
    Loading { generation: u64, future: LoadFuture },
    Ready(Arc<dyn LeafClassifier>),
    Failed { error: LeafError, at: Instant },
}

struct Inner {
    slot: Slot,
    generation: u64,
}

pub struct LeafValidator {
    loader: Arc<dyn ModelLoader>,
    inner: Mutex<Inner>,
    load_attempts: AtomicU64,
    load_timeout: Duration,
    retry_backoff: Duration,
}

impl LeafValidator {
    pub fn new(loader: Arc<dyn ModelLoader>, config: &EngineConfig) -> Self {
        Self {
            loader,
            inner: Mutex::new(Inner {
                slot: Slot::Unloaded,
                generation: 0,
            }),
            load_attempts: AtomicU64::new(0),
            load_timeout: config.load_timeout,
            retry_backoff: config.load_retry_backoff,
        }
    }

    /// Engine backed by the loader this build supports.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(default_loader(config), config)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the model now. Joins an in-flight load; retries a failed one
    /// regardless of the backoff window.
    pub async fn load(&self) -> Result<(), LeafError> {
        self.ensure_model(true).await.map(|_| ())
    }

    /// Decide whether `image_bytes` shows a sugarcane leaf. Never fails.
    pub async fn validate(&self, image_bytes: &[u8]) -> ValidationResult {
        let owned = image_bytes.to_vec();
        let image = match tokio::task::spawn_blocking(move || decode_image(&owned)).await {
            Ok(Ok(img)) => Arc::new(img),
            Ok(Err(e)) => {
                warn!("Rejecting unreadable image: {e}");
                return ValidationResult::unreadable();
            }
            Err(e) => {
                warn!("Image decode task failed: {e}");
                return ValidationResult::unreadable();
            }
        };

        match self.select_strategy().await {
            ValidationStrategy::Primary(model) => {
                match run_model(model, Arc::clone(&image)).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Model inference failed, using fallback analysis: {e}");
                        run_heuristic(image).await
                    }
                }
            }
            ValidationStrategy::Heuristic => run_heuristic(image).await,
        }
    }

    /// Advisory quality check; independent of the model.
    pub fn assess_quality(&self, image_bytes: &[u8]) -> QualityAssessment {
        quality::assess_quality(image_bytes)
    }

    /// Release the model. An in-flight load is abandoned and its result discarded.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        let was_loaded = matches!(inner.slot, Slot::Ready(_));
        inner.slot = Slot::Unloaded;
        if was_loaded {
            info!("Leaf classifier disposed");
        }
    }

    pub fn status(&self) -> EngineStatus {
        let inner = self.lock();
        let (state, model, last_error) = match &inner.slot {
            Slot::Unloaded => (LoadState::Unloaded, None, None),
            Slot::Loading { .. } => (LoadState::Loading, None, None),
            Slot::Ready(m) => (LoadState::Ready, Some(m.name().to_string()), None),
            Slot::Failed { error, .. } => (LoadState::LoadFailed, None, Some(error.to_string())),
        };
        EngineStatus {
            state,
            load_attempts: self.load_attempts.load(Ordering::SeqCst),
            model,
            last_error,
        }
    }

    /// Primary if a model is (or becomes) ready, otherwise the heuristic.
    pub async fn select_strategy(&self) -> ValidationStrategy {
        match self.ensure_model(false).await {
            Ok(model) => ValidationStrategy::Primary(model),
            Err(e) => {
                debug!("Model unavailable, using fallback analysis: {e}");
                ValidationStrategy::Heuristic
            }
        }
    }

    async fn ensure_model(&self, force: bool) -> LoadOutcome {
        let (generation, future) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            match &inner.slot {
                Slot::Ready(model) => return Ok(Arc::clone(model)),
                Slot::Loading { generation, future } => (*generation, future.clone()),
                Slot::Failed { error, at } if !force && at.elapsed() < self.retry_backoff => {
                    return Err(error.clone());
                }
                Slot::Unloaded | Slot::Failed { .. } => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let future = self.start_load();
                    inner.slot = Slot::Loading {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let outcome = future.await;

        let mut inner = self.lock();
        if inner.generation != generation {
            // Disposed while loading.
            return Err(LeafError::ModelLoad("engine disposed during load".into()));
        }
        if !matches!(inner.slot, Slot::Loading { .. }) {
            // A co-waiter already published this outcome.
            return outcome;
        }
        inner.slot = match &outcome {
            Ok(model) => {
                info!(model = model.name(), "Leaf classifier ready");
                Slot::Ready(Arc::clone(model))
            }
            Err(e) => {
                warn!("Leaf classifier load failed: {e}");
                Slot::Failed {
                    error: e.clone(),
                    at: Instant::now(),
                }
            }
        };
        outcome
    }

    fn start_load(&self) -> LoadFuture {
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let loader = Arc::clone(&self.loader);
        let timeout = self.load_timeout;
        info!(attempt, "Loading leaf classifier");

        async move {
            let task = tokio::task::spawn_blocking(move || loader.load());
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join)) => Err(LeafError::ModelLoad(format!("loader task failed: {join}"))),
                Err(_) => Err(LeafError::LoadTimeout(timeout.as_millis() as u64)),
            }
        }
        .boxed()
        .shared()
    }
}

/// Map class probabilities onto the accept/reject policy.
pub fn interpret_prediction(probs: ClassProbabilities) -> ValidationResult {
    let is_leaf = probs.leaf > probs.not_leaf;
    let confidence = probs.leaf.max(probs.not_leaf);

    if is_leaf && confidence > HIGH_CONFIDENCE {
        ValidationResult::new(true, confidence, MSG_LEAF_DETECTED, ValidationMethod::Model)
    } else if is_leaf && confidence > MODERATE_CONFIDENCE {
        ValidationResult::new(true, confidence, MSG_LEAF_MODERATE, ValidationMethod::Model)
    } else {
        ValidationResult::new(false, confidence, MSG_NOT_LEAF, ValidationMethod::Model)
    }
}

async fn run_model(
    model: Arc<dyn LeafClassifier>,
    image: Arc<RgbImage>,
) -> Result<ValidationResult, LeafError> {
    let probs = tokio::task::spawn_blocking(move || {
        let tensor = to_input_tensor(&image);
        model.predict(&tensor)
    })
    .await
    .map_err(|e| LeafError::Inference(format!("inference task failed: {e}")))??;

    debug!(leaf = probs.leaf, not_leaf = probs.not_leaf, "Model prediction");
    Ok(interpret_prediction(probs))
}

async fn run_heuristic(image: Arc<RgbImage>) -> ValidationResult {
    match tokio::task::spawn_blocking(move || heuristic::classify(&image)).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Heuristic task failed: {e}");
            ValidationResult::new(false, 0.0, MSG_NOT_LEAF, ValidationMethod::Heuristic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::classifier::{MockLeafClassifier, MockModelLoader};
    use crate::leaf::preprocess::tests::{encode_png, make_test_image};
    use crate::leaf::{MSG_LEAF_FALLBACK, MSG_UNREADABLE};
    use image::Rgb;

    fn config() -> EngineConfig {
        EngineConfig {
            load_timeout: Duration::from_secs(5),
            load_retry_backoff: Duration::from_secs(3600),
            ..EngineConfig::default()
        }
    }

    fn engine(loader: &Arc<MockModelLoader>, config: &EngineConfig) -> LeafValidator {
        LeafValidator::new(loader.clone(), config)
    }

    fn leaf_photo() -> Vec<u8> {
        let img = RgbImage::from_fn(400, 150, |x, _| {
            if x % 2 == 0 {
                Rgb([30, 200, 40])
            } else {
                Rgb([20, 120, 30])
            }
        });
        encode_png(&img)
    }

    #[tokio::test]
    async fn confident_model_accepts() {
        let loader = Arc::new(MockModelLoader::ready(MockLeafClassifier::returning(0.1, 0.9)));
        let engine = engine(&loader, &config());

        let result = engine.validate(&make_test_image(64, 64, [0, 0, 0])).await;
        assert!(result.is_leaf);
        assert_eq!(result.method, ValidationMethod::Model);
        assert_eq!(result.message, MSG_LEAF_DETECTED);
        assert!((result.confidence - 0.9).abs() < 1e-6);
        assert_eq!(engine.status().state, LoadState::Ready);
    }

    #[test]
    fn prediction_policy_bands() {
        let moderate = interpret_prediction(ClassProbabilities::new(0.4, 0.6));
        assert!(moderate.is_leaf);
        assert_eq!(moderate.message, MSG_LEAF_MODERATE);

        let at_high_edge = interpret_prediction(ClassProbabilities::new(0.3, 0.7));
        assert_eq!(at_high_edge.message, MSG_LEAF_MODERATE);

        let tie = interpret_prediction(ClassProbabilities::new(0.5, 0.5));
        assert!(!tie.is_leaf);

        let rejected = interpret_prediction(ClassProbabilities::new(0.8, 0.2));
        assert!(!rejected.is_leaf);
        assert_eq!(rejected.message, MSG_NOT_LEAF);
        assert!((rejected.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn load_failure_falls_back_to_heuristic() {
        let loader = Arc::new(MockModelLoader::failing("missing weights"));
        let engine = engine(&loader, &config());

        let result = engine.validate(&leaf_photo()).await;
        assert_eq!(result.method, ValidationMethod::Heuristic);
        assert!(result.is_leaf);
        assert_eq!(result.message, MSG_LEAF_FALLBACK);

        let status = engine.status();
        assert_eq!(status.state, LoadState::LoadFailed);
        assert!(status.last_error.unwrap().contains("missing weights"));
    }

    #[tokio::test]
    async fn inference_failure_falls_back_to_heuristic() {
        let loader = Arc::new(MockModelLoader::ready(MockLeafClassifier::failing("bad shape")));
        let engine = engine(&loader, &config());

        let result = engine.validate(&leaf_photo()).await;
        assert_eq!(result.method, ValidationMethod::Heuristic);
        assert_eq!(engine.status().state, LoadState::Ready);
    }

    #[tokio::test]
    async fn concurrent_validations_share_one_load() {
        let loader = Arc::new(
            MockModelLoader::ready(MockLeafClassifier::returning(0.2, 0.8))
                .with_delay(Duration::from_millis(100)),
        );
        let engine = engine(&loader, &config());
        let photo = make_test_image(32, 32, [0, 200, 0]);

        let (a, b, c) = tokio::join!(
            engine.validate(&photo),
            engine.validate(&photo),
            engine.load()
        );
        assert_eq!(a.method, ValidationMethod::Model);
        assert_eq!(b.method, ValidationMethod::Model);
        assert!(c.is_ok());
        assert_eq!(loader.load_count(), 1);
        assert_eq!(engine.status().load_attempts, 1);
    }

    #[tokio::test]
    async fn ready_model_is_reused() {
        let loader = Arc::new(MockModelLoader::ready(MockLeafClassifier::returning(0.2, 0.8)));
        let engine = engine(&loader, &config());
        let photo = make_test_image(32, 32, [0, 200, 0]);

        engine.validate(&photo).await;
        engine.validate(&photo).await;
        engine.load().await.unwrap();
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn dispose_resets_and_next_validate_reloads() {
        let loader = Arc::new(MockModelLoader::ready(MockLeafClassifier::returning(0.2, 0.8)));
        let engine = engine(&loader, &config());
        let photo = make_test_image(32, 32, [0, 200, 0]);

        engine.validate(&photo).await;
        engine.dispose();
        let status = engine.status();
        assert_eq!(status.state, LoadState::Unloaded);
        assert!(status.model.is_none());

        let result = engine.validate(&photo).await;
        assert_eq!(result.method, ValidationMethod::Model);
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn dispose_during_load_discards_result() {
        let loader = Arc::new(
            MockModelLoader::ready(MockLeafClassifier::returning(0.2, 0.8))
                .with_delay(Duration::from_millis(100)),
        );
        let engine = engine(&loader, &config());

        let (loaded, ()) = tokio::join!(engine.load(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine.dispose();
        });
        assert!(loaded.is_err());
        assert_eq!(engine.status().state, LoadState::Unloaded);
    }

    #[tokio::test]
    async fn slow_load_times_out_and_falls_back() {
        let loader = Arc::new(
            MockModelLoader::ready(MockLeafClassifier::returning(0.2, 0.8))
                .with_delay(Duration::from_millis(400)),
        );
        let config = EngineConfig {
            load_timeout: Duration::from_millis(30),
            ..config()
        };
        let engine = engine(&loader, &config);

        let result = engine.validate(&leaf_photo()).await;
        assert_eq!(result.method, ValidationMethod::Heuristic);
        let status = engine.status();
        assert_eq!(status.state, LoadState::LoadFailed);
        assert!(status.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn failed_load_is_not_retried_within_backoff() {
        let loader = Arc::new(MockModelLoader::failing("nope"));
        let engine = engine(&loader, &config());
        let photo = leaf_photo();

        engine.validate(&photo).await;
        engine.validate(&photo).await;
        assert_eq!(loader.load_count(), 1);

        // Explicit load ignores the backoff.
        assert!(engine.load().await.is_err());
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn failed_load_is_retried_after_backoff() {
        let loader = Arc::new(MockModelLoader::failing("nope"));
        let config = EngineConfig {
            load_retry_backoff: Duration::ZERO,
            ..config()
        };
        let engine = engine(&loader, &config);
        let photo = leaf_photo();

        engine.validate(&photo).await;
        engine.validate(&photo).await;
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn unreadable_input_is_rejected_without_loading() {
        let loader = Arc::new(MockModelLoader::ready(MockLeafClassifier::returning(0.0, 1.0)));
        let engine = engine(&loader, &config());

        let result = engine.validate(b"GIF89a but not really an image at all").await;
        assert!(!result.is_leaf);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, ValidationMethod::Unreadable);
        assert_eq!(result.message, MSG_UNREADABLE);
        assert_eq!(loader.load_count(), 0);
    }

    #[test]
    fn quality_check_does_not_touch_the_model() {
        let loader = Arc::new(MockModelLoader::failing("unused"));
        let engine = engine(&loader, &config());

        assert!(engine.assess_quality(&make_test_image(200, 200, [90, 140, 70])).acceptable);
        assert!(!engine.assess_quality(&make_test_image(199, 199, [90, 140, 70])).acceptable);
        assert_eq!(loader.load_count(), 0);
        assert_eq!(engine.status().state, LoadState::Unloaded);
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbImage;

use super::types::KeypointSet;
use super::LandmarkError;

/// Body-landmark detector over a canonical RGB image.
///
/// `Ok(None)` means the model found no person. That is a routine outcome,
/// not an error: callers fall back to neutral findings and an unannotated image.
pub trait LandmarkDetector {
    fn detect(&self, image: &RgbImage) -> Result<Option<KeypointSet>, LandmarkError>;
}

/// Constructs detector handles.
///
/// Model handles are expensive and not documented as thread-safe, so each
/// request opens its own handle and drops it when done. Dropping the box is
/// the release; it runs on every exit path.
pub trait DetectorProvider {
    fn open(&self) -> Result<Box<dyn LandmarkDetector>, LandmarkError>;
}

/// Open a handle, run one detection pass, release the handle.
///
/// Construction and inference failures are logged and degrade to `None`,
/// exactly like a detection miss.
pub fn detect_once(provider: &dyn DetectorProvider, image: &RgbImage) -> Option<KeypointSet> {
    let _span = tracing::info_span!(
        "landmark_detect",
        width = image.width(),
        height = image.height(),
    )
    .entered();
    let start = std::time::Instant::now();

    let detector = match provider.open() {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "Landmark detector unavailable; continuing without annotation");
            return None;
        }
    };

    let result = match detector.detect(image) {
        Ok(Some(set)) => {
            tracing::info!(
                landmarks = set.len(),
                elapsed_ms = %start.elapsed().as_millis(),
                "Pose detected"
            );
            Some(set)
        }
        Ok(None) => {
            tracing::warn!("No pose detected in image");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Landmark inference failed; continuing without annotation");
            None
        }
    };

    drop(detector);
    result
}

// ──────────────────────────────────────────────
// DisabledDetectorProvider
// ──────────────────────────────────────────────

/// Provider used when no landmark model is configured. Every image is a miss.
pub struct DisabledDetectorProvider;

struct DisabledDetector;

impl LandmarkDetector for DisabledDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Option<KeypointSet>, LandmarkError> {
        tracing::debug!("Landmark detection disabled: no model configured");
        Ok(None)
    }
}

impl DetectorProvider for DisabledDetectorProvider {
    fn open(&self) -> Result<Box<dyn LandmarkDetector>, LandmarkError> {
        Ok(Box::new(DisabledDetector))
    }
}

// ──────────────────────────────────────────────
// Mocks (testing)
// ──────────────────────────────────────────────

/// Mock detector returning a fixed result.
#[derive(Clone)]
pub struct MockLandmarkDetector {
    result: Option<KeypointSet>,
    fail: bool,
}

impl MockLandmarkDetector {
    pub fn detecting(set: KeypointSet) -> Self {
        Self {
            result: Some(set),
            fail: false,
        }
    }

    pub fn missing() -> Self {
        Self {
            result: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            result: None,
            fail: true,
        }
    }
}

impl LandmarkDetector for MockLandmarkDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Option<KeypointSet>, LandmarkError> {
        if self.fail {
            return Err(LandmarkError::Inference("mock inference failure".into()));
        }
        Ok(self.result.clone())
    }
}

/// Mock provider that hands out clones of one detector and counts opens and
/// releases, so tests can prove one detection pass per request.
pub struct MockDetectorProvider {
    detector: MockLandmarkDetector,
    unavailable: bool,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockDetectorProvider {
    pub fn new(detector: MockLandmarkDetector) -> Self {
        Self {
            detector,
            unavailable: false,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Provider whose model cannot be loaded.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(MockLandmarkDetector::missing())
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct CountedDetector {
    inner: MockLandmarkDetector,
    released: Arc<AtomicUsize>,
}

impl LandmarkDetector for CountedDetector {
    fn detect(&self, image: &RgbImage) -> Result<Option<KeypointSet>, LandmarkError> {
        self.inner.detect(image)
    }
}

impl Drop for CountedDetector {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl DetectorProvider for MockDetectorProvider {
    fn open(&self) -> Result<Box<dyn LandmarkDetector>, LandmarkError> {
        if self.unavailable {
            return Err(LandmarkError::ModelInit("mock model missing".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedDetector {
            inner: self.detector.clone(),
            released: Arc::clone(&self.released),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::landmarks::Landmark;

    fn canvas() -> RgbImage {
        RgbImage::new(60, 80)
    }

    #[test]
    fn detect_once_returns_keypoints_and_releases() {
        let set = KeypointSet::empty().with(Landmark::Nose, 0.5, 0.1);
        let provider = MockDetectorProvider::new(MockLandmarkDetector::detecting(set.clone()));
        let result = detect_once(&provider, &canvas());
        assert_eq!(result, Some(set));
        assert_eq!(provider.open_count(), 1);
        assert_eq!(provider.release_count(), 1);
    }

    #[test]
    fn inference_failure_degrades_to_miss() {
        let provider = MockDetectorProvider::new(MockLandmarkDetector::failing());
        assert!(detect_once(&provider, &canvas()).is_none());
        assert_eq!(provider.release_count(), 1);
    }

    #[test]
    fn unavailable_model_degrades_to_miss() {
        let provider = MockDetectorProvider::unavailable();
        assert!(detect_once(&provider, &canvas()).is_none());
        assert_eq!(provider.open_count(), 0);
    }

    #[test]
    fn disabled_provider_never_detects() {
        assert!(detect_once(&DisabledDetectorProvider, &canvas()).is_none());
    }
}

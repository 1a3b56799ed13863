pub mod detector;
#[cfg(feature = "onnx-pose")]
pub mod onnx;
pub mod preprocess;
pub mod types;

pub use detector::*;
pub use preprocess::{load_canonical, CanonicalImage};
pub use types::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::DetectionConfig;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("The photograph could not be read as an image: {0}")]
    Decode(String),

    #[error("Pose model not found at {0}")]
    ModelNotFound(PathBuf),

    #[error("Pose model could not be initialized: {0}")]
    ModelInit(String),

    #[error("Pose detection failed: {0}")]
    Inference(String),
}

/// Pick the detector provider for the current build and configuration.
///
/// Without the `onnx-pose` feature, or without a configured model file, every
/// upload is treated as a detection miss.
pub fn provider_from_config(config: &DetectionConfig) -> Box<dyn DetectorProvider> {
    match &config.model_path {
        #[cfg(feature = "onnx-pose")]
        Some(path) => Box::new(onnx::OnnxPoseProvider::new(
            path.clone(),
            config.min_detection_confidence,
            config.min_landmark_visibility,
        )),
        #[cfg(not(feature = "onnx-pose"))]
        Some(path) => {
            tracing::warn!(
                model = %path.display(),
                "Pose model configured but onnx-pose feature is disabled"
            );
            Box::new(DisabledDetectorProvider)
        }
        None => {
            tracing::info!("No pose model configured; landmark detection disabled");
            Box::new(DisabledDetectorProvider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_model_path_disables_detection() {
        let provider = provider_from_config(&DetectionConfig::default());
        let image = image::RgbImage::new(10, 10);
        assert!(detect_once(provider.as_ref(), &image).is_none());
    }

    #[test]
    fn error_messages_are_readable() {
        let err = LandmarkError::ModelNotFound(PathBuf::from("/models/pose.onnx"));
        assert!(err.to_string().contains("/models/pose.onnx"));
    }
}

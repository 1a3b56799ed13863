// ═══════════════════════════════════════════════════════════
// BlazePose ONNX detector, behind the `onnx-pose` feature
// ═══════════════════════════════════════════════════════════
//
// Expects the single-stage BlazePose "full" landmark model:
//   input   [1, 256, 256, 3]  f32 RGB in 0..1
//   output0 [1, 195]          39 x (x, y, z, visibility_logit, presence_logit), x/y in input pixels
//   output1 [1, 1]            person presence score
// Only the first 33 rows are body landmarks; the rest are auxiliary ROI points.

use std::path::PathBuf;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::RgbImage;
use ort::session::Session;

use super::types::{Keypoint, KeypointSet, Landmark};
use super::{DetectorProvider, LandmarkDetector, LandmarkError};

pub const INPUT_SIZE: u32 = 256;
const VALUES_PER_LANDMARK: usize = 5;

/// Placement of the source image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn for_size(width: u32, height: u32) -> Self {
        let scale = INPUT_SIZE as f32 / width.max(height).max(1) as f32;
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        Self {
            scaled_width,
            scaled_height,
            pad_x: (INPUT_SIZE - scaled_width) / 2,
            pad_y: (INPUT_SIZE - scaled_height) / 2,
        }
    }

    /// Map model-input pixels back to normalized source coordinates.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scaled_width as f32,
            (y - self.pad_y as f32) / self.scaled_height as f32,
        )
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Person-presence probability from the model's pose-flag logit. An empty
/// tensor counts as no person.
pub fn presence_score(raw: &[f32]) -> f32 {
    sigmoid(raw.first().copied().unwrap_or(f32::NEG_INFINITY))
}

/// Decode the flat landmark tensor into the 33 body keypoints.
pub fn decode_landmarks(raw: &[f32], letterbox: &Letterbox) -> Result<Vec<Keypoint>, LandmarkError> {
    if raw.len() < Landmark::COUNT * VALUES_PER_LANDMARK {
        return Err(LandmarkError::Inference(format!(
            "Landmark tensor too short: {} values, expected {}",
            raw.len(),
            Landmark::COUNT * VALUES_PER_LANDMARK
        )));
    }

    Ok(raw
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(Landmark::COUNT)
        .map(|row| {
            let (x, y) = letterbox.to_source(row[0], row[1]);
            Keypoint::new(x, y, sigmoid(row[3]))
        })
        .collect())
}

/// Opens a fresh ONNX session per request.
pub struct OnnxPoseProvider {
    model_path: PathBuf,
    min_detection_confidence: f32,
    min_landmark_visibility: f32,
}

impl OnnxPoseProvider {
    pub fn new(model_path: PathBuf, min_detection_confidence: f32, min_landmark_visibility: f32) -> Self {
        Self {
            model_path,
            min_detection_confidence,
            min_landmark_visibility,
        }
    }
}

impl DetectorProvider for OnnxPoseProvider {
    fn open(&self) -> Result<Box<dyn LandmarkDetector>, LandmarkError> {
        Ok(Box::new(OnnxPoseDetector::load(
            &self.model_path,
            self.min_detection_confidence,
            self.min_landmark_visibility,
        )?))
    }
}

/// BlazePose landmark model via ONNX Runtime.
///
/// `Session::run` needs `&mut self`; the trait exposes `&self`, hence the Mutex.
pub struct OnnxPoseDetector {
    session: Mutex<Session>,
    min_detection_confidence: f32,
    min_landmark_visibility: f32,
}

impl OnnxPoseDetector {
    pub fn load(
        model_path: &std::path::Path,
        min_detection_confidence: f32,
        min_landmark_visibility: f32,
    ) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| LandmarkError::ModelInit(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| LandmarkError::ModelInit(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| LandmarkError::ModelInit(format!("ONNX load failed: {e}")))?;

        tracing::debug!(model = %model_path.display(), "Pose model loaded");

        Ok(Self {
            session: Mutex::new(session),
            min_detection_confidence,
            min_landmark_visibility,
        })
    }

    fn input_tensor(image: &RgbImage, letterbox: &Letterbox) -> ndarray::Array4<f32> {
        let resized = image::imageops::resize(
            image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            FilterType::Triangle,
        );
        let side = INPUT_SIZE as usize;
        let mut input = ndarray::Array4::<f32>::zeros((1, side, side, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let px = (x + letterbox.pad_x) as usize;
            let py = (y + letterbox.pad_y) as usize;
            for c in 0..3 {
                input[[0, py, px, c]] = pixel.0[c] as f32 / 255.0;
            }
        }
        input
    }
}

impl LandmarkDetector for OnnxPoseDetector {
    fn detect(&self, image: &RgbImage) -> Result<Option<KeypointSet>, LandmarkError> {
        use ort::value::TensorRef;

        let letterbox = Letterbox::for_size(image.width(), image.height());
        let input = Self::input_tensor(image, &letterbox);
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| LandmarkError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| LandmarkError::Inference("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| LandmarkError::Inference(format!("ONNX inference failed: {e}")))?;

        if outputs.len() < 2 {
            return Err(LandmarkError::Inference(format!(
                "Model returned {} outputs, expected landmarks and presence",
                outputs.len()
            )));
        }

        let (_, presence) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::Inference(format!("Presence extraction: {e}")))?;
        let presence = presence_score(presence);
        if presence < self.min_detection_confidence {
            tracing::debug!(presence, "Person presence below threshold");
            return Ok(None);
        }

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::Inference(format!("Landmark extraction: {e}")))?;
        let keypoints = decode_landmarks(raw, &letterbox)?;

        Ok(Some(KeypointSet::from_raw(
            &keypoints,
            self.min_landmark_visibility,
        )))
    }
}

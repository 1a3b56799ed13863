//! Upload entry point: decode → detect once → analyze + annotate → persist.

use std::io::Read;
use std::time::Instant;

use serde::Serialize;

use super::protocol::annotate;
use super::storage::{allowed_extension, encode_image, output_format, ImageStore};
use super::AnnotationError;
use crate::config::PipelineConfig;
use crate::pipeline::analysis::{analyze_view, FindingsMap};
use crate::pipeline::landmarks::{detect_once, load_canonical, DetectorProvider, ViewType};
use crate::pipeline::PostureError;

/// Result of one upload: where the image went, and what was measured.
///
/// `relative_path` is `None` exactly when `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedUpload {
    pub relative_path: Option<String>,
    pub findings: FindingsMap,
    pub error: Option<String>,
    pub view: ViewType,
    /// Whether a person was detected. Findings come from this pass.
    pub detected: bool,
    /// Whether the stored image carries the overlay. False for misses and for
    /// formats stored as the original upload bytes.
    pub annotated: bool,
}

impl AnnotatedUpload {
    fn failed(view: ViewType, findings: FindingsMap, error: AnnotationError) -> Self {
        tracing::warn!(view = view.as_str(), error = %error, "Upload not stored");
        Self {
            relative_path: None,
            findings,
            error: Some(error.to_string()),
            view,
            detected: false,
            annotated: false,
        }
    }
}

/// Per-request posture processing over a shared configuration.
pub struct PosturePipeline<'a> {
    config: &'a PipelineConfig,
    detector: &'a dyn DetectorProvider,
    store: ImageStore,
}

impl<'a> PosturePipeline<'a> {
    pub fn new(config: &'a PipelineConfig, detector: &'a dyn DetectorProvider) -> Self {
        Self {
            config,
            detector,
            store: ImageStore::from_config(&config.storage),
        }
    }

    /// Store under a different subdirectory (e.g. radiographs).
    pub fn with_store(mut self, store: ImageStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Process one uploaded photograph.
    ///
    /// A detection miss still persists the canonically resized image with
    /// default findings. Read, type and write failures come back inside the
    /// result. Bytes that do not decode as an image are an `Err`.
    pub fn annotate_and_analyze<R: Read>(
        &self,
        mut reader: R,
        original_filename: &str,
        base_name: &str,
        view: ViewType,
    ) -> Result<AnnotatedUpload, PostureError> {
        let _span = tracing::info_span!("annotate_and_analyze", view = view.as_str()).entered();
        let start = Instant::now();
        let thresholds = &self.config.analysis;

        let extension = match allowed_extension(original_filename) {
            Ok(ext) => ext,
            Err(e) => return Ok(AnnotatedUpload::failed(view, analyze_view(view, None, thresholds), e)),
        };

        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes) {
            return Ok(AnnotatedUpload::failed(
                view,
                analyze_view(view, None, thresholds),
                AnnotationError::Read(e),
            ));
        }

        let storage = &self.config.storage;
        let canonical = load_canonical(&bytes, storage.canonical_width, storage.canonical_height)?;

        // One detection pass feeds both the analyzer and the renderer.
        let keypoints = if view.needs_detection() {
            detect_once(self.detector, &canonical.image)
        } else {
            None
        };

        let findings = analyze_view(view, keypoints.as_ref(), thresholds);

        let mut image = canonical.image;
        if let Some(kp) = &keypoints {
            annotate(&mut image, kp, view);
        }

        let (payload, annotated) = match output_format(&extension) {
            Some(format) => match encode_image(&image, format) {
                Ok(encoded) => (encoded, keypoints.is_some()),
                Err(e) => return Ok(AnnotatedUpload::failed(view, findings, e)),
            },
            None => {
                tracing::warn!(
                    extension = %extension,
                    detected = keypoints.is_some(),
                    "No encoder for upload format; storing original bytes without overlay or resize"
                );
                (bytes, false)
            }
        };

        let relative_path = match self.store.save_unique(base_name, &extension, &payload) {
            Ok(path) => path,
            Err(e) => return Ok(AnnotatedUpload::failed(view, findings, e)),
        };

        tracing::info!(
            path = %relative_path,
            detected = keypoints.is_some(),
            annotated,
            findings = findings.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Posture image processed"
        );

        Ok(AnnotatedUpload {
            relative_path: Some(relative_path),
            findings,
            error: None,
            view,
            detected: keypoints.is_some(),
            annotated,
        })
    }
}

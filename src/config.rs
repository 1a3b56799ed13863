use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Posturelab";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonical raster size every clinical photograph is resized to before
/// detection, so pixel-space geometry is comparable across patients.
pub const CANONICAL_WIDTH: u32 = 600;
pub const CANONICAL_HEIGHT: u32 = 800;

/// Shoulder/pelvis sensitivity: 0.7% of image height.
pub const DEFAULT_LEVEL_THRESHOLD: f32 = 0.007;

/// Hindfoot sensitivity: 1% of image width.
pub const DEFAULT_HINDFOOT_THRESHOLD: f32 = 0.01;

/// Minimum person-presence score for the landmark model to count as a detection.
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;

/// Upload subdirectory below the static root, also the prefix of every stored relative path.
pub const DEFAULT_UPLOAD_SUBDIR: &str = "uploads/patient_images";

pub const DEFAULT_TEXT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_VISION_MODEL: &str = "gemini-1.5-pro-latest";

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables read once by [`PipelineConfig::load`].
pub const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_STATIC_ROOT: &str = "POSTURELAB_STATIC_ROOT";
pub const ENV_POSE_MODEL: &str = "POSTURELAB_POSE_MODEL";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "posturelab=info,warn"
}

/// Get the application data directory (`~/Posturelab/`).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Root that relative image paths are resolved against.
pub fn default_static_root() -> PathBuf {
    app_data_dir().join("static")
}

/// Get the models directory (pose landmark ONNX weights).
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ═══════════════════════════════════════════════════════════
// Configuration types
// ═══════════════════════════════════════════════════════════

/// Where annotated images are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Absolute root; relative paths are joined onto it.
    pub static_root: PathBuf,
    /// Subdirectory below `static_root` for posture uploads.
    pub upload_subdir: String,
    pub canonical_width: u32,
    pub canonical_height: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_root: default_static_root(),
            upload_subdir: DEFAULT_UPLOAD_SUBDIR.to_string(),
            canonical_width: CANONICAL_WIDTH,
            canonical_height: CANONICAL_HEIGHT,
        }
    }
}

/// Landmark detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// BlazePose landmark model (`.onnx`). `None` disables detection.
    pub model_path: Option<PathBuf>,
    pub min_detection_confidence: f32,
    /// Landmarks below this visibility are treated as absent.
    pub min_landmark_visibility: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_landmark_visibility: 0.0,
        }
    }
}

/// Sensitivity thresholds for the geometric analyzer, in normalized units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisThresholds {
    /// Vertical difference (fraction of height) before a side counts as elevated.
    pub level: f32,
    /// Horizontal ankle-vs-heel offset (fraction of width) before valgus/varus.
    pub hindfoot: f32,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL_THRESHOLD,
            hindfoot: DEFAULT_HINDFOOT_THRESHOLD,
        }
    }
}

/// Text-generation providers and the ordered candidate list.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// Candidate model identifiers for the primary provider, tried in order.
    pub text_models: Vec<String>,
    /// Model for the secondary multimodal provider.
    pub vision_model: String,
    #[serde(skip_serializing)]
    pub groq_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub groq_base_url: String,
    pub gemini_base_url: String,
    pub timeout_secs: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            text_models: vec![DEFAULT_TEXT_MODEL.to_string()],
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            groq_api_key: None,
            gemini_api_key: None,
            groq_base_url: GROQ_BASE_URL.to_string(),
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            timeout_secs: 120,
        }
    }
}

// Keys must never reach logs.
impl std::fmt::Debug for NarrativeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeConfig")
            .field("text_models", &self.text_models)
            .field("vision_model", &self.vision_model)
            .field("groq_api_key", &self.groq_api_key.as_ref().map(|_| "<set>"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<set>"))
            .field("groq_base_url", &self.groq_base_url)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Full pipeline configuration. Built once at startup and passed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub detection: DetectionConfig,
    pub analysis: AnalysisThresholds,
    pub narrative: NarrativeConfig,
}

/// On-disk shape: the sectioned layout plus the legacy flat
/// `{"text_models": [...], "vision_model": "..."}` keys.
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(flatten)]
    config: PipelineConfig,
    #[serde(default)]
    text_models: Option<Vec<String>>,
    #[serde(default)]
    vision_model: Option<String>,
}

impl PipelineConfig {
    /// Parse a configuration file. Legacy top-level model keys win over the
    /// `narrative` section when both are present.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: ConfigFile = serde_json::from_str(raw)?;
        let mut config = file.config;
        if let Some(models) = file.text_models {
            config.narrative.text_models = models;
        }
        if let Some(model) = file.vision_model {
            config.narrative.vision_model = model;
        }
        Ok(config)
    }

    /// Load configuration for the process: optional file, then environment.
    ///
    /// A missing or malformed file is logged and replaced by defaults; startup
    /// never fails on configuration.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = match path {
            Some(p) => match Self::from_file(p) {
                Ok(c) => {
                    tracing::info!(path = %p.display(), "Configuration loaded");
                    c
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Using default configuration");
                    Self::default()
                }
            },
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_GROQ_API_KEY) {
            self.narrative.groq_api_key = Some(key);
        }
        if let Some(key) = non_empty(ENV_GEMINI_API_KEY) {
            self.narrative.gemini_api_key = Some(key);
        }
        if let Some(root) = non_empty(ENV_STATIC_ROOT) {
            self.storage.static_root = PathBuf::from(root);
        }
        if let Some(model) = non_empty(ENV_POSE_MODEL) {
            self.detection.model_path = Some(PathBuf::from(model));
        }

        if self.narrative.groq_api_key.is_none() {
            tracing::warn!("GROQ_API_KEY not set; primary text provider disabled");
        }
        if self.narrative.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; multimodal provider disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Posturelab"));
    }

    #[test]
    fn static_root_under_app_data() {
        assert!(default_static_root().starts_with(app_data_dir()));
    }

    #[test]
    fn defaults_match_clinical_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.storage.canonical_width, 600);
        assert_eq!(config.storage.canonical_height, 800);
        assert!((config.analysis.level - 0.007).abs() < f32::EPSILON);
        assert!((config.analysis.hindfoot - 0.01).abs() < f32::EPSILON);
        assert_eq!(config.narrative.text_models, vec![DEFAULT_TEXT_MODEL.to_string()]);
        assert_eq!(config.storage.upload_subdir, "uploads/patient_images");
    }

    #[test]
    fn legacy_flat_file_sets_models() {
        let raw = r#"{"text_models": ["a", "b"], "vision_model": "gemini-2.5-flash"}"#;
        let config = PipelineConfig::from_json(raw).unwrap();
        assert_eq!(config.narrative.text_models, vec!["a", "b"]);
        assert_eq!(config.narrative.vision_model, "gemini-2.5-flash");
        assert_eq!(config.storage.canonical_height, 800);
    }

    #[test]
    fn sectioned_file_overrides_thresholds() {
        let raw = r#"{"analysis": {"level": 0.02}, "narrative": {"text_models": ["x"]}}"#;
        let config = PipelineConfig::from_json(raw).unwrap();
        assert!((config.analysis.level - 0.02).abs() < f32::EPSILON);
        assert!((config.analysis.hindfoot - DEFAULT_HINDFOOT_THRESHOLD).abs() < f32::EPSILON);
        assert_eq!(config.narrative.text_models, vec!["x"]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = PipelineConfig::load(Some(Path::new("/nonexistent/posturelab.json")));
        assert_eq!(config.storage.canonical_width, CANONICAL_WIDTH);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_apply_non_empty_values_only() {
        let env: HashMap<&str, &str> = [
            (ENV_GROQ_API_KEY, "gsk_test"),
            (ENV_GEMINI_API_KEY, "   "),
            (ENV_STATIC_ROOT, "/srv/clinic/static"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.narrative.groq_api_key.as_deref(), Some("gsk_test"));
        assert!(config.narrative.gemini_api_key.is_none());
        assert_eq!(config.storage.static_root, PathBuf::from("/srv/clinic/static"));
        assert!(config.detection.model_path.is_none());
    }

    #[test]
    fn debug_output_hides_api_keys() {
        let mut config = NarrativeConfig::default();
        config.groq_api_key = Some("gsk_secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("gsk_secret"));
        assert!(rendered.contains("<set>"));
    }

    #[test]
    fn serialized_config_omits_api_keys() {
        let mut config = PipelineConfig::default();
        config.narrative.gemini_api_key = Some("AIza-secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("AIza-secret"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}

use std::fs::OpenOptions;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use image::{DynamicImage, ImageOutputFormat, RgbImage};

use super::AnnotationError;
use crate::config::StorageConfig;

/// Upload extensions accepted for clinical photographs (lowercase).
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Length of the random hex suffix appended to every stored filename.
pub const SUFFIX_LEN: usize = 6;

const JPEG_QUALITY: u8 = 90;

/// Fresh names tried before a collision is reported as a failed upload.
pub const MAX_NAME_ATTEMPTS: usize = 3;

/// Lowercased extension of an upload filename, if it is an allowed image type.
/// Only the text after the last dot counts, so `.png` is accepted.
pub fn allowed_extension(filename: &str) -> Result<String, AnnotationError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty());

    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(AnnotationError::UnsupportedType(filename.to_string())),
    }
}

/// Six lowercase hex characters from a v4 UUID.
pub fn random_suffix() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(SUFFIX_LEN);
    hex
}

/// `{base}_{suffix}.{ext}`
pub fn unique_filename(base_name: &str, extension: &str) -> String {
    format!("{}_{}.{}", sanitize_component(base_name), random_suffix(), extension)
}

/// Restrict a filename component to `[A-Za-z0-9._-]`.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Context-scoped base name: `{patient_id}_{dd-mm-YYYY}_{slot}`.
pub fn base_filename(patient_id: &str, date: NaiveDate, slot: &str) -> String {
    sanitize_component(&format!("{patient_id}_{}_{slot}", date.format("%d-%m-%Y")))
}

/// Encoder for an allowed extension. `None` means the raster encoder cannot
/// write this format and the original bytes must be kept.
pub fn output_format(extension: &str) -> Option<ImageOutputFormat> {
    match extension {
        "png" => Some(ImageOutputFormat::Png),
        "jpg" | "jpeg" => Some(ImageOutputFormat::Jpeg(JPEG_QUALITY)),
        "gif" => Some(ImageOutputFormat::Gif),
        _ => None,
    }
}

pub fn encode_image(image: &RgbImage, format: ImageOutputFormat) -> Result<Vec<u8>, AnnotationError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut cursor, format)
        .map_err(|e| AnnotationError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Images under `{static_root}/{subdir}`, referenced by `{subdir}/{filename}`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    static_root: PathBuf,
    subdir: String,
}

impl ImageStore {
    pub fn new(static_root: impl Into<PathBuf>, subdir: impl Into<String>) -> Self {
        let subdir: String = subdir.into();
        Self {
            static_root: static_root.into(),
            subdir: subdir.trim_matches('/').replace('\\', "/"),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.static_root, &config.upload_subdir)
    }

    /// Store for a nested category, e.g. `rx` for radiographs.
    pub fn child(&self, name: &str) -> Self {
        Self::new(&self.static_root, format!("{}/{}", self.subdir, sanitize_component(name)))
    }

    pub fn static_root(&self) -> &Path {
        &self.static_root
    }

    pub fn directory(&self) -> PathBuf {
        self.subdir
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.static_root.clone(), |p, s| p.join(s))
    }

    pub fn relative_path(&self, filename: &str) -> String {
        if self.subdir.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.subdir, filename)
        }
    }

    /// Absolute path for a stored relative path. Rejects parent traversal.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let mut path = self.static_root.clone();
        for part in relative.split(['/', '\\']).filter(|s| !s.is_empty()) {
            if part == ".." {
                return None;
            }
            path.push(part);
        }
        Some(path)
    }

    /// Write a new file. Never overwrites: an existing name is an error.
    pub fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, AnnotationError> {
        let dir = self.directory();
        std::fs::create_dir_all(&dir).map_err(|source| AnnotationError::Write {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(filename);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| AnnotationError::Write {
                path: path.clone(),
                source,
            })?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|source| AnnotationError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Image stored");
        Ok(self.relative_path(filename))
    }

    /// Write under a fresh `{base}_{suffix}.{ext}` name, drawing a new suffix
    /// when the name is already taken.
    pub fn save_unique(&self, base_name: &str, extension: &str, bytes: &[u8]) -> Result<String, AnnotationError> {
        self.save_with_names(|| unique_filename(base_name, extension), bytes)
    }

    fn save_with_names<F>(&self, mut next_name: F, bytes: &[u8]) -> Result<String, AnnotationError>
    where
        F: FnMut() -> String,
    {
        let mut attempt = 1;
        loop {
            let filename = next_name();
            match self.save(&filename, bytes) {
                Err(AnnotationError::Write { source, .. })
                    if source.kind() == std::io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS =>
                {
                    tracing::warn!(filename = %filename, attempt, "Generated name already taken; retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── naming ──

    #[test]
    fn extension_is_lowercased_and_checked() {
        assert_eq!(allowed_extension("Front.JPG").unwrap(), "jpg");
        assert_eq!(allowed_extension("scan.final.webp").unwrap(), "webp");
        assert!(allowed_extension("report.pdf").is_err());
        assert!(allowed_extension("noextension").is_err());
        assert_eq!(allowed_extension(".png").unwrap(), "png");
        assert!(allowed_extension("trailing.").is_err());
        assert!(allowed_extension("").is_err());
    }

    #[test]
    fn unique_filename_has_six_hex_suffix() {
        let name = unique_filename("42_03-10-2026_frente", "png");
        let stem = name.strip_suffix(".png").unwrap();
        let (base, suffix) = stem.rsplit_once('_').unwrap();
        assert_eq!(base, "42_03-10-2026_frente");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn suffixes_differ_between_calls() {
        let a = unique_filename("base", "png");
        let b = unique_filename("base", "png");
        assert_ne!(a, b);
    }

    #[test]
    fn base_filename_formats_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(base_filename("117", date, "lado"), "117_07-03-2026_lado");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_component("ana maría"), "ana_mar_a");
        assert_eq!(sanitize_component("..."), "image");
    }

    #[test]
    fn webp_has_no_encoder() {
        assert!(output_format("webp").is_none());
        assert!(output_format("jpeg").is_some());
    }

    // ── store ──

    #[test]
    fn save_returns_forward_slash_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "uploads/patient_images");
        let rel = store.save("a_123abc.png", b"png-bytes").unwrap();
        assert_eq!(rel, "uploads/patient_images/a_123abc.png");
        let abs = store.resolve(&rel).unwrap();
        assert_eq!(std::fs::read(abs).unwrap(), b"png-bytes");
    }

    #[test]
    fn save_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "uploads");
        store.save("same.png", b"first").unwrap();
        let err = store.save("same.png", b"second").unwrap_err();
        assert!(matches!(err, AnnotationError::Write { .. }));
        let abs = store.resolve("uploads/same.png").unwrap();
        assert_eq!(std::fs::read(abs).unwrap(), b"first");
    }

    #[test]
    fn name_collision_retries_with_fresh_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "uploads");
        store.save("taken.png", b"first").unwrap();

        let mut names = ["taken.png", "fresh.png"].into_iter().map(String::from);
        let rel = store
            .save_with_names(|| names.next().unwrap_or_default(), b"second")
            .unwrap();
        assert_eq!(rel, "uploads/fresh.png");
        assert_eq!(std::fs::read(store.resolve("uploads/taken.png").unwrap()).unwrap(), b"first");
    }

    #[test]
    fn persistent_collision_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "uploads");
        store.save("taken.png", b"first").unwrap();

        let mut calls = 0;
        let err = store
            .save_with_names(
                || {
                    calls += 1;
                    "taken.png".to_string()
                },
                b"second",
            )
            .unwrap_err();
        assert!(matches!(err, AnnotationError::Write { .. }));
        assert_eq!(calls, MAX_NAME_ATTEMPTS);
    }

    #[test]
    fn save_unique_uses_base_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "uploads");
        let rel = store.save_unique("p_01-01-2026_frente", "gif", b"x").unwrap();
        assert!(rel.starts_with("uploads/p_01-01-2026_frente_"));
        assert!(rel.ends_with(".gif"));
    }

    #[test]
    fn child_store_nests_subdir() {
        let store = ImageStore::new("/srv/static", "uploads/patient_images").child("rx");
        assert_eq!(store.relative_path("x.png"), "uploads/patient_images/rx/x.png");
        assert_eq!(
            store.directory(),
            PathBuf::from("/srv/static/uploads/patient_images/rx")
        );
    }

    #[test]
    fn resolve_rejects_traversal() {
        let store = ImageStore::new("/srv/static", "uploads");
        assert!(store.resolve("uploads/../../etc/passwd").is_none());
        assert_eq!(
            store.resolve("uploads\\a.png"),
            Some(PathBuf::from("/srv/static/uploads/a.png"))
        );
    }

    #[test]
    fn encode_png_decodes_back() {
        let img = RgbImage::from_pixel(8, 8, image::Rgb([9, 9, 9]));
        let bytes = encode_image(&img, ImageOutputFormat::Png).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(back.dimensions(), (8, 8));
    }
}

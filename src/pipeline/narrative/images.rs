//! Stored relative image paths → multimodal prompt parts.

use crate::pipeline::annotation::ImageStore;

use super::types::PromptPart;
use super::NarrativeError;

/// Read a stored image as an attachable part.
pub fn load_image_part(store: &ImageStore, relative_path: &str) -> Result<PromptPart, NarrativeError> {
    let image_error = |reason: String| NarrativeError::Image {
        path: relative_path.to_string(),
        reason,
    };

    let path = store
        .resolve(relative_path)
        .ok_or_else(|| image_error("path leaves the static root".into()))?;

    let mime = mime_guess::from_path(&path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| image_error("not an image type".into()))?;

    let bytes = std::fs::read(&path).map_err(|e| image_error(e.to_string()))?;

    Ok(PromptPart::Image {
        mime_type: mime.essence_str().to_string(),
        bytes,
    })
}

/// Attach each `(caption, path)` in order, each image preceded by a caption
/// part. Images that cannot be loaded are skipped with a warning. Returns the
/// number attached.
pub fn attach_images<'p, I>(store: &ImageStore, images: I, parts: &mut Vec<PromptPart>) -> usize
where
    I: IntoIterator<Item = (&'p str, &'p str)>,
{
    let mut attached = 0;
    for (caption, relative_path) in images {
        match load_image_part(store, relative_path) {
            Ok(image) => {
                parts.push(PromptPart::Text(format!("\n--- IMAGE: {caption} ---")));
                parts.push(image);
                attached += 1;
            }
            Err(e) => tracing::warn!(caption, error = %e, "Skipping image attachment"),
        }
    }
    attached
}

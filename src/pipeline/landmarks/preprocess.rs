//! Decoding and canonical sizing of clinical photographs.
//!
//! Every upload goes through the same steps before detection so that the
//! detector, the analyzer and the renderer all see one identical raster:
//! 1. Reject oversized input
//! 2. Decode
//! 3. Fix EXIF orientation (phone photos embed rotation in tag 0x0112)
//! 4. Convert to RGB
//! 5. Resize to the canonical width x height

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use tracing::debug;

use super::LandmarkError;

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// A decoded upload at canonical resolution.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pub image: RgbImage,
    pub original_width: u32,
    pub original_height: u32,
    /// EXIF orientation that was applied (1 = none).
    pub orientation: u32,
}

impl CanonicalImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decode, orient and resize raw upload bytes.
///
/// Errors here are contract violations (the bytes are not an image) and are
/// meant to propagate.
pub fn load_canonical(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> Result<CanonicalImage, LandmarkError> {
    validate_image_bytes(bytes)?;

    let img = image::load_from_memory(bytes)
        .map_err(|e| LandmarkError::Decode(e.to_string()))?;
    let (orig_w, orig_h) = img.dimensions();

    let orientation = read_exif_orientation(bytes);
    let img = apply_orientation(img, orientation);

    let rgb = img.to_rgb8();
    let image = resize_canonical(&rgb, width, height);

    debug!(
        original = format!("{orig_w}x{orig_h}"),
        canonical = format!("{width}x{height}"),
        orientation,
        "Upload decoded to canonical size"
    );

    Ok(CanonicalImage {
        image,
        original_width: orig_w,
        original_height: orig_h,
        orientation,
    })
}

/// Stretch to exactly `width` x `height`. Aspect ratio is not preserved: the
/// clinic's photographs are taken portrait and downstream geometry expects a
/// fixed frame.
pub fn resize_canonical(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    if img.width() == width && img.height() == height {
        return img.clone();
    }
    image::imageops::resize(img, width, height, FilterType::Triangle)
}

/// Upper bound on input size. Small inputs are left to the decoder: a
/// 1x1 GIF is valid at under 50 bytes.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), LandmarkError> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(LandmarkError::Decode(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

use std::path::Path;

use image::RgbImage;

/// Image decode seam.
///
/// Returns `None` for both missing and corrupt files; callers do not
/// distinguish the two.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Option<RgbImage>;
}

/// Decoder backed by the `image` crate's format detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageDecoder;

impl ImageDecoder for FsImageDecoder {
    fn decode(&self, path: &Path) -> Option<RgbImage> {
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(err) => {
                tracing::warn!("[ImageDecoder] Failed to decode {:?}: {}", path, err);
                None
            }
        }
    }
}

use std::path::Path;

use image::imageops::FilterType;
use ttydash_core::error::AppError;
use ttydash_core::traits::{FrameDecoder, PixelGrid};

/// [`FrameDecoder`] using the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl FrameDecoder for ImageDecoder {
    fn decode_resized(&self, path: &Path, width: u32, height: u32) -> Result<PixelGrid, AppError> {
        let failed = |cause: String| AppError::DecodeFailed {
            path: path.display().to_string(),
            cause,
        };

        let image = image::open(path).map_err(|e| failed(e.to_string()))?;
        let rgb = image
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();
        let pixels = rgb.pixels().map(|p| p.0).collect();

        PixelGrid::new(width, height, pixels)
            .ok_or_else(|| failed(format!("resize did not produce {width}x{height}")))
    }
}

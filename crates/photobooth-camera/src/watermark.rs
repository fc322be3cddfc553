use std::path::Path;

use image::{
    codecs::jpeg::JpegEncoder, imageops, imageops::FilterType, ColorType, DynamicImage,
    ImageFormat, RgbImage, RgbaImage,
};
use photobooth_types::{PhotoboothError, Result};
use tracing::info;

use crate::camera_error;

/// Branding overlay, scaled and faded once at startup and reused for every photo.
#[derive(Clone)]
pub struct Watermark {
    overlay: RgbaImage,
    position: (i64, i64),
}

impl Watermark {
    pub fn load<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        opacity: f32,
        position: (i64, i64),
    ) -> Result<Self> {
        let path_ref = path.as_ref();
        let source = image::open(path_ref).map_err(|err| {
            PhotoboothError::Initialization(format!(
                "unable to load watermark {}: {err}",
                path_ref.display()
            ))
        })?;
        let watermark = Self::prepare(&source, width, height, opacity, position);
        info!(
            "Watermark {} prepared at {}x{}, placed at {:?}",
            path_ref.display(),
            width,
            height,
            position
        );
        Ok(watermark)
    }

    /// Resize `source` to exactly `width`x`height` and scale its alpha by `opacity`.
    pub fn prepare(
        source: &DynamicImage,
        width: u32,
        height: u32,
        opacity: f32,
        position: (i64, i64),
    ) -> Self {
        let mut overlay = imageops::resize(&source.to_rgba8(), width, height, FilterType::Lanczos3);
        let opacity = opacity.clamp(0.0, 1.0);
        for pixel in overlay.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * opacity) as u8;
        }
        Self { overlay, position }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.overlay.dimensions()
    }

    pub fn position(&self) -> (i64, i64) {
        self.position
    }

    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    /// Alpha-blend the overlay onto `canvas`; parts outside the canvas are clipped.
    pub fn apply(&self, canvas: &mut RgbaImage) {
        imageops::overlay(canvas, &self.overlay, self.position.0, self.position.1);
    }
}

/// Decode a captured JPEG, stamp the watermark and re-encode for storage.
pub fn compose_photo(jpeg: &[u8], watermark: Option<&Watermark>, quality: u8) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
        .map_err(|err| camera_error(format!("failed to decode captured frame: {err}")))?;
    let mut canvas = decoded.to_rgba8();
    if let Some(watermark) = watermark {
        watermark.apply(&mut canvas);
    }
    let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();
    encode_jpeg(&flattened, quality)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|err| camera_error(format!("failed to encode JPEG: {err}")))?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, Rgba};

    fn solid_rgba(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn prepare_scales_and_fades_alpha() {
        let source = solid_rgba(40, 10, [255, 255, 255, 200]);
        let watermark = Watermark::prepare(&source, 20, 4, 0.5, (0, 10));
        assert_eq!(watermark.dimensions(), (20, 4));
        assert!(watermark.overlay().pixels().all(|p| p[3] == 100));
    }

    #[test]
    fn compose_stamps_only_the_watermark_band() {
        let frame = RgbImage::from_pixel(32, 40, Rgb([0, 0, 0]));
        let jpeg = encode_jpeg(&frame, 95).expect("encode");
        let source = solid_rgba(32, 8, [255, 255, 255, 255]);
        // Band occupies rows 22..30: 40 - 8 - 10.
        let watermark = Watermark::prepare(&source, 32, 8, 1.0, (0, 22));

        let composed = compose_photo(&jpeg, Some(&watermark), 95).expect("compose");
        let decoded = image::load_from_memory(&composed).expect("decode");
        assert_eq!(decoded.dimensions(), (32, 40));

        let luma = |x, y| decoded.get_pixel(x, y)[0];
        assert!(luma(16, 26) > 200, "band should be bright");
        assert!(luma(16, 5) < 50, "top should stay dark");
        assert!(luma(16, 36) < 50, "bottom offset should stay dark");
    }

    #[test]
    fn compose_without_watermark_keeps_dimensions() {
        let frame = RgbImage::from_pixel(16, 12, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&frame, 80).expect("encode");
        let composed = compose_photo(&jpeg, None, 80).expect("compose");
        let decoded = image::load_from_memory(&composed).expect("decode");
        assert_eq!(decoded.dimensions(), (16, 12));
    }

    #[test]
    fn corrupt_frame_is_capture_error() {
        let err = compose_photo(b"not a jpeg", None, 80).expect_err("corrupt");
        assert!(matches!(err, PhotoboothError::Capture(_)));
    }

    #[test]
    fn load_reads_png_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("watermark.png");
        solid_rgba(10, 10, [0, 0, 255, 255]).save(&path).expect("save png");
        let watermark = Watermark::load(&path, 5, 2, 0.5, (0, 0)).expect("load");
        assert_eq!(watermark.dimensions(), (5, 2));

        let missing = Watermark::load(dir.path().join("missing.png"), 5, 2, 0.5, (0, 0));
        assert!(matches!(missing, Err(PhotoboothError::Initialization(_))));
    }
}

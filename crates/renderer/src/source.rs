use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{RenderError, RenderResult};

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a decoded image. Every load gets a fresh id, even when the same
/// file is loaded twice, so GPU caches keyed by it are invalidated on reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    fn next() -> Self {
        Self(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// A decoded RGBA8 pixel grid. Cheap to clone; the pixels are shared.
#[derive(Clone)]
pub struct SourceImage {
    id: ImageId,
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    /// Wraps already-decoded pixels. Zero-sized images are rejected so the
    /// pipeline never binds an empty texture.
    pub fn from_rgba8(pixels: RgbaImage) -> RenderResult<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyImage { width, height });
        }
        Ok(Self {
            id: ImageId::next(),
            pixels: Arc::new(pixels),
        })
    }

    /// Wraps raw RGBA bytes in row-major order.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let pixels = RgbaImage::from_raw(width, height, data).ok_or(
            RenderError::ImageDataMismatch {
                width,
                height,
                expected,
                actual,
            },
        )?;
        Self::from_rgba8(pixels)
    }

    /// Decodes an image file into RGBA8.
    pub fn open(path: &Path) -> RenderResult<Self> {
        let decoded = image::open(path).map_err(|source| RenderError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let image = Self::from_rgba8(decoded.to_rgba8())?;
        tracing::info!(
            path = %path.display(),
            id = %image.id,
            width = image.width(),
            height = image.height(),
            "decoded source image"
        );
        Ok(image)
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Normalized texel with clamp-to-edge addressing.
    pub fn texel_clamped(&self, x: i64, y: i64) -> [f32; 4] {
        let cx = x.clamp(0, self.width() as i64 - 1) as u32;
        let cy = y.clamp(0, self.height() as i64 - 1) as u32;
        self.pixels.get_pixel(cx, cy).0.map(|c| c as f32 / 255.0)
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_images() {
        let err = SourceImage::from_rgba8(RgbaImage::new(0, 4)).unwrap_err();
        assert!(matches!(err, RenderError::EmptyImage { width: 0, height: 4 }));
        assert!(SourceImage::from_raw(3, 0, Vec::new()).is_err());
    }

    #[test]
    fn rejects_short_buffers() {
        let err = SourceImage::from_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ImageDataMismatch {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn every_load_gets_a_new_id() {
        let a = SourceImage::from_raw(1, 1, vec![0; 4]).unwrap();
        let b = SourceImage::from_raw(1, 1, vec![0; 4]).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn texel_reads_clamp_to_edge() {
        let image = SourceImage::from_raw(2, 1, vec![0, 0, 0, 255, 255, 255, 255, 255]).unwrap();
        assert_eq!(image.texel_clamped(-4, 0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(image.texel_clamped(9, 7), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn missing_file_is_an_image_load_failure() {
        let err = SourceImage::open(Path::new("/nonexistent/texfilter.png")).unwrap_err();
        assert!(matches!(err, RenderError::ImageLoad { .. }));
    }
}

//! Document renderer binding.
//!
//! The overlay engine never rasterizes on its own: it asks a
//! [`DocumentRenderer`] for page bitmaps and page text, and hands it
//! short-lived `blob:` URLs minted by the [`ResourceRegistry`].

pub mod pdf;
pub mod resources;
pub mod stub;

use async_trait::async_trait;
use doc_model::{PageSize, Rotation};
use image::{ImageBuffer, Rgba};

pub use pdf::LopdfRenderer;
pub use resources::{ObjectUrl, ResourceRegistry, BLOB_SCHEME};
pub use stub::StubRenderer;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub handle: DocumentHandle,
    pub page_count: u32,
    /// Native size of each page, index 0 is page 1.
    pub page_sizes: Vec<PageSize>,
}

impl LoadedDocument {
    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        page.checked_sub(1).and_then(|index| self.page_sizes.get(index as usize)).copied()
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: u32,
    pub width_px: u32,
    pub height_px: u32,
    pub bitmap: RgbaImage,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("document unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("document is corrupt: {0}")]
    Corrupt(String),
    #[error("document has no pages")]
    Empty,
    #[error("encrypted documents are not supported")]
    Encrypted,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unknown document handle {0}")]
    UnknownHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("failed to rasterize page {page}: {reason}")]
    Rasterize { page: u32, reason: String },
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn load_document(&self, url: &str) -> Result<LoadedDocument, LoadError>;

    async fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f64,
        rotation: Rotation,
    ) -> Result<RenderedPage, RenderError>;

    /// Best effort: any failure yields an empty string.
    async fn extract_text(&self, handle: DocumentHandle, page: u32) -> String;

    /// Releases a loaded document. Returns `false` for unknown handles.
    async fn close(&self, handle: DocumentHandle) -> bool;
}

/// Largest bitmap a renderer will allocate, in pixels.
pub const MAX_BITMAP_PIXELS: u64 = 64 * 1024 * 1024;

/// Placeholder page bitmap: white with a light border, sized for the
/// requested scale and rotation. Pages whose bitmap would exceed
/// [`MAX_BITMAP_PIXELS`] fail for that page alone.
pub(crate) fn blank_page(
    page: u32,
    size: PageSize,
    scale: f64,
    rotation: Rotation,
) -> Result<RenderedPage, RenderError> {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let (width, height) = if rotation.swaps_axes() {
        (size.height, size.width)
    } else {
        (size.width, size.height)
    };
    let width = (width * scale).round().max(1.0);
    let height = (height * scale).round().max(1.0);
    if !width.is_finite() || !height.is_finite() || width * height > MAX_BITMAP_PIXELS as f64 {
        return Err(RenderError::Rasterize {
            page,
            reason: format!("{width}x{height} bitmap exceeds {MAX_BITMAP_PIXELS} pixels"),
        });
    }
    let width_px = width as u32;
    let height_px = height as u32;

    let mut bitmap = RgbaImage::from_pixel(width_px, height_px, Rgba([255, 255, 255, 255]));
    if width_px >= 4 && height_px >= 4 {
        let border = Rgba([220, 220, 220, 255]);
        for x in 0..width_px {
            bitmap.put_pixel(x, 0, border);
            bitmap.put_pixel(x, height_px - 1, border);
        }
        for y in 0..height_px {
            bitmap.put_pixel(0, y, border);
            bitmap.put_pixel(width_px - 1, y, border);
        }
    }

    Ok(RenderedPage { page, width_px, height_px, bitmap })
}

pub(crate) fn check_page(page: u32, page_count: u32) -> Result<(), RenderError> {
    if page == 0 || page > page_count {
        return Err(RenderError::PageOutOfRange { page, page_count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_page_swaps_dimensions_when_rotated() {
        let size = PageSize { width: 100.0, height: 200.0 };

        let upright = blank_page(1, size, 1.5, Rotation::Deg0).unwrap();
        assert_eq!((upright.width_px, upright.height_px), (150, 300));

        let turned = blank_page(1, size, 1.5, Rotation::Deg270).unwrap();
        assert_eq!((turned.width_px, turned.height_px), (300, 150));
        assert_eq!(turned.bitmap.dimensions(), (300, 150));
    }

    #[test]
    fn oversized_bitmap_is_a_rasterize_error() {
        let poster = PageSize { width: 14_400.0, height: 14_400.0 };

        let err = blank_page(3, poster, 3.0, Rotation::Deg0).unwrap_err();
        assert!(matches!(err, RenderError::Rasterize { page: 3, .. }));

        let huge = PageSize { width: 1e9, height: 1e9 };
        assert!(blank_page(1, huge, 1.0, Rotation::Deg90).is_err());
        assert!(blank_page(1, PageSize::default(), 3.0, Rotation::Deg0).is_ok());
    }

    #[test]
    fn page_numbers_are_one_based() {
        assert!(check_page(1, 3).is_ok());
        assert!(matches!(check_page(0, 3), Err(RenderError::PageOutOfRange { page: 0, .. })));
        assert!(matches!(check_page(4, 3), Err(RenderError::PageOutOfRange { page: 4, .. })));
    }

    #[test]
    fn loaded_document_page_size_lookup() {
        let doc = LoadedDocument {
            handle: DocumentHandle::new(1),
            page_count: 1,
            page_sizes: vec![PageSize::default()],
        };
        assert_eq!(doc.page_size(1), Some(PageSize::default()));
        assert_eq!(doc.page_size(0), None);
        assert_eq!(doc.page_size(2), None);
    }
}

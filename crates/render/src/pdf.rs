use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use doc_model::{PageSize, Rotation};
use lopdf::{Dictionary, Document, ObjectId};
use tokio::sync::RwLock;

use crate::{
    blank_page, check_page, DocumentHandle, DocumentRenderer, LoadError, LoadedDocument,
    RenderError, RenderedPage, ResourceRegistry,
};

const MAX_PARENT_DEPTH: usize = 16;
/// PDF user space limit for a page side.
const MAX_PAGE_UNITS: f64 = 14_400.0;

#[derive(Debug)]
struct PdfRecord {
    bytes: Arc<[u8]>,
    page_sizes: Vec<PageSize>,
}

/// `lopdf`-backed renderer: real page count, MediaBox sizes and page text,
/// placeholder bitmaps.
#[derive(Debug, Clone, Default)]
pub struct LopdfRenderer {
    registry: ResourceRegistry,
    next_handle: Arc<RwLock<u64>>,
    docs: Arc<RwLock<HashMap<DocumentHandle, Arc<PdfRecord>>>>,
}

impl LopdfRenderer {
    pub fn new(registry: ResourceRegistry) -> Self {
        Self { registry, ..Self::default() }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    fn parse(bytes: Arc<[u8]>) -> Result<PdfRecord, LoadError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(LoadError::Encrypted);
        }

        let doc = Document::load_mem(&bytes).map_err(|err| LoadError::Corrupt(err.to_string()))?;
        let page_sizes: Vec<PageSize> =
            doc.get_pages().into_values().map(|page_id| media_box(&doc, page_id)).collect();

        if page_sizes.is_empty() {
            return Err(LoadError::Empty);
        }

        Ok(PdfRecord { bytes, page_sizes })
    }

    async fn record(&self, handle: DocumentHandle) -> Option<Arc<PdfRecord>> {
        self.docs.read().await.get(&handle).cloned()
    }
}

/// Reads the page MediaBox, following `/Parent` for inherited boxes.
/// Boxes that are empty or larger than [`MAX_PAGE_UNITS`] are skipped.
fn media_box(doc: &Document, page_id: ObjectId) -> PageSize {
    let mut current = doc.get_dictionary(page_id).ok();

    for _ in 0..MAX_PARENT_DEPTH {
        let Some(dict) = current else { break };
        if let Some(size) = parse_media_box(dict) {
            return size;
        }
        current = dict
            .get(b"Parent")
            .and_then(|parent| parent.as_reference())
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }

    PageSize::default()
}

fn parse_media_box(dict: &Dictionary) -> Option<PageSize> {
    let array = dict.get(b"MediaBox").ok()?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;
    let width = f64::from((x1 - x0).abs());
    let height = f64::from((y1 - y0).abs());

    let valid = |side: f64| side.is_finite() && side > 0.0 && side <= MAX_PAGE_UNITS;
    (valid(width) && valid(height)).then_some(PageSize { width, height })
}

#[async_trait]
impl DocumentRenderer for LopdfRenderer {
    async fn load_document(&self, url: &str) -> Result<LoadedDocument, LoadError> {
        let bytes = self.registry.fetch(url).await?;
        let record = tokio::task::spawn_blocking(move || Self::parse(bytes))
            .await
            .map_err(|err| LoadError::Corrupt(format!("parse task failed: {err}")))??;

        let page_sizes = record.page_sizes.clone();
        let handle = {
            let mut next = self.next_handle.write().await;
            *next += 1;
            DocumentHandle::new(*next)
        };
        self.docs.write().await.insert(handle, Arc::new(record));

        tracing::info!(url, handle = handle.raw(), pages = page_sizes.len(), "document loaded");
        Ok(LoadedDocument { handle, page_count: page_sizes.len() as u32, page_sizes })
    }

    async fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f64,
        rotation: Rotation,
    ) -> Result<RenderedPage, RenderError> {
        let record = self.record(handle).await.ok_or(RenderError::UnknownHandle(handle.raw()))?;
        check_page(page, record.page_sizes.len() as u32)?;

        let size = record.page_sizes[(page - 1) as usize];
        blank_page(page, size, scale, rotation)
    }

    async fn extract_text(&self, handle: DocumentHandle, page: u32) -> String {
        let Some(record) = self.record(handle).await else {
            return String::new();
        };

        let extracted = tokio::task::spawn_blocking(move || {
            Document::load_mem(&record.bytes).and_then(|doc| doc.extract_text(&[page]))
        })
        .await;
        match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::warn!(page, error = %err, "text extraction failed");
                String::new()
            }
            Err(err) => {
                tracing::warn!(page, error = %err, "text extraction task failed");
                String::new()
            }
        }
    }

    async fn close(&self, handle: DocumentHandle) -> bool {
        self.docs.write().await.remove(&handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Builds a PDF with one page per entry of `pages` (`(width, height, text)`).
    fn build_pdf(pages: &[(i64, i64, &str)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for (width, height, text) in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode content")));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), (*width).into(), (*height).into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[tokio::test]
    async fn loads_page_count_and_media_box_from_blob_url() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(build_pdf(&[(612, 792, "one"), (842, 595, "two")]));

        let doc = renderer.load_document(url.as_str()).await.expect("load should succeed");

        assert_eq!(doc.page_count, 2);
        assert_eq!(doc.page_size(2), Some(PageSize { width: 842.0, height: 595.0 }));
    }

    #[tokio::test]
    async fn out_of_range_media_box_falls_back_to_default_size() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(build_pdf(&[(1_000_000_000, 1_000_000_000, "huge"), (0, 0, "empty")]));

        let doc = renderer.load_document(url.as_str()).await.expect("load should succeed");
        assert_eq!(doc.page_size(1), Some(PageSize::default()));
        assert_eq!(doc.page_size(2), Some(PageSize::default()));

        let page = renderer
            .render_page(doc.handle, 1, 1.0, Rotation::Deg0)
            .await
            .expect("render should succeed");
        assert_eq!((page.width_px, page.height_px), (612, 792));
    }

    #[tokio::test]
    async fn oversized_render_fails_only_that_page() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(build_pdf(&[(14_400, 14_400, "poster"), (612, 792, "letter")]));
        let doc = renderer.load_document(url.as_str()).await.expect("load should succeed");

        let err = renderer
            .render_page(doc.handle, 1, 3.0, Rotation::Deg0)
            .await
            .expect_err("poster page is over the bitmap budget");
        assert!(matches!(err, RenderError::Rasterize { page: 1, .. }));

        let page = renderer
            .render_page(doc.handle, 2, 3.0, Rotation::Deg0)
            .await
            .expect("other pages still render");
        assert_eq!((page.width_px, page.height_px), (1836, 2376));
    }

    #[tokio::test]
    async fn render_uses_scaled_rotated_page_size() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(build_pdf(&[(200, 100, "page")]));
        let doc = renderer.load_document(url.as_str()).await.expect("load should succeed");

        let page = renderer
            .render_page(doc.handle, 1, 2.0, Rotation::Deg90)
            .await
            .expect("render should succeed");
        assert_eq!((page.width_px, page.height_px), (200, 400));

        let err = renderer
            .render_page(doc.handle, 2, 1.0, Rotation::Deg0)
            .await
            .expect_err("page 2 does not exist");
        assert!(matches!(err, RenderError::PageOutOfRange { page: 2, page_count: 1 }));
    }

    #[tokio::test]
    async fn extracts_page_text() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(build_pdf(&[(612, 792, "Gradient descent")]));
        let doc = renderer.load_document(url.as_str()).await.expect("load should succeed");

        assert!(renderer.extract_text(doc.handle, 1).await.contains("Gradient descent"));
        assert_eq!(renderer.extract_text(DocumentHandle::new(42), 1).await, "");
    }

    #[tokio::test]
    async fn garbage_bytes_are_corrupt() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(b"not a pdf".to_vec());

        let err = renderer.load_document(url.as_str()).await.expect_err("should fail");
        assert!(matches!(err, LoadError::Corrupt(_)));
    }

    #[tokio::test]
    async fn encrypted_marker_is_rejected() {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(b"%PDF-1.5\n<< /Encrypt 5 0 R >>".to_vec());

        let err = renderer.load_document(url.as_str()).await.expect_err("should fail");
        assert!(matches!(err, LoadError::Encrypted));
    }
}

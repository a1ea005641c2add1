use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use doc_model::{PageSize, Rotation};
use tokio::sync::RwLock;

use crate::{
    blank_page, check_page, DocumentHandle, DocumentRenderer, LoadError, LoadedDocument,
    RenderError, RenderedPage, ResourceRegistry, BLOB_SCHEME,
};

#[derive(Debug, Default)]
struct StubState {
    next_handle: u64,
    open: HashSet<DocumentHandle>,
}

/// Deterministic in-memory renderer for tests and fixture runs.
///
/// Every loaded document has the configured page count, sizes and text.
/// Pages marked as failing return [`RenderError::Rasterize`].
#[derive(Debug, Clone)]
pub struct StubRenderer {
    page_count: u32,
    page_sizes: HashMap<u32, PageSize>,
    texts: HashMap<u32, String>,
    failing_pages: HashSet<u32>,
    fail_load: bool,
    registry: Option<ResourceRegistry>,
    state: Arc<RwLock<StubState>>,
}

impl StubRenderer {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            page_sizes: HashMap::new(),
            texts: HashMap::new(),
            failing_pages: HashSet::new(),
            fail_load: false,
            registry: None,
            state: Arc::new(RwLock::new(StubState::default())),
        }
    }

    pub fn with_page_size(mut self, page: u32, size: PageSize) -> Self {
        self.page_sizes.insert(page, size);
        self
    }

    pub fn with_text(mut self, page: u32, text: impl Into<String>) -> Self {
        self.texts.insert(page, text.into());
        self
    }

    pub fn with_failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn with_failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// `blob:` URLs must then be live in `registry` to load.
    pub fn with_registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn open_documents(&self) -> usize {
        self.state.read().await.open.len()
    }

    fn page_size(&self, page: u32) -> PageSize {
        self.page_sizes.get(&page).copied().unwrap_or_default()
    }
}

#[async_trait]
impl DocumentRenderer for StubRenderer {
    async fn load_document(&self, url: &str) -> Result<LoadedDocument, LoadError> {
        if let Some(registry) = &self.registry {
            if url.starts_with(BLOB_SCHEME) {
                registry.fetch(url).await?;
            }
        }
        if self.fail_load {
            return Err(LoadError::Corrupt(format!("stub refused to load {url}")));
        }
        if self.page_count == 0 {
            return Err(LoadError::Empty);
        }

        let mut state = self.state.write().await;
        state.next_handle += 1;
        let handle = DocumentHandle::new(state.next_handle);
        state.open.insert(handle);

        tracing::debug!(url, handle = handle.raw(), pages = self.page_count, "stub document loaded");
        Ok(LoadedDocument {
            handle,
            page_count: self.page_count,
            page_sizes: (1..=self.page_count).map(|page| self.page_size(page)).collect(),
        })
    }

    async fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f64,
        rotation: Rotation,
    ) -> Result<RenderedPage, RenderError> {
        if !self.state.read().await.open.contains(&handle) {
            return Err(RenderError::UnknownHandle(handle.raw()));
        }
        check_page(page, self.page_count)?;
        if self.failing_pages.contains(&page) {
            return Err(RenderError::Rasterize { page, reason: "stub failure".to_owned() });
        }

        blank_page(page, self.page_size(page), scale, rotation)
    }

    async fn extract_text(&self, handle: DocumentHandle, page: u32) -> String {
        if !self.state.read().await.open.contains(&handle) {
            return String::new();
        }
        self.texts.get(&page).cloned().unwrap_or_default()
    }

    async fn close(&self, handle: DocumentHandle) -> bool {
        self.state.write().await.open.remove(&handle)
    }
}

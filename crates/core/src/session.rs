//! Viewer session
//!
//! Ties one loaded document to the highlight store, the layout controller and
//! the overlay. Loads and renders are split into a synchronous `begin_*` that
//! hands out a ticket and a synchronous `finish_*`/`complete_*` that accepts
//! or discards the result; the renderer future in between is awaited by the
//! caller, so the session (and its store) stays free while it runs.

use std::sync::Arc;

use doc_model::{
    validate_annotation_text, Annotation, AnnotationId, Highlight, HighlightId, PageSize,
    ScreenPoint, Student, ValidationError,
};
use marginalia_render::{
    DocumentHandle, DocumentRenderer, LoadError, LoadedDocument, ObjectUrl, RenderError,
    RenderedPage, ResourceRegistry,
};
use viewer_core::{PageLayoutController, RenderQueue, RenderTicket, ScreenTransform, TicketStatus};

use crate::config::ViewerConfig;
use crate::error::{SessionError, SessionResult, StoreError};
use crate::overlay::{DrawOp, OverlayRenderer};
use crate::selection::SelectionCapture;
use crate::store::HighlightStore;

/// Receives each accepted annotation submission exactly once.
pub trait AnnotationSink {
    fn on_annotation_create(&mut self, highlight: &Highlight, text: &str);
}

impl<F> AnnotationSink for F
where
    F: FnMut(&Highlight, &str),
{
    fn on_annotation_create(&mut self, highlight: &Highlight, text: &str) {
        self(highlight, text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub seq: u64,
    pub url: ObjectUrl,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The document is now current. `previous` should be closed on the renderer.
    Loaded { page_count: u32, previous: Option<DocumentHandle> },
    /// A newer load was started; the document from this one should be closed.
    Superseded { handle: Option<DocumentHandle> },
}

#[derive(Debug)]
pub enum RenderDelivery {
    Ready { page: RenderedPage, overlay: Vec<DrawOp> },
    Stale { page: u32 },
    Failed { page: u32, error: RenderError },
}

#[derive(Debug)]
struct ActiveDocument {
    loaded: LoadedDocument,
    url: ObjectUrl,
}

pub struct ViewerSession<R> {
    renderer: Arc<R>,
    registry: ResourceRegistry,
    config: ViewerConfig,
    store: HighlightStore,
    layout: PageLayoutController,
    renders: RenderQueue,
    document: Option<ActiveDocument>,
    pending_load: Option<LoadTicket>,
    load_seq: u64,
    sink: Option<Box<dyn AnnotationSink>>,
}

impl<R: DocumentRenderer> ViewerSession<R> {
    pub fn new(renderer: Arc<R>, registry: ResourceRegistry, config: ViewerConfig) -> Self {
        let layout = PageLayoutController::with_view_mode(1, config.view_mode);
        Self {
            renderer,
            registry,
            config,
            store: HighlightStore::new(),
            layout,
            renders: RenderQueue::new(),
            document: None,
            pending_load: None,
            load_seq: 0,
            sink: None,
        }
    }

    pub fn with_store(mut self, store: HighlightStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_sink(mut self, sink: impl AnnotationSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn renderer(&self) -> Arc<R> {
        Arc::clone(&self.renderer)
    }

    pub fn store(&self) -> &HighlightStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut HighlightStore {
        &mut self.store
    }

    pub fn layout(&self) -> &PageLayoutController {
        &self.layout
    }

    /// Navigation, zoom and rotation go through the controller.
    pub fn layout_mut(&mut self) -> &mut PageLayoutController {
        &mut self.layout
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref().map(|doc| &doc.loaded)
    }

    pub fn document_url(&self) -> Option<&ObjectUrl> {
        self.document.as_ref().map(|doc| &doc.url)
    }

    pub fn document_handle(&self) -> SessionResult<DocumentHandle> {
        self.document().map(|doc| doc.handle).ok_or(SessionError::NoDocument)
    }

    /// Registers the bytes under a fresh object URL and revokes the URL of
    /// any still-pending load. The current document stays live until the new
    /// one is ready.
    pub fn begin_load(&mut self, bytes: Vec<u8>) -> LoadTicket {
        if let Some(superseded) = self.pending_load.take() {
            self.registry.revoke(&superseded.url);
            tracing::debug!(seq = superseded.seq, "pending load superseded");
        }

        self.load_seq += 1;
        let ticket = LoadTicket { seq: self.load_seq, url: self.registry.create(bytes) };
        self.pending_load = Some(ticket.clone());
        ticket
    }

    /// Accepts the result of the newest load. A zero-page document is
    /// rejected and its handle is left for the caller to close.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<LoadedDocument, LoadError>,
    ) -> SessionResult<LoadOutcome> {
        let is_current = self.pending_load.as_ref().is_some_and(|pending| pending.seq == ticket.seq);
        if !is_current {
            self.registry.revoke(&ticket.url);
            tracing::debug!(seq = ticket.seq, "discarded superseded load");
            return Ok(LoadOutcome::Superseded { handle: result.ok().map(|doc| doc.handle) });
        }
        self.pending_load = None;

        let loaded = match result {
            Ok(loaded) if loaded.page_count == 0 => {
                self.registry.revoke(&ticket.url);
                return Err(LoadError::Empty.into());
            }
            Ok(loaded) => loaded,
            Err(err) => {
                self.registry.revoke(&ticket.url);
                tracing::warn!(seq = ticket.seq, error = %err, "document load failed");
                return Err(err.into());
            }
        };

        let page_count = loaded.page_count;
        self.layout.set_total_pages(page_count);
        self.renders.discard_before(self.layout.generation());

        let previous = self.document.replace(ActiveDocument { loaded, url: ticket.url });
        if let Some(previous) = &previous {
            self.registry.revoke(&previous.url);
        }

        tracing::info!(seq = ticket.seq, page_count, "document ready");
        Ok(LoadOutcome::Loaded { page_count, previous: previous.map(|doc| doc.loaded.handle) })
    }

    /// Begin, await and finish a load in one call. Documents the session
    /// does not keep are closed on the renderer.
    pub async fn load_bytes(&mut self, bytes: Vec<u8>) -> SessionResult<LoadOutcome> {
        let ticket = self.begin_load(bytes);
        let result = self.renderer.load_document(ticket.url.as_str()).await;
        let empty = result.as_ref().ok().filter(|doc| doc.page_count == 0).map(|doc| doc.handle);

        let outcome = self.finish_load(ticket, result);
        let unused = match &outcome {
            Ok(LoadOutcome::Loaded { previous, .. }) => *previous,
            Ok(LoadOutcome::Superseded { handle }) => *handle,
            Err(_) => empty,
        };
        if let Some(handle) = unused {
            self.renderer.close(handle).await;
        }
        outcome
    }

    pub fn begin_render(&mut self, page: u32) -> SessionResult<RenderTicket> {
        let page_count = self.document().ok_or(SessionError::NoDocument)?.page_count;
        if page == 0 || page > page_count {
            return Err(ValidationError::PageOutOfRange { page, page_count }.into());
        }
        Ok(self.renders.issue(page, self.layout.state(), self.layout.generation()))
    }

    /// One ticket per page currently on screen.
    pub fn begin_visible_renders(&mut self) -> SessionResult<Vec<RenderTicket>> {
        self.layout.visible_pages().into_iter().map(|page| self.begin_render(page)).collect()
    }

    /// Accepts a finished render only if the view has not moved since its
    /// ticket was issued. A failed render affects that page alone.
    pub fn complete_render(
        &mut self,
        ticket: RenderTicket,
        result: Result<RenderedPage, RenderError>,
    ) -> RenderDelivery {
        let visible = self.layout.visible_pages();
        if self.renders.settle(&ticket, self.layout.generation(), &visible) == TicketStatus::Stale {
            tracing::debug!(page = ticket.page, generation = ticket.generation, "discarded stale render");
            return RenderDelivery::Stale { page: ticket.page };
        }

        match result {
            Ok(page) => {
                let overlay = self.draw_list(ticket.page);
                RenderDelivery::Ready { page, overlay }
            }
            Err(error) => {
                tracing::warn!(page = ticket.page, error = %error, "page render failed");
                RenderDelivery::Failed { page: ticket.page, error }
            }
        }
    }

    /// Renders every visible page. Holds the session for the whole await.
    pub async fn render_visible(&mut self) -> SessionResult<Vec<RenderDelivery>> {
        let handle = self.document_handle()?;
        let tickets = self.begin_visible_renders()?;
        let mut deliveries = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let result =
                self.renderer.render_page(handle, ticket.page, ticket.scale, ticket.rotation).await;
            deliveries.push(self.complete_render(ticket, result));
        }
        Ok(deliveries)
    }

    /// Text of a page for selection; empty when unavailable.
    pub async fn page_text(&self, page: u32) -> String {
        match self.document_handle() {
            Ok(handle) => self.renderer.extract_text(handle, page).await,
            Err(_) => String::new(),
        }
    }

    fn page_size(&self, page: u32) -> PageSize {
        self.document().and_then(|doc| doc.page_size(page)).unwrap_or_default()
    }

    /// Page-anchored transform for the current view.
    pub fn transform_for(&self, page: u32) -> ScreenTransform {
        ScreenTransform::for_page(self.layout.state(), self.page_size(page))
    }

    fn overlay(&self) -> OverlayRenderer<'_> {
        OverlayRenderer::new(&self.store).with_label_font_px(self.config.label_font_px)
    }

    pub fn draw_list(&self, page: u32) -> Vec<DrawOp> {
        let mut options = self.config.display_options();
        options.view_mode = self.layout.state().view_mode;
        self.overlay().draw_list_with(page, &self.transform_for(page), &options)
    }

    pub fn hit_test(&self, point: ScreenPoint, page: u32) -> Option<&Highlight> {
        self.overlay().hit_test_with(point, page, &self.transform_for(page))
    }

    /// Turns a finished drag into a stored highlight.
    pub fn create_highlight(
        &mut self,
        selection: SelectionCapture,
        text: &str,
        student: &Student,
    ) -> SessionResult<HighlightId> {
        let transform = self.transform_for(selection.page);
        let highlight = selection.finalize(text, student, &transform)?;
        let id = highlight.id.clone();
        self.store.add(highlight)?;
        Ok(id)
    }

    /// Validates and stores a student's annotation, then notifies the sink.
    pub fn submit_annotation(
        &mut self,
        highlight_id: &HighlightId,
        student: &Student,
        text: &str,
    ) -> SessionResult<AnnotationId> {
        validate_annotation_text(text)?;
        if self.store.get(highlight_id).is_none() {
            return Err(StoreError::UnknownHighlight(highlight_id.clone()).into());
        }

        let annotation = Annotation::new(
            AnnotationId::generate(),
            highlight_id.clone(),
            student.id.clone(),
            student.name.clone(),
            text,
        );
        let id = annotation.id.clone();
        self.store.add_annotation(annotation)?;

        if let (Some(sink), Some(highlight)) = (self.sink.as_mut(), self.store.get(highlight_id)) {
            sink.on_annotation_create(highlight, text);
        }
        tracing::info!(annotation = %id, highlight = %highlight_id, student = %student.id, "annotation submitted");
        Ok(id)
    }
}

use doc_model::{Color, DisplayOptions, Highlight, HighlightId, ScreenPoint, ScreenRect, ViewState};
use serde::Serialize;
use viewer_core::ScreenTransform;

use crate::aggregate::Aggregator;
use crate::store::HighlightStore;

pub const DEFAULT_LABEL_FONT_PX: f64 = 12.0;
/// Count labels sit this far left of the rectangle's right edge.
pub const COUNT_LABEL_INSET_X: f64 = 20.0;
pub const COUNT_LABEL_OFFSET_Y: f64 = 15.0;
pub const NAME_LABEL_GAP: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Count,
    StudentName,
}

/// One drawing instruction in viewport pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    Rect { highlight_id: HighlightId, rect: ScreenRect, color: Color, opacity: f32 },
    Label {
        highlight_id: HighlightId,
        kind: LabelKind,
        text: String,
        anchor: ScreenPoint,
        font_px: f64,
        color: Color,
    },
}

impl DrawOp {
    pub fn highlight_id(&self) -> &HighlightId {
        match self {
            Self::Rect { highlight_id, .. } | Self::Label { highlight_id, .. } => highlight_id,
        }
    }
}

/// Turns a page's highlights into draw ops and answers pointer hit tests.
#[derive(Debug, Clone, Copy)]
pub struct OverlayRenderer<'a> {
    store: &'a HighlightStore,
    label_font_px: f64,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(store: &'a HighlightStore) -> Self {
        Self { store, label_font_px: DEFAULT_LABEL_FONT_PX }
    }

    pub fn with_label_font_px(mut self, label_font_px: f64) -> Self {
        self.label_font_px = label_font_px;
        self
    }

    pub fn draw_list(&self, page: u32, view: &ViewState, options: &DisplayOptions) -> Vec<DrawOp> {
        self.draw_list_with(page, &ScreenTransform::from_view(view), options)
    }

    pub fn draw_list_with(
        &self,
        page: u32,
        transform: &ScreenTransform,
        options: &DisplayOptions,
    ) -> Vec<DrawOp> {
        let aggregator = Aggregator::new(self.store);
        let font_px = self.label_font_px * transform.scale;
        let mut ops = Vec::new();

        for highlight in self.store.by_page(page) {
            let rect = transform.rect_to_screen(highlight.rect);
            ops.push(DrawOp::Rect {
                highlight_id: highlight.id.clone(),
                rect,
                color: highlight.color,
                opacity: highlight.opacity,
            });

            if options.show_highlight_count {
                let count = aggregator.overlap_count(page, &highlight.rect);
                ops.push(DrawOp::Label {
                    highlight_id: highlight.id.clone(),
                    kind: LabelKind::Count,
                    text: count.to_string(),
                    anchor: ScreenPoint::new(
                        rect.x + rect.width - COUNT_LABEL_INSET_X,
                        rect.y + COUNT_LABEL_OFFSET_Y,
                    ),
                    font_px,
                    color: Color::BLACK,
                });
            }

            if options.show_student_names {
                ops.push(DrawOp::Label {
                    highlight_id: highlight.id.clone(),
                    kind: LabelKind::StudentName,
                    text: highlight.student_name.clone(),
                    anchor: ScreenPoint::new(rect.x, rect.y - NAME_LABEL_GAP),
                    font_px,
                    color: Color::BLACK,
                });
            }
        }

        ops
    }

    /// First highlight on `page`, in insertion order, containing the pointer.
    pub fn hit_test(&self, point: ScreenPoint, page: u32, view: &ViewState) -> Option<&'a Highlight> {
        self.hit_test_with(point, page, &ScreenTransform::from_view(view))
    }

    pub fn hit_test_with(
        &self,
        point: ScreenPoint,
        page: u32,
        transform: &ScreenTransform,
    ) -> Option<&'a Highlight> {
        let page_point = transform.point_to_page(point);
        self.store.by_page(page).into_iter().find(|highlight| highlight.rect.contains(page_point))
    }
}

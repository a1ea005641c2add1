//! Pointer-driven text selection that turns into a [`Highlight`].

use doc_model::{
    Color, Highlight, HighlightId, ScreenPoint, ScreenRect, Student, ValidationError,
    DEFAULT_HIGHLIGHT_OPACITY,
};
use viewer_core::ScreenTransform;

/// An in-progress drag on one page, in screen coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCapture {
    pub page: u32,
    pub start: ScreenPoint,
    pub end: ScreenPoint,
}

impl SelectionCapture {
    pub fn begin(page: u32, start: ScreenPoint) -> Self {
        Self { page, start, end: start }
    }

    pub fn update(&mut self, end: ScreenPoint) {
        self.end = end;
    }

    /// Normalized min-corner rectangle of the drag so far.
    pub fn screen_rect(&self) -> ScreenRect {
        ScreenRect::from_corners(self.start, self.end)
    }

    /// Converts the drag into a page-space highlight. Rejects zero-area
    /// drags and blank selections. The selected text is stored as given.
    pub fn finalize(
        self,
        text: &str,
        student: &Student,
        transform: &ScreenTransform,
    ) -> Result<Highlight, ValidationError> {
        let rect = transform.rect_to_page(self.screen_rect());
        if rect.is_zero_area() {
            return Err(ValidationError::ZeroAreaSelection { width: rect.width, height: rect.height });
        }

        if text.trim().is_empty() {
            return Err(ValidationError::EmptySelectionText);
        }

        Ok(Highlight::new(
            HighlightId::generate(),
            self.page,
            text,
            rect,
            student.id.clone(),
            student.name.clone(),
        )
        .with_color(Color::HIGHLIGHT_YELLOW, DEFAULT_HIGHLIGHT_OPACITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::store::HighlightStore;
    use doc_model::{PageRect, Rotation};

    fn student() -> Student {
        Student::new("s1", "Alice Chen")
    }

    #[test]
    fn test_finalize_maps_drag_into_page_space() {
        let mut capture = SelectionCapture::begin(2, ScreenPoint::new(500.0, 280.0));
        capture.update(ScreenPoint::new(100.0, 240.0));

        let transform = ScreenTransform::new(2.0, Rotation::Deg0);
        let highlight = capture.finalize("  backpropagation  ", &student(), &transform).unwrap();

        assert_eq!(highlight.page_number, 2);
        assert_eq!(highlight.text, "  backpropagation  ");
        assert_eq!(highlight.rect, PageRect::new(50.0, 120.0, 200.0, 20.0));
        assert_eq!(highlight.student_name, "Alice Chen");
        assert_eq!(highlight.color, Color::HIGHLIGHT_YELLOW);
    }

    #[test]
    fn test_surrounding_whitespace_keeps_selections_apart() {
        let transform = ScreenTransform::new(1.0, Rotation::Deg0);
        let drag = |text: &str| {
            let mut capture = SelectionCapture::begin(1, ScreenPoint::new(10.0, 10.0));
            capture.update(ScreenPoint::new(200.0, 30.0));
            capture.finalize(text, &student(), &transform).unwrap()
        };

        let mut store = HighlightStore::new();
        store.add(drag(" The quick brown fox jumps")).unwrap();
        store.add(drag("The quick brown fox jumps")).unwrap();

        let groups = Aggregator::new(&store).group_by_page(1);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, " The quick brown fox");
        assert_eq!(groups[1].key, "The quick brown fox ");
    }

    #[test]
    fn test_rotated_drag_is_stored_unrotated() {
        let transform = ScreenTransform::new(1.0, Rotation::Deg90);
        let page_rect = PageRect::new(50.0, 120.0, 200.0, 20.0);
        let screen = transform.rect_to_screen(page_rect);

        let mut capture = SelectionCapture::begin(1, ScreenPoint::new(screen.x, screen.y));
        capture.update(ScreenPoint::new(screen.x + screen.width, screen.y + screen.height));
        let highlight = capture.finalize("passage", &student(), &transform).unwrap();

        assert!((highlight.rect.width - 200.0).abs() < 1e-6);
        assert!((highlight.rect.height - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_area_drag_is_rejected() {
        let mut capture = SelectionCapture::begin(1, ScreenPoint::new(10.0, 10.0));
        capture.update(ScreenPoint::new(40.0, 10.0));

        let err = capture
            .finalize("text", &student(), &ScreenTransform::new(1.0, Rotation::Deg0))
            .unwrap_err();
        assert!(matches!(err, ValidationError::ZeroAreaSelection { .. }));
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let mut capture = SelectionCapture::begin(1, ScreenPoint::new(10.0, 10.0));
        capture.update(ScreenPoint::new(40.0, 30.0));

        let err = capture
            .finalize(" \n ", &student(), &ScreenTransform::new(1.0, Rotation::Deg0))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptySelectionText);
    }
}

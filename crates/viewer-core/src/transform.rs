use doc_model::{PagePoint, PageRect, PageSize, Rotation, ScreenPoint, ScreenRect, ViewState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

/// Maps a page-intrinsic rectangle into screen space: uniform scale, then a
/// clockwise rotation about the page origin (screen y grows downward).
pub fn to_screen(rect: PageRect, scale: f64, rotation: Rotation) -> ScreenRect {
    ScreenTransform::new(scale, rotation).rect_to_screen(rect)
}

/// Un-rotates and un-scales a screen point back into page space.
pub fn to_page_space(point: ScreenPoint, scale: f64, rotation: Rotation) -> PagePoint {
    ScreenTransform::new(scale, rotation).point_to_page(point)
}

pub fn to_page_rect(rect: ScreenRect, scale: f64, rotation: Rotation) -> PageRect {
    ScreenTransform::new(scale, rotation).rect_to_page(rect)
}

pub fn displayed_size(size: PageSize, scale: f64, rotation: Rotation) -> ScreenSize {
    let (width, height) = if rotation.swaps_axes() {
        (size.height, size.width)
    } else {
        (size.width, size.height)
    };
    ScreenSize { width: width * scale, height: height * scale }
}

fn rotate(x: f64, y: f64, rotation: Rotation) -> (f64, f64) {
    match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (-y, x),
        Rotation::Deg180 => (-x, -y),
        Rotation::Deg270 => (y, -x),
    }
}

/// Scale, rotation and a viewport translation applied after both.
///
/// `from_view` leaves the translation at zero, so rotated pages land in
/// negative coordinates. `for_page` shifts them back into the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTransform {
    pub scale: f64,
    pub rotation: Rotation,
    pub offset: ScreenPoint,
}

impl ScreenTransform {
    pub fn new(scale: f64, rotation: Rotation) -> Self {
        debug_assert!(scale > 0.0, "scale must be positive");
        Self { scale, rotation, offset: ScreenPoint::default() }
    }

    pub fn from_view(state: &ViewState) -> Self {
        Self::new(state.scale, state.rotation)
    }

    pub fn for_page(state: &ViewState, size: PageSize) -> Self {
        let s = state.scale;
        let offset = match state.rotation {
            Rotation::Deg0 => ScreenPoint::new(0.0, 0.0),
            Rotation::Deg90 => ScreenPoint::new(size.height * s, 0.0),
            Rotation::Deg180 => ScreenPoint::new(size.width * s, size.height * s),
            Rotation::Deg270 => ScreenPoint::new(0.0, size.width * s),
        };
        Self { offset, ..Self::from_view(state) }
    }

    pub fn point_to_screen(&self, point: PagePoint) -> ScreenPoint {
        let (x, y) = rotate(point.x * self.scale, point.y * self.scale, self.rotation);
        ScreenPoint::new(x + self.offset.x, y + self.offset.y)
    }

    pub fn point_to_page(&self, point: ScreenPoint) -> PagePoint {
        let (x, y) = rotate(point.x - self.offset.x, point.y - self.offset.y, self.rotation.inverse());
        PagePoint::new(x / self.scale, y / self.scale)
    }

    pub fn rect_to_screen(&self, rect: PageRect) -> ScreenRect {
        let a = self.point_to_screen(rect.top_left());
        let b = self.point_to_screen(PagePoint::new(rect.x + rect.width, rect.y + rect.height));
        ScreenRect::from_corners(a, b)
    }

    pub fn rect_to_page(&self, rect: ScreenRect) -> PageRect {
        let a = self.point_to_page(ScreenPoint::new(rect.x, rect.y));
        let b = self.point_to_page(ScreenPoint::new(rect.x + rect.width, rect.y + rect.height));
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        PageRect::new(x, y, a.x.max(b.x) - x, a.y.max(b.y) - y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;
    const ROTATIONS: [Rotation; 4] = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    fn assert_rect_close(actual: PageRect, expected: PageRect) {
        assert!((actual.x - expected.x).abs() < EPS, "x: {actual:?} vs {expected:?}");
        assert!((actual.y - expected.y).abs() < EPS, "y: {actual:?} vs {expected:?}");
        assert!((actual.width - expected.width).abs() < EPS, "w: {actual:?} vs {expected:?}");
        assert!((actual.height - expected.height).abs() < EPS, "h: {actual:?} vs {expected:?}");
    }

    #[test]
    fn unrotated_transform_scales_every_field() {
        let screen = to_screen(PageRect::new(50.0, 120.0, 200.0, 20.0), 1.5, Rotation::Deg0);
        assert_eq!(screen, ScreenRect::new(75.0, 180.0, 300.0, 30.0));
    }

    #[test]
    fn quarter_turn_swaps_width_and_height() {
        let rect = PageRect::new(10.0, 20.0, 30.0, 40.0);

        let turned = to_screen(rect, 2.0, Rotation::Deg90);
        assert_eq!(turned, ScreenRect::new(-120.0, 20.0, 80.0, 60.0));

        let half = to_screen(rect, 2.0, Rotation::Deg180);
        assert_eq!((half.width, half.height), (60.0, 80.0));
    }

    #[test]
    fn round_trip_holds_for_every_rotation_and_scale() {
        let rects = [
            PageRect::new(50.0, 120.0, 200.0, 20.0),
            PageRect::new(0.0, 0.0, 612.0, 792.0),
            PageRect::new(333.3, 17.25, 0.5, 91.1),
        ];

        for rotation in ROTATIONS {
            for step in 0..=10 {
                let scale = 0.5 + 0.25 * f64::from(step);
                for rect in rects {
                    let screen = to_screen(rect, scale, rotation);
                    assert_rect_close(to_page_rect(screen, scale, rotation), rect);

                    let corner = to_page_space(
                        ScreenTransform::new(scale, rotation).point_to_screen(rect.top_left()),
                        scale,
                        rotation,
                    );
                    assert!((corner.x - rect.x).abs() < EPS && (corner.y - rect.y).abs() < EPS);
                }
            }
        }
    }

    #[test]
    fn page_anchored_transform_keeps_page_in_viewport() {
        let size = PageSize { width: 612.0, height: 792.0 };
        let whole_page = PageRect::new(0.0, 0.0, size.width, size.height);

        for rotation in ROTATIONS {
            let state = ViewState { scale: 1.25, rotation, ..ViewState::default() };
            let transform = ScreenTransform::for_page(&state, size);
            let screen = transform.rect_to_screen(whole_page);
            let displayed = displayed_size(size, state.scale, rotation);

            assert!(screen.x.abs() < EPS && screen.y.abs() < EPS, "{rotation:?}: {screen:?}");
            assert!((screen.width - displayed.width).abs() < EPS);
            assert!((screen.height - displayed.height).abs() < EPS);
            assert_rect_close(transform.rect_to_page(screen), whole_page);
        }
    }

    #[test]
    fn pointer_is_unrotated_before_scaling() {
        let transform = ScreenTransform::new(2.0, Rotation::Deg90);
        let page = transform.point_to_page(ScreenPoint::new(-40.0, 20.0));
        assert!((page.x - 10.0).abs() < EPS);
        assert!((page.y - 20.0).abs() < EPS);
    }
}

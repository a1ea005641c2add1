use doc_model::{ViewMode, ViewState, MAX_SCALE, MIN_SCALE, SCALE_STEP};

/// Owns the [`ViewState`] and is its only writer.
///
/// Each state change bumps `generation`; a no-op command leaves it alone so
/// in-flight renders for an unchanged view stay valid.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayoutController {
    state: ViewState,
    total_pages: u32,
    generation: u64,
}

impl Default for PageLayoutController {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PageLayoutController {
    pub fn new(total_pages: u32) -> Self {
        Self { state: ViewState::default(), total_pages: total_pages.max(1), generation: 0 }
    }

    pub fn with_view_mode(total_pages: u32, view_mode: ViewMode) -> Self {
        let mut controller = Self::new(total_pages);
        controller.state.view_mode = view_mode;
        controller
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn current_page(&self) -> u32 {
        self.state.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resets to the first page for a newly loaded document. Zoom, rotation
    /// and view mode carry over.
    pub fn set_total_pages(&mut self, total_pages: u32) {
        self.total_pages = total_pages.max(1);
        self.state.current_page = 1;
        self.generation += 1;
    }

    pub fn next_page(&mut self) {
        let total = self.total_pages;
        self.update(|state| match state.view_mode {
            ViewMode::Single => state.current_page = state.current_page.saturating_add(1).min(total),
            ViewMode::Double => {
                if state.current_page.saturating_add(1) < total {
                    state.current_page = state.current_page.saturating_add(2).min(total);
                }
            }
        });
    }

    pub fn prev_page(&mut self) {
        self.update(|state| match state.view_mode {
            ViewMode::Single => state.current_page = state.current_page.saturating_sub(1).max(1),
            ViewMode::Double => {
                state.current_page = if state.current_page > 2 { state.current_page - 2 } else { 1 };
            }
        });
    }

    /// Clamps to `[1, total]` and lands on the left page of a spread in
    /// double mode.
    pub fn go_to_page(&mut self, page: u32) {
        let total = self.total_pages;
        self.update(|state| {
            let page = page.clamp(1, total);
            state.current_page = match state.view_mode {
                ViewMode::Double if page % 2 == 0 => page - 1,
                _ => page,
            };
        });
    }

    pub fn zoom_in(&mut self) {
        self.update(|state| state.scale = (state.scale + SCALE_STEP).clamp(MIN_SCALE, MAX_SCALE));
    }

    pub fn zoom_out(&mut self) {
        self.update(|state| state.scale = (state.scale - SCALE_STEP).clamp(MIN_SCALE, MAX_SCALE));
    }

    pub fn rotate(&mut self) {
        self.update(|state| state.rotation = state.rotation.next());
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.update(|state| {
            state.view_mode = mode;
            if mode == ViewMode::Double && state.current_page % 2 == 0 {
                state.current_page -= 1;
            }
        });
    }

    pub fn visible_pages(&self) -> Vec<u32> {
        let current = self.state.current_page;
        match self.state.view_mode {
            ViewMode::Double if current < self.total_pages => vec![current, current + 1],
            _ => vec![current],
        }
    }

    pub fn can_go_next(&self) -> bool {
        match self.state.view_mode {
            ViewMode::Single => self.state.current_page < self.total_pages,
            ViewMode::Double => self.state.current_page.saturating_add(1) < self.total_pages,
        }
    }

    pub fn can_go_prev(&self) -> bool {
        self.state.current_page > 1
    }

    pub fn page_label(&self) -> String {
        match self.visible_pages().as_slice() {
            [left, right] => format!("Pages {left}-{right} / {}", self.total_pages),
            _ => format!("Page {} / {}", self.state.current_page, self.total_pages),
        }
    }

    pub fn zoom_label(&self) -> String {
        format!("{}%", (self.state.scale * 100.0).round() as u32)
    }

    fn update(&mut self, apply: impl FnOnce(&mut ViewState)) {
        let before = self.state;
        apply(&mut self.state);
        if self.state != before {
            self.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::Rotation;

    #[test]
    fn single_mode_navigation_stays_in_bounds() {
        let mut controller = PageLayoutController::with_view_mode(3, ViewMode::Single);

        for _ in 0..5 {
            controller.next_page();
            assert!((1..=3).contains(&controller.current_page()));
        }
        assert_eq!(controller.current_page(), 3);
        assert!(!controller.can_go_next());

        for _ in 0..5 {
            controller.prev_page();
            assert!((1..=3).contains(&controller.current_page()));
        }
        assert_eq!(controller.current_page(), 1);
        assert!(!controller.can_go_prev());
    }

    #[test]
    fn double_mode_keeps_left_page_odd() {
        let mut controller = PageLayoutController::new(10);
        let moves = [true, true, false, true, true, true, true, true, false, false, false, false];

        for forward in moves {
            if forward {
                controller.next_page();
            } else {
                controller.prev_page();
            }
            assert_eq!(controller.current_page() % 2, 1, "page {}", controller.current_page());
        }
    }

    #[test]
    fn double_mode_stops_on_last_full_spread() {
        let mut controller = PageLayoutController::new(10);
        for _ in 0..10 {
            controller.next_page();
        }
        assert_eq!(controller.current_page(), 9);
        assert_eq!(controller.page_label(), "Pages 9-10 / 10");
        assert!(!controller.can_go_next());

        let mut odd_total = PageLayoutController::new(5);
        for _ in 0..10 {
            odd_total.next_page();
        }
        assert_eq!(odd_total.current_page(), 5);
        assert_eq!(odd_total.visible_pages(), vec![5]);
        assert_eq!(odd_total.page_label(), "Page 5 / 5");
    }

    #[test]
    fn next_page_at_max_page_count_stays_put() {
        let mut single = PageLayoutController::with_view_mode(u32::MAX, ViewMode::Single);
        single.go_to_page(u32::MAX);
        single.next_page();
        assert_eq!(single.current_page(), u32::MAX);
        assert!(!single.can_go_next());

        let mut double = PageLayoutController::new(u32::MAX);
        double.go_to_page(u32::MAX);
        double.next_page();
        assert_eq!(double.current_page(), u32::MAX);
        assert_eq!(double.visible_pages(), vec![u32::MAX]);
    }

    #[test]
    fn double_mode_prev_from_three_returns_to_one() {
        let mut controller = PageLayoutController::new(10);
        controller.go_to_page(3);
        controller.prev_page();
        assert_eq!(controller.current_page(), 1);
        controller.prev_page();
        assert_eq!(controller.current_page(), 1);
    }

    #[test]
    fn ten_zoom_ins_clamp_at_max() {
        let mut controller = PageLayoutController::new(1);
        for _ in 0..10 {
            controller.zoom_in();
        }
        assert_eq!(controller.state().scale, 3.0);
        assert_eq!(controller.zoom_label(), "300%");

        for _ in 0..20 {
            controller.zoom_out();
        }
        assert_eq!(controller.state().scale, 0.5);
    }

    #[test]
    fn rotate_cycles_through_quarter_turns() {
        let mut controller = PageLayoutController::new(1);
        controller.rotate();
        assert_eq!(controller.state().rotation, Rotation::Deg90);
        for _ in 0..3 {
            controller.rotate();
        }
        assert_eq!(controller.state().rotation, Rotation::Deg0);
    }

    #[test]
    fn switching_to_double_on_even_page_shows_it_on_the_right() {
        let mut controller = PageLayoutController::with_view_mode(10, ViewMode::Single);
        controller.go_to_page(4);
        controller.set_view_mode(ViewMode::Double);

        assert_eq!(controller.current_page(), 3);
        assert_eq!(controller.visible_pages(), vec![3, 4]);
        assert_eq!(controller.page_label(), "Pages 3-4 / 10");
    }

    #[test]
    fn go_to_page_clamps_and_aligns() {
        let mut controller = PageLayoutController::new(10);
        controller.go_to_page(8);
        assert_eq!(controller.current_page(), 7);
        controller.go_to_page(99);
        assert_eq!(controller.current_page(), 9);
        controller.go_to_page(0);
        assert_eq!(controller.current_page(), 1);
    }

    #[test]
    fn generation_moves_only_on_state_change() {
        let mut controller = PageLayoutController::new(2);
        let start = controller.generation();

        controller.prev_page();
        controller.next_page();
        assert_eq!(controller.generation(), start, "no-op commands must not bump");

        controller.zoom_in();
        assert_eq!(controller.generation(), start + 1);
    }

    #[test]
    fn new_document_resets_page_but_keeps_zoom() {
        let mut controller = PageLayoutController::new(10);
        controller.go_to_page(5);
        controller.zoom_in();
        controller.set_total_pages(0);

        assert_eq!(controller.current_page(), 1);
        assert_eq!(controller.total_pages(), 1);
        assert_eq!(controller.state().scale, 1.25);
    }
}

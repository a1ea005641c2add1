mod layout;
mod transform;

use std::collections::{HashMap, VecDeque};

use doc_model::{Rotation, ViewState};

pub use layout::PageLayoutController;
pub use transform::{
    displayed_size, to_page_rect, to_page_space, to_screen, ScreenSize, ScreenTransform,
};

/// A page render request stamped with the view generation it was issued under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTicket {
    pub page: u32,
    pub scale: f64,
    pub rotation: Rotation,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Current,
    Stale,
}

/// Tracks the newest outstanding ticket per page.
///
/// A result is only accepted when its ticket is still the newest one for the
/// page, the view generation has not moved and the page is still on screen.
#[derive(Debug, Default)]
pub struct RenderQueue {
    pending: HashMap<u32, RenderTicket>,
    order: VecDeque<u32>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, page: u32, state: &ViewState, generation: u64) -> RenderTicket {
        let ticket = RenderTicket { page, scale: state.scale, rotation: state.rotation, generation };
        if self.pending.insert(page, ticket).is_none() {
            self.order.push_back(page);
        }
        ticket
    }

    pub fn settle(&mut self, ticket: &RenderTicket, generation: u64, visible: &[u32]) -> TicketStatus {
        let newest = self.pending.get(&ticket.page) == Some(ticket);
        if newest {
            self.pending.remove(&ticket.page);
            self.order.retain(|page| *page != ticket.page);
        }

        if newest && ticket.generation == generation && visible.contains(&ticket.page) {
            TicketStatus::Current
        } else {
            TicketStatus::Stale
        }
    }

    /// Drops every outstanding ticket issued before `generation`.
    pub fn discard_before(&mut self, generation: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, ticket| ticket.generation >= generation);
        let pending = &self.pending;
        self.order.retain(|page| pending.contains_key(page));
        before - self.pending.len()
    }

    pub fn pending_pages(&self) -> Vec<u32> {
        self.order.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_is_current_when_view_is_unchanged() {
        let mut queue = RenderQueue::new();
        let state = ViewState::default();
        let ticket = queue.issue(1, &state, 4);

        assert_eq!(queue.pending_pages(), vec![1]);
        assert_eq!(queue.settle(&ticket, 4, &[1, 2]), TicketStatus::Current);
        assert!(queue.is_empty());
    }

    #[test]
    fn ticket_goes_stale_after_generation_moves() {
        let mut queue = RenderQueue::new();
        let ticket = queue.issue(1, &ViewState::default(), 1);
        assert_eq!(queue.settle(&ticket, 2, &[1, 2]), TicketStatus::Stale);
    }

    #[test]
    fn ticket_goes_stale_when_page_leaves_view() {
        let mut queue = RenderQueue::new();
        let ticket = queue.issue(2, &ViewState::default(), 1);
        assert_eq!(queue.settle(&ticket, 1, &[3, 4]), TicketStatus::Stale);
    }

    #[test]
    fn reissued_page_supersedes_older_ticket() {
        let mut queue = RenderQueue::new();
        let state = ViewState::default();
        let first = queue.issue(1, &state, 1);
        let zoomed = ViewState { scale: 1.25, ..state };
        let second = queue.issue(1, &zoomed, 1);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.settle(&first, 1, &[1]), TicketStatus::Stale);
        assert_eq!(queue.settle(&second, 1, &[1]), TicketStatus::Current);
    }

    #[test]
    fn discard_before_drops_old_generations() {
        let mut queue = RenderQueue::new();
        let state = ViewState::default();
        queue.issue(1, &state, 1);
        queue.issue(2, &state, 1);
        queue.issue(3, &state, 2);

        assert_eq!(queue.discard_before(2), 2);
        assert_eq!(queue.pending_pages(), vec![3]);
    }
}

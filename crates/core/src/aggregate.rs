//! Review grouping
//!
//! Highlights on the same page whose text shares its first 20 characters are
//! treated as the same passage. This is a stand-in for real passage matching:
//! it groups exact duplicates and misses paraphrases.

use std::collections::HashSet;

use doc_model::{Annotation, Highlight, PageRect, ValidationError};

use crate::store::HighlightStore;

pub const GROUP_KEY_CHARS: usize = 20;
pub const PREVIEW_CHARS: usize = 100;
/// Top-left corners closer than this (page units, both axes) count as overlapping.
pub const OVERLAP_TOLERANCE: f64 = 10.0;

/// Grouping key: the first [`GROUP_KEY_CHARS`] characters, untrimmed and
/// case-sensitive.
pub fn group_key(text: &str) -> String {
    text.chars().take(GROUP_KEY_CHARS).collect()
}

/// Highlights of one passage plus every annotation attached to them
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewGroup<'a> {
    pub key: String,
    pub page: u32,
    pub representative_text: &'a str,
    pub members: Vec<&'a Highlight>,
    pub annotations: Vec<&'a Annotation>,
}

impl ReviewGroup<'_> {
    pub fn preview(&self) -> String {
        let mut chars = self.representative_text.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }

    pub fn student_count(&self) -> usize {
        self.members.iter().map(|h| &h.student_id).collect::<HashSet<_>>().len()
    }

    pub fn highlight_count(&self) -> usize {
        self.members.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregator<'a> {
    store: &'a HighlightStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a HighlightStore) -> Self {
        Self { store }
    }

    /// Groups in order of first appearance. An empty page yields no groups.
    pub fn group_by_page(&self, page: u32) -> Vec<ReviewGroup<'a>> {
        let mut groups: Vec<ReviewGroup<'a>> = Vec::new();

        for highlight in self.store.by_page(page) {
            let key = group_key(&highlight.text);
            let annotations = self.store.annotations_of(&highlight.id);

            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => {
                    group.members.push(highlight);
                    group.annotations.extend(annotations);
                }
                None => groups.push(ReviewGroup {
                    key,
                    page,
                    representative_text: &highlight.text,
                    members: vec![highlight],
                    annotations,
                }),
            }
        }

        groups
    }

    /// Number of highlights on `page` whose top-left corner lies within
    /// [`OVERLAP_TOLERANCE`] of `rect`'s top-left corner. A highlight counts
    /// itself.
    pub fn overlap_count(&self, page: u32, rect: &PageRect) -> usize {
        self.store
            .by_page(page)
            .into_iter()
            .filter(|h| {
                (h.rect.x - rect.x).abs() < OVERLAP_TOLERANCE
                    && (h.rect.y - rect.y).abs() < OVERLAP_TOLERANCE
            })
            .count()
    }

    pub fn group_document(&self, page_count: u32) -> Vec<(u32, Vec<ReviewGroup<'a>>)> {
        (1..=page_count).map(|page| (page, self.group_by_page(page))).collect()
    }

    /// `(highlights, annotations)` across the whole document
    pub fn totals(&self) -> (usize, usize) {
        (self.store.len(), self.store.annotation_count())
    }
}

/// Writes the same teacher feedback to every annotation of one group.
/// Returns how many annotations were updated.
pub fn leave_group_feedback(
    store: &mut HighlightStore,
    page: u32,
    group_key: &str,
    feedback: &str,
) -> Result<usize, ValidationError> {
    let feedback = feedback.trim();
    if feedback.is_empty() {
        return Err(ValidationError::EmptyFeedbackText);
    }

    let targets: Vec<_> = Aggregator::new(store)
        .group_by_page(page)
        .into_iter()
        .find(|group| group.key == group_key)
        .map(|group| group.annotations.iter().map(|a| a.id.clone()).collect())
        .unwrap_or_default();

    let updated = targets
        .iter()
        .filter(|id| store.set_teacher_feedback(id, feedback).is_ok())
        .count();
    tracing::info!(page, group = group_key, updated, "group feedback recorded");
    Ok(updated)
}

//! Highlight store
//!
//! Owns every [`Highlight`] and [`Annotation`] of a document and keeps the
//! page, student and highlight indices current on each insert and removal.

use std::collections::{BTreeMap, HashMap};

use doc_model::{Annotation, AnnotationId, Highlight, HighlightId, StudentId};

use crate::error::{RecordKind, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry<T> {
    seq: u64,
    record: T,
}

/// A highlight removed from the store together with its annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub highlight: Highlight,
    pub annotations: Vec<Annotation>,
}

/// Indexed in-memory store of highlights and annotations
///
/// Page and student lookups are served from incrementally maintained
/// indices. All lists come back in insertion order.
#[derive(Debug, Clone, Default)]
pub struct HighlightStore {
    next_seq: u64,

    /// Highlights by id
    highlights: HashMap<HighlightId, Entry<Highlight>>,

    /// Insertion sequence -> highlight id
    highlight_order: BTreeMap<u64, HighlightId>,

    by_page: HashMap<u32, Vec<HighlightId>>,
    by_student: HashMap<StudentId, Vec<HighlightId>>,

    /// Students with at least one highlight, in order of first appearance
    students: Vec<StudentId>,

    annotations: HashMap<AnnotationId, Entry<Annotation>>,
    annotation_order: BTreeMap<u64, AnnotationId>,
    annotations_by_highlight: HashMap<HighlightId, Vec<AnnotationId>>,
    annotations_by_student: HashMap<StudentId, Vec<AnnotationId>>,
}

impl HighlightStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from injected fixture records
    ///
    /// Records are added in order, so the first occurrence of a duplicate id
    /// wins and the error reports the second.
    pub fn with_fixtures(
        highlights: impl IntoIterator<Item = Highlight>,
        annotations: impl IntoIterator<Item = Annotation>,
    ) -> StoreResult<Self> {
        let mut store = Self::new();
        for highlight in highlights {
            store.add(highlight)?;
        }
        for annotation in annotations {
            store.add_annotation(annotation)?;
        }
        tracing::debug!(
            highlights = store.len(),
            annotations = store.annotation_count(),
            "store built from fixtures"
        );
        Ok(store)
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Add a highlight. A duplicate id is rejected and leaves the existing
    /// record untouched.
    pub fn add(&mut self, highlight: Highlight) -> StoreResult<()> {
        if self.highlights.contains_key(&highlight.id) {
            tracing::warn!(id = %highlight.id, "rejected duplicate highlight id");
            return Err(StoreError::DuplicateKey {
                kind: RecordKind::Highlight,
                id: highlight.id.to_string(),
            });
        }

        let seq = self.bump();
        let id = highlight.id.clone();

        self.by_page.entry(highlight.page_number).or_default().push(id.clone());
        let student_highlights = self.by_student.entry(highlight.student_id.clone()).or_default();
        if student_highlights.is_empty() {
            self.students.push(highlight.student_id.clone());
        }
        student_highlights.push(id.clone());

        tracing::debug!(id = %id, page = highlight.page_number, student = %highlight.student_id, "highlight added");
        self.highlight_order.insert(seq, id.clone());
        self.highlights.insert(id, Entry { seq, record: highlight });
        Ok(())
    }

    /// Remove a highlight and every annotation attached to it
    pub fn remove(&mut self, id: &HighlightId) -> Option<Removed> {
        let Entry { seq, record: highlight } = self.highlights.remove(id)?;
        self.highlight_order.remove(&seq);

        if let Some(page_highlights) = self.by_page.get_mut(&highlight.page_number) {
            page_highlights.retain(|hid| hid != id);
            if page_highlights.is_empty() {
                self.by_page.remove(&highlight.page_number);
            }
        }
        if let Some(student_highlights) = self.by_student.get_mut(&highlight.student_id) {
            student_highlights.retain(|hid| hid != id);
            if student_highlights.is_empty() {
                self.by_student.remove(&highlight.student_id);
                self.students.retain(|sid| sid != &highlight.student_id);
            }
        }

        let annotation_ids = self.annotations_by_highlight.remove(id).unwrap_or_default();
        let annotations: Vec<Annotation> =
            annotation_ids.iter().filter_map(|aid| self.detach_annotation(aid)).collect();

        tracing::debug!(id = %id, cascaded = annotations.len(), "highlight removed");
        Some(Removed { highlight, annotations })
    }

    fn detach_annotation(&mut self, id: &AnnotationId) -> Option<Annotation> {
        let Entry { seq, record } = self.annotations.remove(id)?;
        self.annotation_order.remove(&seq);
        if let Some(student_annotations) = self.annotations_by_student.get_mut(&record.student_id) {
            student_annotations.retain(|aid| aid != id);
            if student_annotations.is_empty() {
                self.annotations_by_student.remove(&record.student_id);
            }
        }
        Some(record)
    }

    /// Attach an annotation to an existing highlight
    pub fn add_annotation(&mut self, annotation: Annotation) -> StoreResult<()> {
        if self.annotations.contains_key(&annotation.id) {
            tracing::warn!(id = %annotation.id, "rejected duplicate annotation id");
            return Err(StoreError::DuplicateKey {
                kind: RecordKind::Annotation,
                id: annotation.id.to_string(),
            });
        }
        if !self.highlights.contains_key(&annotation.highlight_id) {
            tracing::warn!(id = %annotation.id, highlight = %annotation.highlight_id, "annotation targets unknown highlight");
            return Err(StoreError::UnknownHighlight(annotation.highlight_id));
        }

        let seq = self.bump();
        let id = annotation.id.clone();
        self.annotations_by_highlight
            .entry(annotation.highlight_id.clone())
            .or_default()
            .push(id.clone());
        self.annotations_by_student.entry(annotation.student_id.clone()).or_default().push(id.clone());

        tracing::debug!(id = %id, highlight = %annotation.highlight_id, "annotation added");
        self.annotation_order.insert(seq, id.clone());
        self.annotations.insert(id, Entry { seq, record: annotation });
        Ok(())
    }

    /// Overwrite the teacher feedback on an annotation
    pub fn set_teacher_feedback(&mut self, id: &AnnotationId, feedback: impl Into<String>) -> StoreResult<()> {
        let entry = self
            .annotations
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownAnnotation(id.clone()))?;
        entry.record.teacher_feedback = Some(feedback.into());
        tracing::debug!(id = %id, "teacher feedback set");
        Ok(())
    }

    pub fn get(&self, id: &HighlightId) -> Option<&Highlight> {
        self.highlights.get(id).map(|entry| &entry.record)
    }

    pub fn annotation(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.get(id).map(|entry| &entry.record)
    }

    /// Highlights on a 1-based page
    pub fn by_page(&self, page: u32) -> Vec<&Highlight> {
        self.resolve_highlights(self.by_page.get(&page))
    }

    pub fn by_student(&self, student: &StudentId) -> Vec<&Highlight> {
        self.resolve_highlights(self.by_student.get(student))
    }

    /// Annotations of a highlight; empty for unknown ids
    pub fn annotations_of(&self, highlight: &HighlightId) -> Vec<&Annotation> {
        self.resolve_annotations(self.annotations_by_highlight.get(highlight))
    }

    pub fn annotations_by_student(&self, student: &StudentId) -> Vec<&Annotation> {
        self.resolve_annotations(self.annotations_by_student.get(student))
    }

    pub fn students(&self) -> &[StudentId] {
        &self.students
    }

    /// Every highlight in insertion order
    pub fn all(&self) -> Vec<&Highlight> {
        self.highlight_order.values().filter_map(|id| self.get(id)).collect()
    }

    /// Every annotation in insertion order
    pub fn all_annotations(&self) -> Vec<&Annotation> {
        self.annotation_order.values().filter_map(|id| self.annotation(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.highlights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    fn resolve_highlights(&self, ids: Option<&Vec<HighlightId>>) -> Vec<&Highlight> {
        ids.map(|ids| ids.iter().filter_map(|id| self.get(id)).collect()).unwrap_or_default()
    }

    fn resolve_annotations(&self, ids: Option<&Vec<AnnotationId>>) -> Vec<&Annotation> {
        ids.map(|ids| ids.iter().filter_map(|id| self.annotation(id)).collect()).unwrap_or_default()
    }
}

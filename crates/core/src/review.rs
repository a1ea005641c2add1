use doc_model::{Annotation, Highlight, StudentId};
use serde::Serialize;

use crate::store::HighlightStore;

pub const UNKNOWN_STUDENT: &str = "Unknown Student";

/// Everything one student contributed to a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary<'a> {
    pub student_id: StudentId,
    pub student_name: String,
    pub highlights: Vec<&'a Highlight>,
    pub annotations: Vec<&'a Annotation>,
}

impl<'a> StudentSummary<'a> {
    pub fn for_student(store: &'a HighlightStore, student: &StudentId) -> Self {
        let highlights = store.by_student(student);
        let student_name = highlights
            .first()
            .map(|h| h.student_name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_STUDENT)
            .to_owned();

        Self {
            student_id: student.clone(),
            student_name,
            highlights,
            annotations: store.annotations_by_student(student),
        }
    }

    pub fn highlight_count(&self) -> usize {
        self.highlights.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }
}

/// One summary per highlighting student, in order of first appearance.
pub fn student_summaries(store: &HighlightStore) -> Vec<StudentSummary<'_>> {
    store.students().iter().map(|student| StudentSummary::for_student(store, student)).collect()
}

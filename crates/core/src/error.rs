use doc_model::{AnnotationId, HighlightId, ValidationError};
use marginalia_render::{LoadError, RenderError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Highlight,
    Annotation,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highlight => f.write_str("highlight"),
            Self::Annotation => f.write_str("annotation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate {kind} id {id}")]
    DuplicateKey { kind: RecordKind, id: String },
    #[error("unknown highlight {0}")]
    UnknownHighlight(HighlightId),
    #[error("unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("no document is loaded")]
    NoDocument,
}

pub type SessionResult<T> = Result<T, SessionError>;

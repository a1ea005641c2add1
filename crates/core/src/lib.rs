//! Marginalia core
//!
//! Highlight storage, review grouping, overlay composition and the viewer
//! session that drives a document renderer.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod overlay;
pub mod review;
pub mod selection;
pub mod session;
pub mod store;

pub use aggregate::{group_key, leave_group_feedback, Aggregator, ReviewGroup};
pub use config::{ConfigError, ViewerConfig};
pub use error::{RecordKind, SessionError, SessionResult, StoreError, StoreResult};
pub use overlay::{DrawOp, LabelKind, OverlayRenderer};
pub use review::{student_summaries, StudentSummary, UNKNOWN_STUDENT};
pub use selection::SelectionCapture;
pub use session::{AnnotationSink, LoadOutcome, LoadTicket, RenderDelivery, ViewerSession};
pub use store::{HighlightStore, Removed};

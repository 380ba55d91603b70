//! Errors raised while reconstructing a trace.
//!
//! Every variant describes a broken structural invariant, not bad input. Bad input (empty
//! traces, unparseable timestamps) is absorbed by the builder and never surfaces here.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A placeholder node exists without any span referring to it as a parent.
    #[error("missing span {span_id} has no children")]
    ChildlessGhost { span_id: String },

    /// No span below a placeholder carries data, so it can't be placed in time.
    #[error("missing span {span_id} has no present descendant")]
    GhostWithoutPresentDescendant { span_id: String },

    /// Placeholders only ever exist as roots.
    #[error("missing span {span_id} found below span {parent_span_id}")]
    NestedGhost {
        span_id: String,
        parent_span_id: String,
    },

    #[error("span {span_id} is part of a parent cycle")]
    Cycle { span_id: String },
}

impl TreeError {
    pub fn span_id(&self) -> &str {
        match self {
            TreeError::ChildlessGhost { span_id }
            | TreeError::GhostWithoutPresentDescendant { span_id }
            | TreeError::NestedGhost { span_id, .. }
            | TreeError::Cycle { span_id } => span_id,
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;

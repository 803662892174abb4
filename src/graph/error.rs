//! Graph-specific error types.

use crate::graph::id::NodeId;
use thiserror::Error;

/// Structural errors rejected at the graph API boundary.
///
/// None of these leave the graph partially mutated.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Unknown node type: {0}")]
    UnknownType(String),

    #[error("Node type '{0}' is already registered")]
    DuplicateType(String),

    #[error("No such node: {0:?}")]
    NoSuchNode(NodeId),

    #[error("No node named '{0}'")]
    NoSuchName(String),

    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    #[error("Macro error: {0}")]
    Macro(String),

    #[error("Nothing to undo or redo")]
    UndoEmpty,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// A failure raised by a node type's `compute` hook.
///
/// Scoped to a single node: the engine stores it as that node's error state
/// and carries on with the rest of the traversal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{code}] {message}")]
pub struct ComputeError {
    /// Short category code, e.g. `DATA`, `DIV0`, `TYPE`.
    pub code: String,
    pub message: String,
}

impl ComputeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new("DATA", message)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new("TYPE", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_error_display() {
        let err = ComputeError::new("DIV0", "division by zero");
        assert_eq!(err.to_string(), "[DIV0] division by zero");
        assert_eq!(ComputeError::data("x").code, "DATA");
    }

    #[test]
    fn test_graph_error_display() {
        let err = GraphError::UnknownType("warp".to_string());
        assert!(err.to_string().contains("warp"));
        let err = GraphError::CorruptDocument("bad ref".to_string());
        assert!(err.to_string().contains("bad ref"));
    }
}

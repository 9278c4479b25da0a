//! Engine error taxonomy.
//!
//! Every fallible engine operation returns [`TreeError`].  Two variants are
//! sentinels callers are expected to branch on: [`TreeError::NodeNotFound`]
//! (the natural representation of "no value" in the tree) and
//! [`TreeError::NoNodeToRemove`] (idempotent deletes and part upserts that
//! found no prior payload to clean up).  The remaining variants are fatal
//! for the operation that hit them.

use thiserror::Error;

/// Errors produced by the tree projection engine.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The backend has no node at the requested path or id.
    #[error("node not found")]
    NodeNotFound,

    /// An idempotent delete or replace found nothing to clean up.
    #[error("no node to remove")]
    NoNodeToRemove,

    /// Node metadata failed to decode: the node is assumed corrupt.
    #[error("invalid {field} value '{value}'")]
    InvalidMeta {
        /// The reserved metadata key that failed to parse.
        field: &'static str,
        /// The offending value, lossily decoded for display.
        value: String,
    },

    /// The `LockConfiguration` string is not in the comma-joined format.
    #[error("invalid lock configuration: {0}")]
    InvalidLockConfiguration(String),

    /// The node has no `UploadId`; it is not a multipart upload root.
    /// Callers scanning mixed subtrees use this as a role test.
    #[error("not a multipart node")]
    NotMultipartNode,

    /// The node has no positive `Number`; it is not an upload part.
    #[error("not a part node")]
    NotPartNode,

    /// The node has no `FileName`; it cannot take part in path
    /// reconstruction.
    #[error("node doesn't contain FileName")]
    MissingFileName,

    /// An invariant expected exactly one node but found several.
    #[error("found more than one {0}")]
    UnexpectedMultiplicity(&'static str),

    /// A subtree stream delivered a child before its parent.
    #[error("invalid node order: couldn't get parent path")]
    InvalidNodeOrder,

    /// Transport or backend failure, passed through with context.
    #[error("tree backend: {0}")]
    Backend(#[source] anyhow::Error),
}

impl TreeError {
    /// Normalize a backend error: the backend surfaces missing nodes and
    /// missing trees as errors whose message contains `not found`.
    pub fn from_backend(err: anyhow::Error) -> Self {
        if format!("{err:#}").contains("not found") {
            TreeError::NodeNotFound
        } else {
            TreeError::Backend(err)
        }
    }

    /// Whether this is the [`TreeError::NodeNotFound`] sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NodeNotFound)
    }
}

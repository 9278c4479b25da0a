//! Treegate library - S3 gateway core over a hierarchical tree service.
//!
//! This crate projects object-storage semantics (versioned objects,
//! multipart uploads, tags, locks, bucket settings) onto a tree-of-nodes
//! backend that only understands five primitives: add a node, add a node
//! by path, move a node, remove a node, and fetch nodes by subtree or by
//! path.  Everything S3-shaped is synthesized by encoding state into tree
//! topology and node metadata, then decoding it on read.
//!
//! The [`tree::TreeClient`] is the entry point.  It talks to any
//! [`tree::backend::TreeBackend`] implementation; the bundled
//! [`tree::memory::MemoryTreeBackend`] keeps trees in memory and backs
//! the test suite and ephemeral deployments.

pub mod auth;
pub mod config;
pub mod data;
pub mod errors;
pub mod tree;

pub use errors::TreeError;
pub use tree::memory::MemoryTreeBackend;
pub use tree::TreeClient;

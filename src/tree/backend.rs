//! Abstract tree-service backend trait.
//!
//! The tree service exposes six RPCs; any transport must implement
//! [`TreeBackend`].  The trait uses `async_trait`-style methods (manual
//! desugaring with pinned futures) so it can be used with both the
//! in-memory backend and remote transports.  Request bodies carry the
//! container, tree id, operation payload, and optional bearer token, and
//! are wrapped in [`Signed`] together with the gateway signature over the
//! body's canonical byte encoding.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::Stream;

use crate::auth::{Signature, Signer};
use crate::data::ContainerId;

/// One metadata entry on a tree node. Keys are drawn from the reserved
/// vocabulary in [`crate::tree::codec`]; values are opaque byte strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: Bytes,
}

impl KeyValue {
    /// Convenience constructor from string-ish parts.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Raw node body as delivered by the backend.
#[derive(Debug, Clone, Default)]
pub struct RawNode {
    /// Backend-assigned node id.
    pub node_id: u64,
    /// Parent node id; 0 is the implicit tree root.
    pub parent_id: u64,
    /// Backend-assigned logical timestamp.
    pub timestamp: u64,
    /// Metadata entries.
    pub meta: Vec<KeyValue>,
}

/// Selector of one of the two per-container trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeId {
    /// Objects, their versions, and their sidecar nodes.
    Version,
    /// Bucket-wide singletons and multipart uploads.
    System,
}

impl TreeId {
    /// Wire name of the tree.
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeId::Version => "version",
            TreeId::System => "system",
        }
    }
}

// ── Request bodies ──────────────────────────────────────────────────

/// `Add`: create a node under an existing parent.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub container: ContainerId,
    pub tree: TreeId,
    pub parent: u64,
    pub meta: Vec<KeyValue>,
    pub bearer: Option<Bytes>,
}

/// `AddByPath`: create a node at a path, creating or reusing intermediates.
#[derive(Debug, Clone)]
pub struct AddByPathRequest {
    pub container: ContainerId,
    pub tree: TreeId,
    pub path: Vec<String>,
    /// Always the literal `FileName`.
    pub path_attribute: String,
    pub meta: Vec<KeyValue>,
    pub bearer: Option<Bytes>,
}

/// `Move`: reparent a node and replace (not merge) its metadata.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub container: ContainerId,
    pub tree: TreeId,
    pub node_id: u64,
    pub parent_id: u64,
    pub meta: Vec<KeyValue>,
    pub bearer: Option<Bytes>,
}

/// `Remove`: delete a node and its whole subtree.
#[derive(Debug, Clone)]
pub struct RemoveRequest {
    pub container: ContainerId,
    pub tree: TreeId,
    pub node_id: u64,
    pub bearer: Option<Bytes>,
}

/// `GetNodeByPath`: fetch all nodes at a path.
#[derive(Debug, Clone)]
pub struct GetNodeByPathRequest {
    pub container: ContainerId,
    pub tree: TreeId,
    pub path: Vec<String>,
    /// Always the literal `FileName`.
    pub path_attribute: String,
    /// Metadata keys to return; ignored when `all_attributes` is set.
    pub attributes: Vec<String>,
    /// Return only the most recent node at the path.
    pub latest_only: bool,
    /// Return the full metadata map instead of `attributes`.
    pub all_attributes: bool,
    pub bearer: Option<Bytes>,
}

/// `GetSubTree`: stream the subtree under a root, bounded by depth.
///
/// Depth 0 returns just the root node; depth 1 adds its children; the
/// backend caps depth at [`crate::tree::gateway::MAX_GET_SUBTREE_DEPTH`].
#[derive(Debug, Clone)]
pub struct GetSubTreeRequest {
    pub container: ContainerId,
    pub tree: TreeId,
    pub root_id: u64,
    pub depth: u32,
    pub bearer: Option<Bytes>,
}

// ── Signing ─────────────────────────────────────────────────────────

/// A request body together with the gateway signature over its canonical
/// bytes.
#[derive(Debug, Clone)]
pub struct Signed<B> {
    /// The operation payload.
    pub body: B,
    /// Signature over `body.canonical_bytes()`.
    pub signature: Signature,
}

impl<B: SignBody> Signed<B> {
    /// Sign `body` with `signer` and wrap it.
    pub fn new(body: B, signer: &Signer) -> Self {
        let signature = signer.sign(&body.canonical_bytes());
        Signed { body, signature }
    }
}

/// Canonical byte encoding of a request body, the input to signing.
pub trait SignBody {
    /// Deterministic encoding: newline-separated fields, metadata sorted
    /// by key with hex-encoded values.
    fn canonical_bytes(&self) -> Vec<u8>;
}

fn push_line(out: &mut Vec<u8>, field: &str) {
    out.extend_from_slice(field.as_bytes());
    out.push(b'\n');
}

fn push_meta(out: &mut Vec<u8>, meta: &[KeyValue]) {
    let mut entries: Vec<&KeyValue> = meta.iter().collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    for kv in entries {
        push_line(out, &format!("{}={}", kv.key, hex::encode(&kv.value)));
    }
}

fn push_bearer(out: &mut Vec<u8>, bearer: &Option<Bytes>) {
    match bearer {
        Some(token) => push_line(out, &hex::encode(token)),
        None => push_line(out, "-"),
    }
}

impl SignBody for AddRequest {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "add");
        push_line(&mut out, &self.container.to_string());
        push_line(&mut out, self.tree.as_str());
        push_line(&mut out, &self.parent.to_string());
        push_meta(&mut out, &self.meta);
        push_bearer(&mut out, &self.bearer);
        out
    }
}

impl SignBody for AddByPathRequest {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "add-by-path");
        push_line(&mut out, &self.container.to_string());
        push_line(&mut out, self.tree.as_str());
        push_line(&mut out, &self.path_attribute);
        for segment in &self.path {
            push_line(&mut out, segment);
        }
        push_meta(&mut out, &self.meta);
        push_bearer(&mut out, &self.bearer);
        out
    }
}

impl SignBody for MoveRequest {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "move");
        push_line(&mut out, &self.container.to_string());
        push_line(&mut out, self.tree.as_str());
        push_line(&mut out, &self.node_id.to_string());
        push_line(&mut out, &self.parent_id.to_string());
        push_meta(&mut out, &self.meta);
        push_bearer(&mut out, &self.bearer);
        out
    }
}

impl SignBody for RemoveRequest {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "remove");
        push_line(&mut out, &self.container.to_string());
        push_line(&mut out, self.tree.as_str());
        push_line(&mut out, &self.node_id.to_string());
        push_bearer(&mut out, &self.bearer);
        out
    }
}

impl SignBody for GetNodeByPathRequest {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "get-node-by-path");
        push_line(&mut out, &self.container.to_string());
        push_line(&mut out, self.tree.as_str());
        push_line(&mut out, &self.path_attribute);
        for segment in &self.path {
            push_line(&mut out, segment);
        }
        for attribute in &self.attributes {
            push_line(&mut out, attribute);
        }
        push_line(&mut out, &self.latest_only.to_string());
        push_line(&mut out, &self.all_attributes.to_string());
        push_bearer(&mut out, &self.bearer);
        out
    }
}

impl SignBody for GetSubTreeRequest {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "get-subtree");
        push_line(&mut out, &self.container.to_string());
        push_line(&mut out, self.tree.as_str());
        push_line(&mut out, &self.root_id.to_string());
        push_line(&mut out, &self.depth.to_string());
        push_bearer(&mut out, &self.bearer);
        out
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Streamed subtree node bodies, parents always preceding descendants.
pub type NodeStream = Pin<Box<dyn Stream<Item = anyhow::Result<RawNode>> + Send>>;

/// Async tree-service contract.
///
/// A missing node or missing tree surfaces as an error whose message
/// contains the substring `not found`; the gateway normalizes it into the
/// [`crate::errors::TreeError::NodeNotFound`] sentinel.
pub trait TreeBackend: Send + Sync + 'static {
    /// Create a node under `parent`. Returns the new node id.
    fn add(
        &self,
        request: Signed<AddRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;

    /// Create a node at a path, creating or reusing intermediate nodes.
    fn add_by_path(
        &self,
        request: Signed<AddByPathRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Reparent a node, replacing its metadata wholesale.
    fn move_node(
        &self,
        request: Signed<MoveRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Remove a node and its whole subtree.
    fn remove(
        &self,
        request: Signed<RemoveRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Fetch every node at a path.
    fn get_node_by_path(
        &self,
        request: Signed<GetNodeByPathRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RawNode>>> + Send + '_>>;

    /// Stream the subtree under a root.
    fn get_subtree(
        &self,
        request: Signed<GetSubTreeRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<NodeStream>> + Send + '_>>;
}

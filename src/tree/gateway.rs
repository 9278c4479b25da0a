//! Typed facade over the tree backend.
//!
//! Wraps the six RPCs: attaches the bearer token from the ambient request
//! context, signs every body with the gateway key, drains streaming
//! subtree responses into an in-memory snapshot, and normalizes backend
//! `not found` conditions into [`TreeError::NodeNotFound`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use crate::auth::{RequestContext, Signer};
use crate::data::ContainerId;
use crate::errors::TreeError;
use crate::tree::backend::{
    AddByPathRequest, AddRequest, GetNodeByPathRequest, GetSubTreeRequest, MoveRequest, RawNode,
    RemoveRequest, Signed, TreeBackend, TreeId,
};
use crate::tree::codec::{meta_to_kv, FILE_NAME_KEY};

/// Deepest subtree fetch the backend accepts.
pub const MAX_GET_SUBTREE_DEPTH: u32 = 10;

/// Parameters of a by-path node fetch.
#[derive(Debug, Clone, Default)]
pub struct GetNodesParams {
    /// Path segments, already sentinel-encoded.
    pub path: Vec<String>,
    /// Metadata keys to return.
    pub attributes: Vec<String>,
    /// Return only the most recent node at the path.
    pub latest_only: bool,
    /// Return full metadata instead of `attributes`.
    pub all_attributes: bool,
}

/// Thin typed facade over a [`TreeBackend`].
pub struct TreeGateway {
    backend: Arc<dyn TreeBackend>,
    signer: Signer,
}

impl TreeGateway {
    /// Wrap a backend handle with the signing key.
    pub fn new(backend: Arc<dyn TreeBackend>, signer: Signer) -> Self {
        TreeGateway { backend, signer }
    }

    /// Create a node under `parent`. Returns the new node id.
    pub async fn add_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        parent: u64,
        meta: HashMap<String, String>,
    ) -> Result<u64, TreeError> {
        debug!(tree = tree.as_str(), parent, "add node");
        let request = Signed::new(
            AddRequest {
                container,
                tree,
                parent,
                meta: meta_to_kv(meta),
                bearer: ctx.bearer(),
            },
            &self.signer,
        );
        self.backend
            .add(request)
            .await
            .map_err(TreeError::from_backend)
    }

    /// Create a node at `path`, creating or reusing intermediates.
    pub async fn add_node_by_path(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        path: Vec<String>,
        meta: HashMap<String, String>,
    ) -> Result<(), TreeError> {
        debug!(tree = tree.as_str(), depth = path.len(), "add node by path");
        let request = Signed::new(
            AddByPathRequest {
                container,
                tree,
                path,
                path_attribute: FILE_NAME_KEY.to_string(),
                meta: meta_to_kv(meta),
                bearer: ctx.bearer(),
            },
            &self.signer,
        );
        self.backend
            .add_by_path(request)
            .await
            .map_err(TreeError::from_backend)
    }

    /// Reparent `node_id` under `parent_id`, replacing its metadata.
    pub async fn move_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        node_id: u64,
        parent_id: u64,
        meta: HashMap<String, String>,
    ) -> Result<(), TreeError> {
        debug!(tree = tree.as_str(), node_id, parent_id, "move node");
        let request = Signed::new(
            MoveRequest {
                container,
                tree,
                node_id,
                parent_id,
                meta: meta_to_kv(meta),
                bearer: ctx.bearer(),
            },
            &self.signer,
        );
        self.backend
            .move_node(request)
            .await
            .map_err(TreeError::from_backend)
    }

    /// Remove `node_id` and its whole subtree.
    pub async fn remove_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        node_id: u64,
    ) -> Result<(), TreeError> {
        debug!(tree = tree.as_str(), node_id, "remove node");
        let request = Signed::new(
            RemoveRequest {
                container,
                tree,
                node_id,
                bearer: ctx.bearer(),
            },
            &self.signer,
        );
        self.backend
            .remove(request)
            .await
            .map_err(TreeError::from_backend)
    }

    /// Fetch the subtree under `root_id`, drained into a snapshot.
    ///
    /// The caller pays one round trip and gets a materialized slice; the
    /// rest of the engine assumes snapshot semantics.
    pub async fn get_subtree(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        root_id: u64,
        depth: u32,
    ) -> Result<Vec<RawNode>, TreeError> {
        let request = Signed::new(
            GetSubTreeRequest {
                container,
                tree,
                root_id,
                depth,
                bearer: ctx.bearer(),
            },
            &self.signer,
        );
        let mut stream = self
            .backend
            .get_subtree(request)
            .await
            .map_err(TreeError::from_backend)?;

        let mut nodes = Vec::new();
        while let Some(item) = stream.next().await {
            nodes.push(item.map_err(TreeError::from_backend)?);
        }
        Ok(nodes)
    }

    /// Fetch every node at a path.
    pub async fn get_nodes(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        params: GetNodesParams,
    ) -> Result<Vec<RawNode>, TreeError> {
        let request = Signed::new(
            GetNodeByPathRequest {
                container,
                tree,
                path: params.path,
                path_attribute: FILE_NAME_KEY.to_string(),
                attributes: params.attributes,
                latest_only: params.latest_only,
                all_attributes: params.all_attributes,
                bearer: ctx.bearer(),
            },
            &self.signer,
        );
        self.backend
            .get_node_by_path(request)
            .await
            .map_err(TreeError::from_backend)
    }
}

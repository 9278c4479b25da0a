//! Version-tree operations.
//!
//! Object versions live at the tree path obtained by splitting the key on
//! `/`; sibling leaves under one parent are the versions of one object.
//! Unversioned mode keeps a single slot per path and overwrites it with a
//! move; versioned mode always appends a new sibling.  Tag and lock state
//! hang off a version node as sidecar children.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::auth::RequestContext;
use crate::data::{ContainerId, LockInfo, ObjectVersion};
use crate::errors::TreeError;
use crate::tree::backend::{RawNode, TreeId};
use crate::tree::codec::{
    self, NodeRole, TreeNode, ETAG_KEY, IS_DELETE_MARKER_KEY, IS_UNVERSIONED_KEY, OID_KEY,
    SEPARATOR, SIZE_KEY,
};
use crate::tree::gateway::{GetNodesParams, MAX_GET_SUBTREE_DEPTH};
use crate::tree::path::{form_file_path, path_from_name, prefix_path};
use crate::tree::TreeClient;

fn version_attributes() -> Vec<String> {
    [
        OID_KEY,
        IS_UNVERSIONED_KEY,
        IS_DELETE_MARKER_KEY,
        ETAG_KEY,
        SIZE_KEY,
    ]
    .iter()
    .map(|key| key.to_string())
    .collect()
}

impl TreeClient {
    /// Write a version of an object.
    ///
    /// In unversioned mode an existing slot at the same path is moved in
    /// place (its node id survives); otherwise a new sibling leaf is
    /// created at the key's path.  The lookup-then-write sequence takes no
    /// lock; the backend arbitrates concurrent writers.
    pub async fn add_version(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        version: &ObjectVersion,
    ) -> Result<(), TreeError> {
        let path = path_from_name(&version.file_path);
        let meta = codec::meta_from_version(version, &path[path.len() - 1]);

        if version.is_unversioned {
            match self.get_unversioned(ctx, container, &version.file_path).await {
                Ok(node) => {
                    let parent_id = self
                        .get_parent(ctx, container, TreeId::Version, node.id)
                        .await?;
                    return self
                        .gateway()
                        .move_node(ctx, container, TreeId::Version, node.id, parent_id, meta)
                        .await;
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        let parent_path = path[..path.len() - 1].to_vec();
        self.gateway()
            .add_node_by_path(ctx, container, TreeId::Version, parent_path, meta)
            .await
    }

    /// Remove a version node (and its sidecars) by id.
    pub async fn remove_version(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        node_id: u64,
    ) -> Result<(), TreeError> {
        self.gateway()
            .remove_node(ctx, container, TreeId::Version, node_id)
            .await
    }

    /// All versions stored at a file path. A missing tree or path yields
    /// an empty list, not an error.
    pub async fn get_versions(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        file_path: &str,
    ) -> Result<Vec<ObjectVersion>, TreeError> {
        self.get_versions_filtered(ctx, container, file_path, false)
            .await
    }

    /// The most recent version at a path, or [`TreeError::NodeNotFound`].
    pub async fn get_latest_version(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        object_name: &str,
    ) -> Result<ObjectVersion, TreeError> {
        let params = GetNodesParams {
            path: path_from_name(object_name),
            attributes: version_attributes(),
            latest_only: true,
            all_attributes: false,
        };
        let nodes = self
            .gateway()
            .get_nodes(ctx, container, TreeId::Version, params)
            .await?;

        let raw = nodes.first().ok_or(TreeError::NodeNotFound)?;
        codec::decode_version(object_name, &TreeNode::from_raw(raw)?)
    }

    /// The single unversioned slot at a path. More than one slot means
    /// the backend diverged from the invariant.
    pub async fn get_unversioned(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        file_path: &str,
    ) -> Result<ObjectVersion, TreeError> {
        let mut nodes = self
            .get_versions_filtered(ctx, container, file_path, true)
            .await?;

        if nodes.len() > 1 {
            return Err(TreeError::UnexpectedMultiplicity("unversioned node"));
        }
        nodes.pop().ok_or(TreeError::NodeNotFound)
    }

    /// Newest non-tombstone version of every object under a prefix.
    pub async fn get_latest_versions_by_prefix(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        prefix: &str,
    ) -> Result<Vec<ObjectVersion>, TreeError> {
        self.get_versions_by_prefix(ctx, container, prefix, true)
            .await
    }

    /// Every version of every object under a prefix.
    pub async fn get_all_versions_by_prefix(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        prefix: &str,
    ) -> Result<Vec<ObjectVersion>, TreeError> {
        self.get_versions_by_prefix(ctx, container, prefix, false)
            .await
    }

    // ── Tag sidecar ─────────────────────────────────────────────────

    /// User tags of an object version. No sidecar means no tags.
    pub async fn get_object_tagging(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        version: &ObjectVersion,
    ) -> Result<HashMap<String, String>, TreeError> {
        let (tag, _) = self.sidecar_nodes(ctx, container, version.id).await?;
        Ok(tag.map(|node| codec::decode_tags(&node)).unwrap_or_default())
    }

    /// Replace the tag set of an object version, creating the sidecar if
    /// it does not exist yet.
    pub async fn put_object_tagging(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        version: &ObjectVersion,
        tags: &HashMap<String, String>,
    ) -> Result<(), TreeError> {
        let (tag, _) = self.sidecar_nodes(ctx, container, version.id).await?;
        let meta = codec::meta_from_tags(tags);

        match tag {
            Some(node) => {
                self.gateway()
                    .move_node(ctx, container, TreeId::Version, node.id, version.id, meta)
                    .await
            }
            None => self
                .gateway()
                .add_node(ctx, container, TreeId::Version, version.id, meta)
                .await
                .map(|_| ()),
        }
    }

    /// Drop the tag sidecar. Absent sidecar is a no-op.
    pub async fn delete_object_tagging(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        version: &ObjectVersion,
    ) -> Result<(), TreeError> {
        let (tag, _) = self.sidecar_nodes(ctx, container, version.id).await?;
        match tag {
            Some(node) => {
                self.gateway()
                    .remove_node(ctx, container, TreeId::Version, node.id)
                    .await
            }
            None => Ok(()),
        }
    }

    // ── Lock sidecar ────────────────────────────────────────────────

    /// Lock state of a version node. A missing sidecar is an empty lock.
    pub async fn get_lock(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        node_id: u64,
    ) -> Result<LockInfo, TreeError> {
        let (_, lock) = self.sidecar_nodes(ctx, container, node_id).await?;
        match lock {
            Some(node) => codec::decode_lock(&node),
            None => Ok(LockInfo::default()),
        }
    }

    /// Write lock state under a version node. A lock with id 0 adds a
    /// sidecar; a nonzero id moves the existing one in place.
    pub async fn put_lock(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        node_id: u64,
        lock: &LockInfo,
    ) -> Result<(), TreeError> {
        let meta = codec::meta_from_lock(lock);

        if lock.id == 0 {
            return self
                .gateway()
                .add_node(ctx, container, TreeId::Version, node_id, meta)
                .await
                .map(|_| ());
        }

        self.gateway()
            .move_node(ctx, container, TreeId::Version, lock.id, node_id, meta)
            .await
    }

    /// Tags and lock state in a single subtree scan, for callers that
    /// need both without paying two round trips.
    pub async fn get_object_tagging_and_lock(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        version: &ObjectVersion,
    ) -> Result<(HashMap<String, String>, LockInfo), TreeError> {
        let (tag, lock) = self.sidecar_nodes(ctx, container, version.id).await?;

        let tags = tag.map(|node| codec::decode_tags(&node)).unwrap_or_default();
        let lock = match lock {
            Some(node) => codec::decode_lock(&node)?,
            None => LockInfo::default(),
        };

        Ok((tags, lock))
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Depth-1 scan of a version node's children, picking out the tag and
    /// lock sidecars.
    async fn sidecar_nodes(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        node_id: u64,
    ) -> Result<(Option<TreeNode>, Option<TreeNode>), TreeError> {
        let subtree = self
            .gateway()
            .get_subtree(ctx, container, TreeId::Version, node_id, 1)
            .await?;

        let mut tag = None;
        let mut lock = None;
        for raw in &subtree {
            if raw.node_id == node_id {
                continue;
            }
            let node = TreeNode::from_raw(raw)?;
            match node.role() {
                NodeRole::TagSidecar if tag.is_none() => tag = Some(node),
                NodeRole::LockSidecar if lock.is_none() => lock = Some(node),
                _ => {}
            }
        }
        Ok((tag, lock))
    }

    async fn get_versions_filtered(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        file_path: &str,
        only_unversioned: bool,
    ) -> Result<Vec<ObjectVersion>, TreeError> {
        let params = GetNodesParams {
            path: path_from_name(file_path),
            attributes: version_attributes(),
            latest_only: false,
            all_attributes: false,
        };
        let nodes = match self
            .gateway()
            .get_nodes(ctx, container, TreeId::Version, params)
            .await
        {
            Ok(nodes) => nodes,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut result = Vec::with_capacity(nodes.len());
        for raw in &nodes {
            let version = codec::decode_version(file_path, &TreeNode::from_raw(raw)?)?;
            if only_unversioned && !version.is_unversioned {
                continue;
            }
            result.push(version);
        }
        Ok(result)
    }

    /// Parent id of a node, learned from a depth-0 subtree fetch.
    async fn get_parent(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        node_id: u64,
    ) -> Result<u64, TreeError> {
        let subtree = self
            .gateway()
            .get_subtree(ctx, container, tree, node_id, 0)
            .await?;
        subtree
            .first()
            .map(|node| node.parent_id)
            .ok_or(TreeError::NodeNotFound)
    }

    async fn get_versions_by_prefix(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        prefix: &str,
        latest_only: bool,
    ) -> Result<Vec<ObjectVersion>, TreeError> {
        let (prefix_nodes, head_prefix) = self
            .get_subtree_by_prefix(ctx, container, TreeId::Version, prefix, latest_only)
            .await?;

        let mut result = Vec::new();
        for node in &prefix_nodes {
            let versions = self
                .get_subtree_versions(ctx, container, node.node_id, &head_prefix, latest_only)
                .await?;
            result.extend(versions);
        }
        Ok(result)
    }

    /// Phase 1 of prefix listing: locate the directory node the prefix
    /// points into, fetch its children, and keep those whose name starts
    /// with the prefix tail.  With `latest_only`, each name keeps its
    /// newest leaf, while intermediate nodes always survive (they are
    /// roots of deeper matching subtrees).
    ///
    /// Returns the surviving nodes and the head part of the prefix (what
    /// precedes the tail), which phase 2 uses to rebuild full paths.
    pub(crate) async fn get_subtree_by_prefix(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        prefix: &str,
        latest_only: bool,
    ) -> Result<(Vec<RawNode>, String), TreeError> {
        let (root_id, tail) = match self.determine_prefix_node(ctx, container, tree, prefix).await
        {
            Ok(found) => found,
            Err(err) if err.is_not_found() => return Ok((Vec::new(), String::new())),
            Err(err) => return Err(err),
        };

        let subtree = match self
            .gateway()
            .get_subtree(ctx, container, tree, root_id, 1)
            .await
        {
            Ok(nodes) => nodes,
            Err(err) if err.is_not_found() => return Ok((Vec::new(), String::new())),
            Err(err) => return Err(err),
        };

        let mut nodes_map: HashMap<String, Vec<RawNode>> = HashMap::with_capacity(subtree.len());
        for node in subtree {
            if node.node_id == root_id {
                continue;
            }

            let file_name = codec::raw_file_name(&node).to_string();
            if !file_name.starts_with(&tail) {
                continue;
            }

            // Keep every node when latest_only is off.  Otherwise keep
            // all intermediates plus the newest leaf per name, holding
            // the leaf candidate at slot 0.
            let slot = nodes_map.entry(file_name).or_default();
            if slot.is_empty() {
                slot.push(node);
            } else if !latest_only || codec::is_intermediate(&node) {
                slot.push(node);
            } else if codec::is_intermediate(&slot[0]) {
                slot.insert(0, node);
            } else if node.timestamp > slot[0].timestamp {
                slot[0] = node;
            }
        }

        let head_prefix = prefix[..prefix.len() - tail.len()].to_string();
        let result = nodes_map.into_values().flatten().collect();
        Ok((result, head_prefix))
    }

    /// Resolve a prefix to the node to list under and the tail segment to
    /// match children against.
    async fn determine_prefix_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        prefix: &str,
    ) -> Result<(u64, String), TreeError> {
        let (parent_path, tail) = prefix_path(prefix);

        let root_id = if parent_path.is_empty() {
            0
        } else {
            self.get_prefix_node_id(ctx, container, tree, parent_path)
                .await?
        };

        Ok((root_id, tail))
    }

    /// The unique intermediate node at `prefix_path`. Several intermediates
    /// with one name mean the backend diverged.
    async fn get_prefix_node_id(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tree: TreeId,
        prefix_path: Vec<String>,
    ) -> Result<u64, TreeError> {
        let params = GetNodesParams {
            path: prefix_path,
            attributes: Vec::new(),
            latest_only: false,
            all_attributes: true,
        };
        let nodes = self.gateway().get_nodes(ctx, container, tree, params).await?;

        let intermediates: Vec<u64> = nodes
            .iter()
            .filter(|node| codec::is_intermediate(node))
            .map(|node| node.node_id)
            .collect();

        match intermediates.as_slice() {
            [] => Err(TreeError::NodeNotFound),
            [id] => Ok(*id),
            _ => Err(TreeError::UnexpectedMultiplicity("intermediate node")),
        }
    }

    /// Phase 2 of prefix listing: expand one phase-1 root to the backend
    /// depth ceiling, rebuilding file paths as the nodes stream in, and
    /// group version leaves by (parent, name).
    async fn get_subtree_versions(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        root_id: u64,
        parent_file_path: &str,
        latest_only: bool,
    ) -> Result<Vec<ObjectVersion>, TreeError> {
        let subtree = self
            .gateway()
            .get_subtree(ctx, container, TreeId::Version, root_id, MAX_GET_SUBTREE_DEPTH)
            .await?;

        // The root of the subtree can itself sit below a path.
        let parent_prefix = if parent_file_path.is_empty() {
            String::new()
        } else {
            let base = parent_file_path
                .strip_suffix(SEPARATOR)
                .unwrap_or(parent_file_path);
            format!("{base}{SEPARATOR}")
        };

        let mut names_map: HashMap<u64, String> = HashMap::with_capacity(subtree.len());
        let mut versions: HashMap<(u64, String), Vec<ObjectVersion>> = HashMap::new();

        for (i, raw) in subtree.iter().enumerate() {
            let node = TreeNode::from_raw(raw)?;
            // Sidecar children carry no FileName and cannot have
            // descendants of their own; skip them.
            let Some(file_name) = node.file_name() else {
                continue;
            };

            let file_path = if i == 0 {
                let path = format!("{parent_prefix}{file_name}");
                names_map.insert(node.id, path.clone());
                path
            } else {
                form_file_path(raw, &file_name, &mut names_map)?
            };

            // Intermediates only contribute to the names map.
            if node.oid.is_none() {
                continue;
            }

            let version = codec::decode_version(&file_path, &node)?;
            match versions.entry((raw.parent_id, file_name)) {
                Entry::Vacant(entry) => {
                    entry.insert(vec![version]);
                }
                Entry::Occupied(mut entry) => {
                    let group = entry.get_mut();
                    if !latest_only {
                        group.push(version);
                    } else if group[0].timestamp <= version.timestamp {
                        group[0] = version;
                    }
                }
            }
        }

        let mut result = Vec::with_capacity(versions.len());
        for group in versions.into_values() {
            if latest_only && group[0].is_delete_marker() {
                continue;
            }
            result.extend(group);
        }
        Ok(result)
    }
}

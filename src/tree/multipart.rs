//! Multipart-upload operations over the `system` tree.
//!
//! An upload is a node at the object key's path whose children are the
//! uploaded parts, one child per part number.  Re-uploading a part number
//! moves the existing child in place and hands the superseded payload id
//! back to the caller for garbage collection.

use std::collections::HashMap;

use crate::auth::RequestContext;
use crate::data::{ContainerId, MultipartUpload, Oid, Part};
use crate::errors::TreeError;
use crate::tree::backend::TreeId;
use crate::tree::codec::{self, TreeNode, SEPARATOR};
use crate::tree::gateway::{GetNodesParams, MAX_GET_SUBTREE_DEPTH};
use crate::tree::path::{form_file_path, path_from_name};
use crate::tree::TreeClient;

impl TreeClient {
    /// Create the upload root at the parent path of the object key.
    pub async fn create_multipart_upload(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        info: &MultipartUpload,
    ) -> Result<(), TreeError> {
        let path = path_from_name(&info.key);
        let meta = codec::meta_from_multipart(info, &path[path.len() - 1]);
        let parent_path = path[..path.len() - 1].to_vec();

        self.gateway()
            .add_node_by_path(ctx, container, TreeId::System, parent_path, meta)
            .await
    }

    /// Resolve an upload by key and upload id. A path may hold several
    /// uploads awaiting completion, so the nodes at the path are scanned
    /// for the matching id.
    pub async fn get_multipart_upload(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        object_name: &str,
        upload_id: &str,
    ) -> Result<MultipartUpload, TreeError> {
        let params = GetNodesParams {
            path: path_from_name(object_name),
            attributes: Vec::new(),
            latest_only: false,
            all_attributes: true,
        };
        let nodes = self
            .gateway()
            .get_nodes(ctx, container, TreeId::System, params)
            .await?;

        for raw in &nodes {
            let node = TreeNode::from_raw(raw)?;
            let info = match codec::decode_multipart(object_name, &node) {
                Ok(info) => info,
                Err(TreeError::NotMultipartNode) => continue,
                Err(err) => return Err(err),
            };
            if info.upload_id == upload_id {
                return Ok(info);
            }
        }

        Err(TreeError::NodeNotFound)
    }

    /// Every in-progress upload whose key starts with the prefix.
    pub async fn get_multipart_uploads_by_prefix(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        prefix: &str,
    ) -> Result<Vec<MultipartUpload>, TreeError> {
        let (prefix_nodes, head_prefix) = self
            .get_subtree_by_prefix(ctx, container, TreeId::System, prefix, false)
            .await?;

        let mut result = Vec::new();
        for node in &prefix_nodes {
            let uploads = self
                .subtree_multipart_uploads(ctx, container, node.node_id, &head_prefix)
                .await?;
            result.extend(uploads);
        }
        Ok(result)
    }

    /// Insert or replace a part.
    ///
    /// If a child with the same number exists it is moved in place and the
    /// superseded payload id is returned so the caller can collect it.  A
    /// fresh part number adds a child and yields the
    /// [`TreeError::NoNodeToRemove`] sentinel: nothing to clean up.
    pub async fn add_part(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        multipart_node_id: u64,
        part: &Part,
    ) -> Result<Oid, TreeError> {
        let children = self
            .gateway()
            .get_subtree(ctx, container, TreeId::System, multipart_node_id, 1)
            .await?;

        let meta = codec::meta_from_part(part);

        let mut found: Option<(u64, Oid)> = None;
        for raw in &children {
            if raw.node_id == multipart_node_id {
                continue;
            }
            let Ok(node) = TreeNode::from_raw(raw) else {
                continue;
            };
            let Ok(existing) = codec::decode_part(&node) else {
                continue;
            };
            if existing.number == part.number {
                found = Some((raw.node_id, existing.oid));
                break;
            }
        }

        match found {
            None => {
                self.gateway()
                    .add_node(ctx, container, TreeId::System, multipart_node_id, meta)
                    .await?;
                Err(TreeError::NoNodeToRemove)
            }
            Some((node_id, old_oid)) => {
                self.gateway()
                    .move_node(ctx, container, TreeId::System, node_id, multipart_node_id, meta)
                    .await?;
                Ok(old_oid)
            }
        }
    }

    /// Uploaded parts of an upload root, unordered; children that do not
    /// decode as parts are skipped.
    pub async fn get_parts(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        multipart_node_id: u64,
    ) -> Result<Vec<Part>, TreeError> {
        let children = self
            .gateway()
            .get_subtree(ctx, container, TreeId::System, multipart_node_id, 1)
            .await?;

        let mut result = Vec::with_capacity(children.len());
        for raw in &children {
            if raw.node_id == multipart_node_id {
                continue;
            }
            let Ok(node) = TreeNode::from_raw(raw) else {
                continue;
            };
            let Ok(part) = codec::decode_part(&node) else {
                continue;
            };
            result.push(part);
        }
        Ok(result)
    }

    /// Drop an upload; the backend cascades the removal to the parts.
    pub async fn delete_multipart_upload(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        multipart_node_id: u64,
    ) -> Result<(), TreeError> {
        self.gateway()
            .remove_node(ctx, container, TreeId::System, multipart_node_id)
            .await
    }

    /// Expand one prefix-listing root and decode every upload root in it,
    /// rebuilding full keys the same way version listing does.
    async fn subtree_multipart_uploads(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        root_id: u64,
        parent_file_path: &str,
    ) -> Result<Vec<MultipartUpload>, TreeError> {
        let subtree = self
            .gateway()
            .get_subtree(ctx, container, TreeId::System, root_id, MAX_GET_SUBTREE_DEPTH)
            .await?;

        let parent_prefix = if parent_file_path.is_empty() {
            String::new()
        } else {
            let base = parent_file_path
                .strip_suffix(SEPARATOR)
                .unwrap_or(parent_file_path);
            format!("{base}{SEPARATOR}")
        };

        let mut names_map: HashMap<u64, String> = HashMap::with_capacity(subtree.len());
        let mut result = Vec::new();

        for (i, raw) in subtree.iter().enumerate() {
            let node = TreeNode::from_raw(raw)?;
            // Part children carry no FileName and have no descendants.
            let Some(file_name) = node.file_name() else {
                continue;
            };

            let key = if i == 0 {
                let path = format!("{parent_prefix}{file_name}");
                names_map.insert(node.id, path.clone());
                path
            } else {
                form_file_path(raw, &file_name, &mut names_map)?
            };

            match codec::decode_multipart(&key, &node) {
                Ok(info) => result.push(info),
                Err(TreeError::NotMultipartNode) => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(result)
    }
}

//! Bucket-wide singletons in the `system` tree.
//!
//! Settings, CORS pointer, notification pointer, and bucket tags each live
//! in a single node at the tree root, identified by a well-known
//! `FileName`.  Puts are upsert-by-move: add when absent, otherwise move
//! the existing node in place with replacement metadata.

use std::collections::HashMap;

use crate::auth::RequestContext;
use crate::data::{BucketSettings, ContainerId, Oid};
use crate::errors::TreeError;
use crate::tree::backend::TreeId;
use crate::tree::codec::{
    self, TreeNode, BUCKET_TAGGING_FILE_NAME, CORS_FILE_NAME, FILE_NAME_KEY,
    LOCK_CONFIGURATION_KEY, NOTIF_CONF_FILE_NAME, OID_KEY, SETTINGS_FILE_NAME, VERSIONING_KEY,
};
use crate::tree::gateway::GetNodesParams;
use crate::tree::TreeClient;

fn pointer_meta(file_name: &str, oid: Oid) -> HashMap<String, String> {
    let mut meta = HashMap::with_capacity(2);
    meta.insert(FILE_NAME_KEY.to_string(), file_name.to_string());
    meta.insert(OID_KEY.to_string(), oid.to_hex());
    meta
}

impl TreeClient {
    // ── Bucket settings ─────────────────────────────────────────────

    /// Read the bucket settings singleton. [`TreeError::NodeNotFound`]
    /// when the bucket has never been configured.
    pub async fn get_settings_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
    ) -> Result<BucketSettings, TreeError> {
        let attributes = vec![VERSIONING_KEY.to_string(), LOCK_CONFIGURATION_KEY.to_string()];
        let node = self
            .get_system_node(ctx, container, SETTINGS_FILE_NAME, attributes, false)
            .await?;
        codec::decode_settings(&node)
    }

    /// Write the bucket settings singleton.
    pub async fn put_settings_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        settings: &BucketSettings,
    ) -> Result<(), TreeError> {
        let meta = codec::meta_from_settings(settings);

        match self
            .get_system_node(ctx, container, SETTINGS_FILE_NAME, Vec::new(), false)
            .await
        {
            Ok(node) => {
                self.gateway()
                    .move_node(ctx, container, TreeId::System, node.id, 0, meta)
                    .await
            }
            Err(err) if err.is_not_found() => self
                .gateway()
                .add_node(ctx, container, TreeId::System, 0, meta)
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        }
    }

    // ── Notification configuration pointer ──────────────────────────

    /// Payload id of the stored notification configuration.
    pub async fn get_notification_configuration_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
    ) -> Result<Oid, TreeError> {
        let node = self
            .get_system_node(
                ctx,
                container,
                NOTIF_CONF_FILE_NAME,
                vec![OID_KEY.to_string()],
                false,
            )
            .await?;
        Ok(node.oid.unwrap_or_default())
    }

    /// Store the notification configuration pointer. Returns the previous
    /// payload id for collection, or [`TreeError::NoNodeToRemove`] when
    /// there was none.
    pub async fn put_notification_configuration_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        oid: Oid,
    ) -> Result<Oid, TreeError> {
        self.put_pointer_node(ctx, container, NOTIF_CONF_FILE_NAME, oid)
            .await
    }

    // ── CORS pointer ────────────────────────────────────────────────

    /// Payload id of the stored CORS configuration.
    pub async fn get_bucket_cors(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
    ) -> Result<Oid, TreeError> {
        let node = self
            .get_system_node(ctx, container, CORS_FILE_NAME, vec![OID_KEY.to_string()], false)
            .await?;
        Ok(node.oid.unwrap_or_default())
    }

    /// Store the CORS pointer. Returns the previous payload id, or
    /// [`TreeError::NoNodeToRemove`] when there was none.
    pub async fn put_bucket_cors(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        oid: Oid,
    ) -> Result<Oid, TreeError> {
        self.put_pointer_node(ctx, container, CORS_FILE_NAME, oid).await
    }

    /// Drop the CORS pointer, returning the payload id it held.
    /// [`TreeError::NoNodeToRemove`] signals there was nothing to delete.
    pub async fn delete_bucket_cors(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
    ) -> Result<Oid, TreeError> {
        match self
            .get_system_node(ctx, container, CORS_FILE_NAME, vec![OID_KEY.to_string()], false)
            .await
        {
            Ok(node) => {
                self.gateway()
                    .remove_node(ctx, container, TreeId::System, node.id)
                    .await?;
                Ok(node.oid.unwrap_or_default())
            }
            Err(err) if err.is_not_found() => Err(TreeError::NoNodeToRemove),
            Err(err) => Err(err),
        }
    }

    // ── Bucket tagging ──────────────────────────────────────────────

    /// User tags on the bucket. [`TreeError::NodeNotFound`] when the
    /// bucket has never been tagged.
    pub async fn get_bucket_tagging(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
    ) -> Result<HashMap<String, String>, TreeError> {
        let node = self
            .get_system_node(ctx, container, BUCKET_TAGGING_FILE_NAME, Vec::new(), true)
            .await?;
        Ok(codec::decode_tags(&node))
    }

    /// Replace the bucket tag set.
    pub async fn put_bucket_tagging(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        tags: &HashMap<String, String>,
    ) -> Result<(), TreeError> {
        let meta = codec::meta_from_bucket_tags(tags);

        match self
            .get_system_node(ctx, container, BUCKET_TAGGING_FILE_NAME, Vec::new(), false)
            .await
        {
            Ok(node) => {
                self.gateway()
                    .move_node(ctx, container, TreeId::System, node.id, 0, meta)
                    .await
            }
            Err(err) if err.is_not_found() => self
                .gateway()
                .add_node(ctx, container, TreeId::System, 0, meta)
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        }
    }

    /// Drop the bucket tag set. [`TreeError::NoNodeToRemove`] signals
    /// there was nothing to delete.
    pub async fn delete_bucket_tagging(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
    ) -> Result<(), TreeError> {
        match self
            .get_system_node(ctx, container, BUCKET_TAGGING_FILE_NAME, Vec::new(), false)
            .await
        {
            Ok(node) => {
                self.gateway()
                    .remove_node(ctx, container, TreeId::System, node.id)
                    .await
            }
            Err(err) if err.is_not_found() => Err(TreeError::NoNodeToRemove),
            Err(err) => Err(err),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn put_pointer_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        file_name: &str,
        oid: Oid,
    ) -> Result<Oid, TreeError> {
        let meta = pointer_meta(file_name, oid);

        match self
            .get_system_node(ctx, container, file_name, vec![OID_KEY.to_string()], false)
            .await
        {
            Ok(node) => {
                self.gateway()
                    .move_node(ctx, container, TreeId::System, node.id, 0, meta)
                    .await?;
                Ok(node.oid.unwrap_or_default())
            }
            Err(err) if err.is_not_found() => {
                self.gateway()
                    .add_node(ctx, container, TreeId::System, 0, meta)
                    .await?;
                Err(TreeError::NoNodeToRemove)
            }
            Err(err) => Err(err),
        }
    }

    /// The unique singleton at `[file_name]`. Zero matches is
    /// [`TreeError::NodeNotFound`]; several is a divergence.
    async fn get_system_node(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        file_name: &str,
        attributes: Vec<String>,
        all_attributes: bool,
    ) -> Result<TreeNode, TreeError> {
        let params = GetNodesParams {
            path: vec![file_name.to_string()],
            attributes,
            latest_only: false,
            all_attributes,
        };
        let nodes = self
            .gateway()
            .get_nodes(ctx, container, TreeId::System, params)
            .await?;

        match nodes.as_slice() {
            [] => Err(TreeError::NodeNotFound),
            [node] => TreeNode::from_raw(node),
            _ => Err(TreeError::UnexpectedMultiplicity("system node")),
        }
    }
}

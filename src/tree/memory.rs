//! In-memory tree backend.
//!
//! Keeps every tree in memory with no persistence. Useful for testing and
//! ephemeral deployments. Uses `RwLock`-guarded maps for thread-safe
//! access; node ids and timestamps come from per-backend monotonic
//! counters, making it the sole serializer the engine expects the real
//! backend to be.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use futures::stream;

use crate::data::ContainerId;
use crate::tree::backend::{
    AddByPathRequest, AddRequest, GetNodeByPathRequest, GetSubTreeRequest, KeyValue, MoveRequest,
    NodeStream, RawNode, RemoveRequest, Signed, TreeBackend, TreeId,
};
use crate::tree::codec::FILE_NAME_KEY;

/// Id of the implicit root every tree hangs off. Never stored.
const ROOT_ID: u64 = 0;

#[derive(Debug, Clone)]
struct StoredNode {
    parent_id: u64,
    timestamp: u64,
    meta: Vec<KeyValue>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: HashMap<u64, StoredNode>,
}

impl Tree {
    /// Children of `parent`, ordered by node id for determinism.
    fn children(&self, parent: u64) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent_id == parent)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Children of `parent` whose `FileName` equals `segment`.
    fn children_named(&self, parent: u64, segment: &str) -> Vec<u64> {
        self.children(parent)
            .into_iter()
            .filter(|id| {
                self.nodes[id]
                    .meta
                    .iter()
                    .any(|kv| kv.key == FILE_NAME_KEY && kv.value.as_ref() == segment.as_bytes())
            })
            .collect()
    }
}

#[derive(Debug)]
struct Inner {
    trees: HashMap<(ContainerId, TreeId), Tree>,
    next_node_id: u64,
    clock: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            trees: HashMap::new(),
            next_node_id: 1,
            clock: 1,
        }
    }
}

impl Inner {
    fn tree_mut(&mut self, container: ContainerId, tree: TreeId) -> &mut Tree {
        self.trees.entry((container, tree)).or_default()
    }

    fn tree(&self, container: ContainerId, tree: TreeId) -> anyhow::Result<&Tree> {
        self.trees
            .get(&(container, tree))
            .ok_or_else(|| anyhow::anyhow!("tree {} not found", tree.as_str()))
    }

    fn alloc_node(&mut self) -> (u64, u64) {
        let id = self.next_node_id;
        self.next_node_id += 1;
        let timestamp = self.clock;
        self.clock += 1;
        (id, timestamp)
    }

    fn insert(
        &mut self,
        container: ContainerId,
        tree: TreeId,
        parent_id: u64,
        meta: Vec<KeyValue>,
    ) -> anyhow::Result<u64> {
        if parent_id != ROOT_ID
            && !self
                .tree_mut(container, tree)
                .nodes
                .contains_key(&parent_id)
        {
            anyhow::bail!("parent node {parent_id} not found");
        }
        let (id, timestamp) = self.alloc_node();
        self.tree_mut(container, tree).nodes.insert(
            id,
            StoredNode {
                parent_id,
                timestamp,
                meta,
            },
        );
        Ok(id)
    }

    /// Walk `path` from the root, creating intermediate nodes as needed.
    /// Returns the parent node the final entry should hang under.
    fn resolve_or_create(
        &mut self,
        container: ContainerId,
        tree: TreeId,
        path: &[String],
    ) -> anyhow::Result<u64> {
        let mut current = ROOT_ID;
        for segment in path {
            let existing = self
                .tree_mut(container, tree)
                .children_named(current, segment);
            current = match existing.first() {
                Some(id) => *id,
                None => {
                    let meta = vec![KeyValue::new(FILE_NAME_KEY, segment.clone())];
                    self.insert(container, tree, current, meta)?
                }
            };
        }
        Ok(current)
    }
}

/// In-memory implementation of [`TreeBackend`].
pub struct MemoryTreeBackend {
    inner: RwLock<Inner>,
}

impl MemoryTreeBackend {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryTreeBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_node(id: u64, node: &StoredNode, meta: Vec<KeyValue>) -> RawNode {
    RawNode {
        node_id: id,
        parent_id: node.parent_id,
        timestamp: node.timestamp,
        meta,
    }
}

impl TreeBackend for MemoryTreeBackend {
    fn add(
        &self,
        request: Signed<AddRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let body = request.body;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            inner.insert(body.container, body.tree, body.parent, body.meta)
        })
    }

    fn add_by_path(
        &self,
        request: Signed<AddByPathRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let body = request.body;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let parent = inner.resolve_or_create(body.container, body.tree, &body.path)?;
            inner.insert(body.container, body.tree, parent, body.meta)?;
            Ok(())
        })
    }

    fn move_node(
        &self,
        request: Signed<MoveRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let body = request.body;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            if body.node_id == ROOT_ID {
                anyhow::bail!("cannot move the tree root");
            }
            if body.parent_id != ROOT_ID {
                let tree = inner.tree(body.container, body.tree)?;
                if !tree.nodes.contains_key(&body.parent_id) {
                    anyhow::bail!("parent node {} not found", body.parent_id);
                }
            }
            let timestamp = {
                let ts = inner.clock;
                inner.clock += 1;
                ts
            };
            let tree = inner.tree_mut(body.container, body.tree);
            let node = tree
                .nodes
                .get_mut(&body.node_id)
                .ok_or_else(|| anyhow::anyhow!("node {} not found", body.node_id))?;
            node.parent_id = body.parent_id;
            node.meta = body.meta;
            node.timestamp = timestamp;
            Ok(())
        })
    }

    fn remove(
        &self,
        request: Signed<RemoveRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let body = request.body;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let tree = inner.tree_mut(body.container, body.tree);
            if !tree.nodes.contains_key(&body.node_id) {
                anyhow::bail!("node {} not found", body.node_id);
            }
            // Collect the whole subtree before removing anything.
            let mut doomed = vec![body.node_id];
            let mut queue = vec![body.node_id];
            while let Some(id) = queue.pop() {
                let children = tree.children(id);
                doomed.extend(&children);
                queue.extend(children);
            }
            for id in doomed {
                tree.nodes.remove(&id);
            }
            Ok(())
        })
    }

    fn get_node_by_path(
        &self,
        request: Signed<GetNodeByPathRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RawNode>>> + Send + '_>> {
        Box::pin(async move {
            let body = request.body;
            let inner = self.inner.read().expect("rwlock poisoned");
            let tree = inner.tree(body.container, body.tree)?;

            let mut candidates = vec![ROOT_ID];
            for segment in &body.path {
                let mut next = Vec::new();
                for parent in candidates {
                    next.extend(tree.children_named(parent, segment));
                }
                candidates = next;
                if candidates.is_empty() {
                    return Ok(Vec::new());
                }
            }

            let mut result: Vec<RawNode> = candidates
                .into_iter()
                .map(|id| {
                    let node = &tree.nodes[&id];
                    let meta = if body.all_attributes {
                        node.meta.clone()
                    } else {
                        node.meta
                            .iter()
                            .filter(|kv| body.attributes.contains(&kv.key))
                            .cloned()
                            .collect()
                    };
                    raw_node(id, node, meta)
                })
                .collect();

            if body.latest_only && result.len() > 1 {
                result.sort_by_key(|node| node.timestamp);
                let latest = result.pop().expect("nonempty");
                result = vec![latest];
            }

            Ok(result)
        })
    }

    fn get_subtree(
        &self,
        request: Signed<GetSubTreeRequest>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<NodeStream>> + Send + '_>> {
        Box::pin(async move {
            let body = request.body;
            let inner = self.inner.read().expect("rwlock poisoned");
            let tree = inner.tree(body.container, body.tree)?;

            let root = if body.root_id == ROOT_ID {
                // The implicit root has no stored record.
                RawNode::default()
            } else {
                let node = tree
                    .nodes
                    .get(&body.root_id)
                    .ok_or_else(|| anyhow::anyhow!("node {} not found", body.root_id))?;
                raw_node(body.root_id, node, node.meta.clone())
            };

            // Breadth-first, so a parent always precedes its descendants.
            let mut bodies = vec![root];
            let mut frontier = vec![(body.root_id, 0u32)];
            while let Some((id, level)) = frontier.pop() {
                if level >= body.depth {
                    continue;
                }
                for child in tree.children(id) {
                    let node = &tree.nodes[&child];
                    bodies.push(raw_node(child, node, node.meta.clone()));
                    frontier.insert(0, (child, level + 1));
                }
            }

            let stream: NodeStream = Box::pin(stream::iter(bodies.into_iter().map(anyhow::Ok)));
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Signer;
    use crate::tree::backend::SignBody;
    use futures::StreamExt;

    fn signer() -> Signer {
        Signer::new(b"memory-test-key".to_vec())
    }

    fn cnr() -> ContainerId {
        ContainerId::new([1; 32])
    }

    fn sign<B: SignBody>(body: B) -> Signed<B> {
        Signed::new(body, &signer())
    }

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }

    async fn drain(stream: NodeStream) -> Vec<RawNode> {
        stream
            .map(|item| item.unwrap())
            .collect::<Vec<RawNode>>()
            .await
    }

    async fn add(backend: &MemoryTreeBackend, parent: u64, meta: Vec<KeyValue>) -> u64 {
        backend
            .add(sign(AddRequest {
                container: cnr(),
                tree: TreeId::Version,
                parent,
                meta,
                bearer: None,
            }))
            .await
            .unwrap()
    }

    async fn subtree(backend: &MemoryTreeBackend, root: u64, depth: u32) -> Vec<RawNode> {
        let stream = backend
            .get_subtree(sign(GetSubTreeRequest {
                container: cnr(),
                tree: TreeId::Version,
                root_id: root,
                depth,
                bearer: None,
            }))
            .await
            .unwrap();
        drain(stream).await
    }

    #[tokio::test]
    async fn add_assigns_increasing_ids_and_timestamps() {
        let backend = MemoryTreeBackend::new();
        let a = add(&backend, 0, vec![kv("FileName", "a")]).await;
        let b = add(&backend, 0, vec![kv("FileName", "b")]).await;
        assert!(b > a);

        let nodes = subtree(&backend, 0, 1).await;
        // Implicit root plus the two children.
        assert_eq!(nodes.len(), 3);
        assert!(nodes[1].timestamp < nodes[2].timestamp);
    }

    #[tokio::test]
    async fn add_by_path_reuses_intermediates() {
        let backend = MemoryTreeBackend::new();
        for name in ["x", "y"] {
            backend
                .add_by_path(sign(AddByPathRequest {
                    container: cnr(),
                    tree: TreeId::Version,
                    path: vec!["docs".to_string()],
                    path_attribute: FILE_NAME_KEY.to_string(),
                    meta: vec![kv("FileName", name), kv("OID", "00")],
                    bearer: None,
                }))
                .await
                .unwrap();
        }

        let nodes = subtree(&backend, 0, 10).await;
        // Root, one shared "docs" intermediate, two leaves.
        assert_eq!(nodes.len(), 4);
        let docs: Vec<&RawNode> = nodes
            .iter()
            .filter(|n| crate::tree::codec::raw_file_name(n) == "docs")
            .collect();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn subtree_depth_bounds_traversal() {
        let backend = MemoryTreeBackend::new();
        let a = add(&backend, 0, vec![kv("FileName", "a")]).await;
        let b = add(&backend, a, vec![kv("FileName", "b")]).await;
        let _c = add(&backend, b, vec![kv("FileName", "c")]).await;

        assert_eq!(subtree(&backend, a, 0).await.len(), 1);
        assert_eq!(subtree(&backend, a, 1).await.len(), 2);
        assert_eq!(subtree(&backend, a, 10).await.len(), 3);
    }

    #[tokio::test]
    async fn subtree_delivers_parents_before_children() {
        let backend = MemoryTreeBackend::new();
        let a = add(&backend, 0, vec![kv("FileName", "a")]).await;
        let b = add(&backend, a, vec![kv("FileName", "b")]).await;
        let _c1 = add(&backend, b, vec![kv("FileName", "c1")]).await;
        let _c2 = add(&backend, b, vec![kv("FileName", "c2")]).await;

        let nodes = subtree(&backend, 0, 10).await;
        let mut seen = std::collections::HashSet::new();
        for node in &nodes {
            if node.node_id != 0 {
                assert!(seen.contains(&node.parent_id), "parent seen before child");
            }
            seen.insert(node.node_id);
        }
    }

    #[tokio::test]
    async fn missing_tree_and_node_report_not_found() {
        let backend = MemoryTreeBackend::new();
        let err = match backend
            .get_subtree(sign(GetSubTreeRequest {
                container: cnr(),
                tree: TreeId::Version,
                root_id: 0,
                depth: 1,
                bearer: None,
            }))
            .await
        {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("not found"));

        add(&backend, 0, vec![kv("FileName", "a")]).await;
        let err = match backend
            .get_subtree(sign(GetSubTreeRequest {
                container: cnr(),
                tree: TreeId::Version,
                root_id: 999,
                depth: 1,
                bearer: None,
            }))
            .await
        {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn get_node_by_path_filters_attributes() {
        let backend = MemoryTreeBackend::new();
        backend
            .add_by_path(sign(AddByPathRequest {
                container: cnr(),
                tree: TreeId::Version,
                path: vec!["docs".to_string()],
                path_attribute: FILE_NAME_KEY.to_string(),
                meta: vec![kv("FileName", "a"), kv("ETag", "e1"), kv("Size", "3")],
                bearer: None,
            }))
            .await
            .unwrap();

        let nodes = backend
            .get_node_by_path(sign(GetNodeByPathRequest {
                container: cnr(),
                tree: TreeId::Version,
                path: vec!["docs".to_string(), "a".to_string()],
                path_attribute: FILE_NAME_KEY.to_string(),
                attributes: vec!["ETag".to_string()],
                latest_only: false,
                all_attributes: false,
                bearer: None,
            }))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].meta.len(), 1);
        assert_eq!(nodes[0].meta[0].key, "ETag");
    }

    #[tokio::test]
    async fn get_node_by_path_latest_only_picks_newest() {
        let backend = MemoryTreeBackend::new();
        for etag in ["old", "new"] {
            backend
                .add_by_path(sign(AddByPathRequest {
                    container: cnr(),
                    tree: TreeId::Version,
                    path: vec!["docs".to_string()],
                    path_attribute: FILE_NAME_KEY.to_string(),
                    meta: vec![kv("FileName", "a"), kv("ETag", etag)],
                    bearer: None,
                }))
                .await
                .unwrap();
        }

        let request = |latest_only| {
            sign(GetNodeByPathRequest {
                container: cnr(),
                tree: TreeId::Version,
                path: vec!["docs".to_string(), "a".to_string()],
                path_attribute: FILE_NAME_KEY.to_string(),
                attributes: vec!["ETag".to_string()],
                latest_only,
                all_attributes: false,
                bearer: None,
            })
        };

        let all = backend.get_node_by_path(request(false)).await.unwrap();
        assert_eq!(all.len(), 2);

        let latest = backend.get_node_by_path(request(true)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].meta[0].value.as_ref(), b"new");
    }

    #[tokio::test]
    async fn move_replaces_metadata_and_reparents() {
        let backend = MemoryTreeBackend::new();
        let a = add(&backend, 0, vec![kv("FileName", "a")]).await;
        let b = add(&backend, 0, vec![kv("FileName", "b"), kv("ETag", "x")]).await;

        backend
            .move_node(sign(MoveRequest {
                container: cnr(),
                tree: TreeId::Version,
                node_id: b,
                parent_id: a,
                meta: vec![kv("FileName", "b2")],
                bearer: None,
            }))
            .await
            .unwrap();

        let nodes = subtree(&backend, a, 1).await;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].node_id, b);
        assert_eq!(nodes[1].meta, vec![kv("FileName", "b2")]);
    }

    #[tokio::test]
    async fn remove_cascades_to_descendants() {
        let backend = MemoryTreeBackend::new();
        let a = add(&backend, 0, vec![kv("FileName", "a")]).await;
        let b = add(&backend, a, vec![kv("FileName", "b")]).await;
        let _c = add(&backend, b, vec![kv("FileName", "c")]).await;

        backend
            .remove(sign(RemoveRequest {
                container: cnr(),
                tree: TreeId::Version,
                node_id: a,
                bearer: None,
            }))
            .await
            .unwrap();

        let nodes = subtree(&backend, 0, 10).await;
        assert_eq!(nodes.len(), 1); // only the implicit root remains
    }
}

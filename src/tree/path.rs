//! Path encoding for object keys.
//!
//! Object keys split on `/` into tree path segments.  Leading and trailing
//! slashes produce empty segments, which the tree cannot represent; those
//! are substituted with the `<empty>` sentinel on the way in and restored
//! on the way out.

use std::collections::HashMap;

use crate::errors::TreeError;
use crate::tree::backend::RawNode;
use crate::tree::codec::{EMPTY_FILE_NAME, SEPARATOR};

/// Split an object key into tree path segments, substituting the sentinel
/// for empty head and tail segments.
pub fn path_from_name(object_name: &str) -> Vec<String> {
    let mut path: Vec<String> = object_name.split(SEPARATOR).map(str::to_string).collect();
    if path[0].is_empty() {
        path[0] = EMPTY_FILE_NAME.to_string();
    }
    let last = path.len() - 1;
    if path[last].is_empty() {
        path[last] = EMPTY_FILE_NAME.to_string();
    }
    path
}

/// Split a listing prefix into the parent path to resolve and the tail
/// segment to match children against.  Only the head segment gets the
/// sentinel treatment: the tail is a string prefix, not a full segment.
pub fn prefix_path(prefix: &str) -> (Vec<String>, String) {
    let mut path: Vec<String> = prefix.split(SEPARATOR).map(str::to_string).collect();
    if path.len() > 1 && path[0].is_empty() {
        path[0] = EMPTY_FILE_NAME.to_string();
    }
    let tail = path.pop().unwrap_or_default();
    (path, tail)
}

/// Reconstruct the full path of a node during subtree traversal.
///
/// Subtree responses deliver a parent before its descendants; `names_map`
/// accumulates node id to reconstructed path.  A parent missing from the
/// map means the traversal order is broken.
pub fn form_file_path(
    node: &RawNode,
    file_name: &str,
    names_map: &mut HashMap<u64, String>,
) -> Result<String, TreeError> {
    let parent_path = names_map
        .get(&node.parent_id)
        .ok_or(TreeError::InvalidNodeOrder)?;

    let file_path = format!("{parent_path}{SEPARATOR}{file_name}");
    names_map.insert(node.node_id, file_path.clone());

    Ok(file_path)
}

//! ListObjectVersions assembly.
//!
//! Collects every version under the prefix, orders names ascending and
//! versions newest-first within a name, applies the (key, version) marker
//! cursor, collapses delimited keys into common prefixes, cuts the page
//! at `max_keys`, and splits the page into live versions and delete
//! markers.

use std::collections::BTreeMap;

use crate::auth::RequestContext;
use crate::data::{
    ContainerId, ExtendedObjectVersion, ListObjectVersionsInfo, ListObjectVersionsParams,
    ObjectVersion,
};
use crate::errors::TreeError;
use crate::tree::TreeClient;

impl TreeClient {
    /// List object versions under a prefix with S3 pagination semantics.
    pub async fn list_object_versions(
        &self,
        ctx: &RequestContext,
        container: ContainerId,
        params: &ListObjectVersionsParams,
    ) -> Result<ListObjectVersionsInfo, TreeError> {
        let versions = self
            .get_all_versions_by_prefix(ctx, container, &params.prefix)
            .await?;

        let mut groups: BTreeMap<String, Vec<ObjectVersion>> = BTreeMap::new();
        for version in versions {
            groups
                .entry(version.file_path.clone())
                .or_default()
                .push(version);
        }

        let mut all = assemble_versions(groups);
        advance_to_markers(&mut all, &params.key_marker, &params.version_id_marker);

        let (common_prefixes, mut all) =
            triage_extended_objects(all, &params.prefix, &params.delimiter);

        let mut info = ListObjectVersionsInfo {
            common_prefixes,
            ..ListObjectVersionsInfo::default()
        };

        if all.len() > params.max_keys {
            info.is_truncated = true;
            info.next_key_marker = all[params.max_keys].version.file_path.clone();
            info.next_version_id_marker = all[params.max_keys].version.version_id();

            all.truncate(params.max_keys);
            if let Some(last) = all.last() {
                info.key_marker = last.version.file_path.clone();
                info.version_id_marker = last.version.version_id();
            }
        }

        let (versions, delete_markers) = triage_versions(all);
        info.versions = versions;
        info.delete_markers = delete_markers;
        Ok(info)
    }
}

/// Flatten name groups into listing order: names ascending, versions
/// newest-first within a name, `is_latest` on the head of each group.
fn assemble_versions(
    groups: BTreeMap<String, Vec<ObjectVersion>>,
) -> Vec<ExtendedObjectVersion> {
    let mut all = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for (i, version) in group.into_iter().enumerate() {
            all.push(ExtendedObjectVersion {
                version,
                is_latest: i == 0,
            });
        }
    }
    all
}

/// Drop everything before the marker position.
///
/// The cursor is the combined condition `name >= key_marker AND
/// version_id >= version_id_marker`, kept as documented behavior rather
/// than the pairwise S3 ordering; with empty markers the first element
/// always qualifies.  Nothing qualifying leaves an empty list.
fn advance_to_markers(
    all: &mut Vec<ExtendedObjectVersion>,
    key_marker: &str,
    version_id_marker: &str,
) {
    let position = all.iter().position(|obj| {
        obj.version.file_path.as_str() >= key_marker
            && obj.version.version_id().as_str() >= version_id_marker
    });
    match position {
        Some(i) => {
            all.drain(..i);
        }
        None => all.clear(),
    }
}

/// Collapse keys containing the delimiter past the prefix into common
/// prefixes (up to and including the first delimiter), deduplicated in
/// listing order. An empty delimiter disables grouping.
fn triage_extended_objects(
    all: Vec<ExtendedObjectVersion>,
    prefix: &str,
    delimiter: &str,
) -> (Vec<String>, Vec<ExtendedObjectVersion>) {
    if delimiter.is_empty() {
        return (Vec::new(), all);
    }

    let mut common_prefixes: Vec<String> = Vec::new();
    let mut flat = Vec::new();

    for obj in all {
        let collapsed = {
            let name = obj.version.file_path.as_str();
            let tail = name.strip_prefix(prefix).unwrap_or(name);
            tail.find(delimiter)
                .map(|pos| format!("{prefix}{}{delimiter}", &tail[..pos]))
        };
        match collapsed {
            Some(common) => {
                if !common_prefixes.contains(&common) {
                    common_prefixes.push(common);
                }
            }
            None => flat.push(obj),
        }
    }

    (common_prefixes, flat)
}

/// Stable partition into live versions and delete markers.
fn triage_versions(
    all: Vec<ExtendedObjectVersion>,
) -> (Vec<ExtendedObjectVersion>, Vec<ExtendedObjectVersion>) {
    all.into_iter()
        .partition(|obj| !obj.version.is_delete_marker())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RequestContext, Signer};
    use crate::data::{DeleteMarkerInfo, Oid};
    use crate::tree::memory::MemoryTreeBackend;
    use std::sync::Arc;
    use std::time::UNIX_EPOCH;

    fn ver(name: &str, oid_byte: u8, timestamp: u64) -> ObjectVersion {
        ObjectVersion {
            id: 0,
            oid: Oid::new([oid_byte; 32]),
            timestamp,
            size: 1,
            etag: String::new(),
            file_path: name.to_string(),
            is_unversioned: false,
            delete_marker: None,
        }
    }

    fn grouped(versions: Vec<ObjectVersion>) -> BTreeMap<String, Vec<ObjectVersion>> {
        let mut groups: BTreeMap<String, Vec<ObjectVersion>> = BTreeMap::new();
        for version in versions {
            groups
                .entry(version.file_path.clone())
                .or_default()
                .push(version);
        }
        groups
    }

    #[test]
    fn versions_order_newest_first_with_unique_latest() {
        let all = assemble_versions(grouped(vec![
            ver("a/b", 1, 100),
            ver("a/b", 2, 200),
            ver("a/b", 3, 150),
        ]));

        let timestamps: Vec<u64> = all.iter().map(|o| o.version.timestamp).collect();
        assert_eq!(timestamps, [200, 150, 100]);

        let latest: Vec<bool> = all.iter().map(|o| o.is_latest).collect();
        assert_eq!(latest, [true, false, false]);
    }

    #[test]
    fn names_are_listed_ascending() {
        let all = assemble_versions(grouped(vec![
            ver("b", 1, 10),
            ver("a", 2, 20),
            ver("c", 3, 5),
        ]));
        let names: Vec<&str> = all.iter().map(|o| o.version.file_path.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn marker_advance_uses_combined_comparison() {
        let mut all = assemble_versions(grouped(vec![
            ver("a", 1, 10),
            ver("b", 2, 20),
            ver("c", 3, 30),
        ]));
        advance_to_markers(&mut all, "b", "");
        let names: Vec<&str> = all.iter().map(|o| o.version.file_path.as_str()).collect();
        assert_eq!(names, ["b", "c"]);

        // Empty markers keep everything.
        let mut all = assemble_versions(grouped(vec![ver("a", 1, 10)]));
        advance_to_markers(&mut all, "", "");
        assert_eq!(all.len(), 1);

        // Nothing qualifying empties the list.
        let mut all = assemble_versions(grouped(vec![ver("a", 1, 10)]));
        advance_to_markers(&mut all, "z", "");
        assert!(all.is_empty());
    }

    #[test]
    fn delimiter_collapses_into_common_prefixes() {
        let all = assemble_versions(grouped(vec![
            ver("docs/a", 1, 10),
            ver("docs/b", 2, 20),
            ver("docs/sub/c", 3, 30),
            ver("docs/sub/d", 4, 40),
        ]));
        let (prefixes, flat) = triage_extended_objects(all, "docs/", "/");
        assert_eq!(prefixes, ["docs/sub/"]);
        let names: Vec<&str> = flat.iter().map(|o| o.version.file_path.as_str()).collect();
        assert_eq!(names, ["docs/a", "docs/b"]);
    }

    #[test]
    fn empty_delimiter_collapses_nothing() {
        let all = assemble_versions(grouped(vec![ver("docs/a", 1, 10)]));
        let (prefixes, flat) = triage_extended_objects(all, "", "");
        assert!(prefixes.is_empty());
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn split_preserves_order_within_partitions() {
        let marker = ObjectVersion {
            delete_marker: Some(DeleteMarkerInfo {
                created: UNIX_EPOCH,
                owner: "o".to_string(),
            }),
            ..ver("b", 9, 50)
        };
        let all = assemble_versions(grouped(vec![
            ver("a", 1, 10),
            marker,
            ver("c", 2, 20),
        ]));
        let (live, markers) = triage_versions(all);
        let live_names: Vec<&str> = live.iter().map(|o| o.version.file_path.as_str()).collect();
        assert_eq!(live_names, ["a", "c"]);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].version.file_path, "b");
        assert!(markers[0].is_latest);
    }

    // ── End-to-end over the in-memory backend ───────────────────────

    fn client() -> TreeClient {
        TreeClient::new(
            Arc::new(MemoryTreeBackend::new()),
            Signer::new(b"listing-test-key".to_vec()),
        )
    }

    fn cnr() -> ContainerId {
        ContainerId::new([6; 32])
    }

    fn ctx() -> RequestContext {
        RequestContext::empty()
    }

    fn params(prefix: &str, delimiter: &str, max_keys: usize) -> ListObjectVersionsParams {
        ListObjectVersionsParams {
            prefix: prefix.to_string(),
            delimiter: delimiter.to_string(),
            key_marker: String::new(),
            version_id_marker: String::new(),
            max_keys,
        }
    }

    #[tokio::test]
    async fn prefix_and_delimiter_grouping() {
        let client = client();
        for (key, oid_byte) in [("docs/a", 1u8), ("docs/b", 2), ("docs/sub/c", 3)] {
            client
                .add_version(&ctx(), cnr(), &ver(key, oid_byte, 0))
                .await
                .unwrap();
        }

        let info = client
            .list_object_versions(&ctx(), cnr(), &params("docs/", "/", 100))
            .await
            .unwrap();

        let names: Vec<&str> = info
            .versions
            .iter()
            .map(|o| o.version.file_path.as_str())
            .collect();
        assert_eq!(names, ["docs/a", "docs/b"]);
        assert_eq!(info.common_prefixes, ["docs/sub/"]);
        assert!(!info.is_truncated);
    }

    #[tokio::test]
    async fn delete_markers_split_with_latest_flag() {
        let client = client();
        client.add_version(&ctx(), cnr(), &ver("a", 1, 0)).await.unwrap();
        let marker = ObjectVersion {
            delete_marker: Some(DeleteMarkerInfo {
                created: UNIX_EPOCH,
                owner: "o".to_string(),
            }),
            ..ver("a", 2, 0)
        };
        client.add_version(&ctx(), cnr(), &marker).await.unwrap();

        let info = client
            .list_object_versions(&ctx(), cnr(), &params("a", "", 100))
            .await
            .unwrap();

        assert_eq!(info.versions.len(), 1);
        assert_eq!(info.delete_markers.len(), 1);
        assert!(info.delete_markers[0].is_latest, "the tombstone is newest");
        assert!(!info.versions[0].is_latest);
    }

    #[tokio::test]
    async fn pagination_walks_the_whole_listing() {
        let client = client();
        let keys: Vec<String> = (0..10).map(|i| format!("k{i:02}")).collect();
        for (i, key) in keys.iter().enumerate() {
            client
                .add_version(&ctx(), cnr(), &ver(key, i as u8 + 1, 0))
                .await
                .unwrap();
        }

        // First page.
        let first = client
            .list_object_versions(&ctx(), cnr(), &params("", "", 3))
            .await
            .unwrap();
        assert!(first.is_truncated);
        let first_names: Vec<&str> = first
            .versions
            .iter()
            .map(|o| o.version.file_path.as_str())
            .collect();
        assert_eq!(first_names, ["k00", "k01", "k02"]);
        assert_eq!(first.key_marker, "k02", "echoed marker is the last included");
        assert_eq!(first.next_key_marker, "k03", "next marker is the first dropped");

        // Second page resumes at the dropped item.
        let mut page_params = params("", "", 3);
        page_params.key_marker = first.next_key_marker.clone();
        page_params.version_id_marker = first.next_version_id_marker.clone();
        let second = client
            .list_object_versions(&ctx(), cnr(), &page_params)
            .await
            .unwrap();
        let second_names: Vec<&str> = second
            .versions
            .iter()
            .map(|o| o.version.file_path.as_str())
            .collect();
        assert_eq!(second_names, ["k03", "k04", "k05"]);

        // Concatenating pages equals the unpaginated listing.
        let mut collected = Vec::new();
        let mut cursor = params("", "", 3);
        loop {
            let page = client
                .list_object_versions(&ctx(), cnr(), &cursor)
                .await
                .unwrap();
            collected.extend(
                page.versions
                    .iter()
                    .map(|o| o.version.file_path.clone()),
            );
            if !page.is_truncated {
                break;
            }
            cursor.key_marker = page.next_key_marker.clone();
            cursor.version_id_marker = page.next_version_id_marker.clone();
        }
        assert_eq!(collected, keys);
    }

    #[tokio::test]
    async fn max_keys_zero_truncates_immediately() {
        let client = client();
        client.add_version(&ctx(), cnr(), &ver("a", 1, 0)).await.unwrap();

        let info = client
            .list_object_versions(&ctx(), cnr(), &params("", "", 0))
            .await
            .unwrap();
        assert!(info.is_truncated);
        assert!(info.versions.is_empty());
        assert_eq!(info.next_key_marker, "a");
    }

    #[tokio::test]
    async fn empty_bucket_lists_empty() {
        let client = client();
        let info = client
            .list_object_versions(&ctx(), cnr(), &params("", "", 10))
            .await
            .unwrap();
        assert!(info.versions.is_empty());
        assert!(info.delete_markers.is_empty());
        assert!(!info.is_truncated);
    }
}

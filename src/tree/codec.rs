//! Node metadata codec.
//!
//! Defines the reserved metadata-key vocabulary and the pure translation
//! between domain records and the string-to-bytes metadata map stored on a
//! tree node.  Which reserved keys are present determines a node's role;
//! [`TreeNode::role`] enumerates the closed set.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::data::{
    BucketSettings, DefaultRetention, DeleteMarkerInfo, LockInfo, MultipartUpload,
    ObjectLockConfiguration, ObjectLockRule, ObjectVersion, Oid, Part, Retention, Versioning,
};
use crate::errors::TreeError;
use crate::tree::backend::{KeyValue, RawNode};

// ── Reserved metadata keys ──────────────────────────────────────────

pub(crate) const FILE_NAME_KEY: &str = "FileName";
pub(crate) const OID_KEY: &str = "OID";
pub(crate) const SIZE_KEY: &str = "Size";
pub(crate) const ETAG_KEY: &str = "ETag";
pub(crate) const IS_UNVERSIONED_KEY: &str = "IsUnversioned";
pub(crate) const IS_TAG_KEY: &str = "IsTag";
pub(crate) const UPLOAD_ID_KEY: &str = "UploadId";
pub(crate) const PART_NUMBER_KEY: &str = "Number";
pub(crate) const VERSIONING_KEY: &str = "Versioning";
pub(crate) const LOCK_CONFIGURATION_KEY: &str = "LockConfiguration";

// Keys for lock sidecars.
pub(crate) const IS_LOCK_KEY: &str = "IsLock";
pub(crate) const LEGAL_HOLD_OID_KEY: &str = "LegalHoldOID";
pub(crate) const RETENTION_OID_KEY: &str = "RetentionOID";
pub(crate) const UNTIL_DATE_KEY: &str = "UntilDate";
pub(crate) const IS_COMPLIANCE_KEY: &str = "IsCompliance";

// Keys for delete-marker nodes.
pub(crate) const IS_DELETE_MARKER_KEY: &str = "IsDeleteMarker";
pub(crate) const OWNER_KEY: &str = "Owner";
pub(crate) const CREATED_KEY: &str = "Created";

// File names of the system-tree singletons.
pub(crate) const SETTINGS_FILE_NAME: &str = "bucket-settings";
pub(crate) const NOTIF_CONF_FILE_NAME: &str = "bucket-notifications";
pub(crate) const CORS_FILE_NAME: &str = "bucket-cors";
pub(crate) const BUCKET_TAGGING_FILE_NAME: &str = "bucket-tagging";

/// Stand-in for an empty path segment; a hierarchical encoding cannot
/// represent leading or trailing slashes directly.
pub(crate) const EMPTY_FILE_NAME: &str = "<empty>";

pub(crate) const SEPARATOR: &str = "/";
pub(crate) const USER_TAG_PREFIX: &str = "User-Tag-";

// ── Parsed node ─────────────────────────────────────────────────────

/// A node with its reserved `OID` and `Size` entries parsed out and the
/// remaining metadata decoded to strings.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Backend node id.
    pub id: u64,
    /// Parent node id.
    pub parent_id: u64,
    /// Backend timestamp.
    pub timestamp: u64,
    /// Payload id, when the node carries one.
    pub oid: Option<Oid>,
    /// Payload size; 0 when the node carries none.
    pub size: i64,
    /// Remaining metadata entries.
    pub meta: HashMap<String, String>,
}

/// Role of a node, decided by which reserved keys are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// A path segment with no payload: exactly `{FileName}`.
    Intermediate,
    /// A tombstone version.
    DeleteMarker,
    /// A multipart upload root.
    UploadRoot,
    /// An uploaded part.
    Part,
    /// A tag sidecar hanging off the node it annotates.
    TagSidecar,
    /// A lock sidecar.
    LockSidecar,
    /// A bucket-settings singleton.
    SystemSingleton,
    /// An object version.
    Version,
    /// Off-vocabulary metadata; the engine never writes such nodes.
    Unknown,
}

impl TreeNode {
    /// Parse a raw node body. Malformed `OID` or `Size` values and
    /// non-UTF-8 metadata fail with a structural error.
    pub fn from_raw(raw: &RawNode) -> Result<Self, TreeError> {
        let mut node = TreeNode {
            id: raw.node_id,
            parent_id: raw.parent_id,
            timestamp: raw.timestamp,
            oid: None,
            size: 0,
            meta: HashMap::with_capacity(raw.meta.len()),
        };

        for kv in &raw.meta {
            let value = decode_value(&kv.key, &kv.value)?;
            match kv.key.as_str() {
                OID_KEY => {
                    node.oid = Some(parse_oid(OID_KEY, &value)?);
                }
                SIZE_KEY => {
                    if !value.is_empty() {
                        node.size = value.parse().map_err(|_| TreeError::InvalidMeta {
                            field: SIZE_KEY,
                            value: value.clone(),
                        })?;
                    }
                }
                _ => {
                    node.meta.insert(kv.key.clone(), value);
                }
            }
        }

        Ok(node)
    }

    /// Metadata value under `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// The node's path segment, with the empty-segment sentinel decoded.
    pub fn file_name(&self) -> Option<String> {
        self.meta.get(FILE_NAME_KEY).map(|value| {
            if value == EMPTY_FILE_NAME {
                String::new()
            } else {
                value.clone()
            }
        })
    }

    /// Classify the node by its reserved keys.
    pub fn role(&self) -> NodeRole {
        if self.oid.is_none()
            && self.size == 0
            && self.meta.len() == 1
            && self.meta.contains_key(FILE_NAME_KEY)
        {
            return NodeRole::Intermediate;
        }
        if self.meta.contains_key(IS_DELETE_MARKER_KEY) {
            return NodeRole::DeleteMarker;
        }
        if self.meta.contains_key(UPLOAD_ID_KEY) {
            return NodeRole::UploadRoot;
        }
        if self.meta.contains_key(PART_NUMBER_KEY) {
            return NodeRole::Part;
        }
        if self.meta.contains_key(IS_TAG_KEY) {
            return NodeRole::TagSidecar;
        }
        if self.meta.contains_key(IS_LOCK_KEY) {
            return NodeRole::LockSidecar;
        }
        if self.meta.contains_key(VERSIONING_KEY)
            || self.meta.contains_key(LOCK_CONFIGURATION_KEY)
        {
            return NodeRole::SystemSingleton;
        }
        if self.oid.is_some() {
            return NodeRole::Version;
        }
        NodeRole::Unknown
    }
}

fn decode_value(key: &str, value: &Bytes) -> Result<String, TreeError> {
    std::str::from_utf8(value)
        .map(str::to_string)
        .map_err(|_| TreeError::InvalidMeta {
            field: "metadata",
            value: key.to_string(),
        })
}

pub(crate) fn parse_oid(field: &'static str, value: &str) -> Result<Oid, TreeError> {
    Oid::from_hex(value).ok_or_else(|| TreeError::InvalidMeta {
        field,
        value: value.to_string(),
    })
}

/// `FileName` value of a raw node, undecoded. Empty when absent or not
/// valid UTF-8.
pub(crate) fn raw_file_name(raw: &RawNode) -> &str {
    raw.meta
        .iter()
        .find(|kv| kv.key == FILE_NAME_KEY)
        .and_then(|kv| std::str::from_utf8(&kv.value).ok())
        .unwrap_or("")
}

/// Whether a raw node is an intermediate directory: exactly one metadata
/// entry, and it is `FileName`.
pub(crate) fn is_intermediate(raw: &RawNode) -> bool {
    raw.meta.len() == 1 && raw.meta[0].key == FILE_NAME_KEY
}

/// Convert a metadata map to wire entries, sorted by key.
pub(crate) fn meta_to_kv(meta: HashMap<String, String>) -> Vec<KeyValue> {
    let mut entries: Vec<KeyValue> = meta
        .into_iter()
        .map(|(key, value)| KeyValue::new(key, value))
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
}

// ── Time ────────────────────────────────────────────────────────────

/// Milliseconds since the UNIX epoch, as stored under `Created`.
pub(crate) fn unix_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub(crate) fn from_unix_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

fn parse_millis(field: &'static str, value: &str) -> Result<SystemTime, TreeError> {
    let millis: i64 = value.parse().map_err(|_| TreeError::InvalidMeta {
        field,
        value: value.to_string(),
    })?;
    Ok(from_unix_millis(millis))
}

// ── Decoders ────────────────────────────────────────────────────────

/// Decode an object version. The file path is supplied by the caller:
/// either the queried path or the one reconstructed during traversal.
pub fn decode_version(file_path: &str, node: &TreeNode) -> Result<ObjectVersion, TreeError> {
    let delete_marker = if node.get(IS_DELETE_MARKER_KEY).is_some() {
        let created = match node.get(CREATED_KEY) {
            Some(value) => parse_millis(CREATED_KEY, value)?,
            None => UNIX_EPOCH,
        };
        Some(DeleteMarkerInfo {
            created,
            owner: node.get(OWNER_KEY).unwrap_or_default().to_string(),
        })
    } else {
        None
    };

    Ok(ObjectVersion {
        id: node.id,
        oid: node.oid.unwrap_or_default(),
        timestamp: node.timestamp,
        size: node.size,
        etag: node.get(ETAG_KEY).unwrap_or_default().to_string(),
        file_path: file_path.to_string(),
        is_unversioned: node.get(IS_UNVERSIONED_KEY).is_some(),
        delete_marker,
    })
}

/// Decode a multipart upload root. A node without `UploadId` fails with
/// [`TreeError::NotMultipartNode`]; callers scanning mixed subtrees skip
/// on it.
pub fn decode_multipart(key: &str, node: &TreeNode) -> Result<MultipartUpload, TreeError> {
    let upload_id = node
        .get(UPLOAD_ID_KEY)
        .ok_or(TreeError::NotMultipartNode)?
        .to_string();

    let created = match node.get(CREATED_KEY) {
        Some(value) => parse_millis(CREATED_KEY, value)?,
        None => UNIX_EPOCH,
    };

    let mut meta = HashMap::new();
    for (k, v) in &node.meta {
        match k.as_str() {
            FILE_NAME_KEY | UPLOAD_ID_KEY | OWNER_KEY | CREATED_KEY => {}
            _ => {
                meta.insert(k.clone(), v.clone());
            }
        }
    }

    Ok(MultipartUpload {
        id: node.id,
        key: key.to_string(),
        upload_id,
        owner: node.get(OWNER_KEY).unwrap_or_default().to_string(),
        created,
        meta,
    })
}

/// Decode an upload part. A node without a positive `Number` fails with
/// [`TreeError::NotPartNode`].
pub fn decode_part(node: &TreeNode) -> Result<Part, TreeError> {
    let number: u32 = match node.get(PART_NUMBER_KEY) {
        Some(value) => value.parse().map_err(|_| TreeError::InvalidMeta {
            field: PART_NUMBER_KEY,
            value: value.to_string(),
        })?,
        None => return Err(TreeError::NotPartNode),
    };
    if number == 0 {
        return Err(TreeError::NotPartNode);
    }

    let created = match node.get(CREATED_KEY) {
        Some(value) => parse_millis(CREATED_KEY, value)?,
        None => UNIX_EPOCH,
    };

    Ok(Part {
        number,
        oid: node.oid.unwrap_or_default(),
        size: node.size,
        etag: node.get(ETAG_KEY).unwrap_or_default().to_string(),
        created,
    })
}

/// User tags of a tag-bearing node, with the namespace prefix stripped.
pub fn decode_tags(node: &TreeNode) -> HashMap<String, String> {
    node.meta
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(USER_TAG_PREFIX)
                .map(|tag| (tag.to_string(), value.clone()))
        })
        .collect()
}

/// Decode a lock sidecar. Invalid lock object ids are structural errors.
pub fn decode_lock(node: &TreeNode) -> Result<LockInfo, TreeError> {
    let mut lock = LockInfo {
        id: node.id,
        ..LockInfo::default()
    };

    if let Some(value) = node.get(LEGAL_HOLD_OID_KEY) {
        lock.legal_hold = Some(parse_oid(LEGAL_HOLD_OID_KEY, value)?);
    }

    if let Some(value) = node.get(RETENTION_OID_KEY) {
        lock.retention = Some(Retention {
            oid: parse_oid(RETENTION_OID_KEY, value)?,
            until_date: node.get(UNTIL_DATE_KEY).unwrap_or_default().to_string(),
            is_compliance: node.get(IS_COMPLIANCE_KEY).is_some(),
        });
    }

    Ok(lock)
}

/// Decode the bucket-settings singleton. A missing `Versioning` key
/// defaults to unversioned mode.
pub fn decode_settings(node: &TreeNode) -> Result<BucketSettings, TreeError> {
    let versioning = match node.get(VERSIONING_KEY) {
        Some(value) => Versioning::from_str(value).ok_or_else(|| TreeError::InvalidMeta {
            field: VERSIONING_KEY,
            value: value.to_string(),
        })?,
        None => Versioning::default(),
    };

    let lock_configuration = match node.get(LOCK_CONFIGURATION_KEY) {
        Some(value) => Some(parse_lock_configuration(value)?),
        None => None,
    };

    Ok(BucketSettings {
        versioning,
        lock_configuration,
    })
}

// ── Encoders ────────────────────────────────────────────────────────

/// Metadata for a version node. `file_name` is the (sentinel-encoded)
/// final path segment.
pub fn meta_from_version(version: &ObjectVersion, file_name: &str) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    meta.insert(OID_KEY.to_string(), version.oid.to_hex());
    meta.insert(FILE_NAME_KEY.to_string(), file_name.to_string());

    if version.size > 0 {
        meta.insert(SIZE_KEY.to_string(), version.size.to_string());
    }
    if !version.etag.is_empty() {
        meta.insert(ETAG_KEY.to_string(), version.etag.clone());
    }

    if let Some(marker) = &version.delete_marker {
        meta.insert(IS_DELETE_MARKER_KEY.to_string(), "true".to_string());
        meta.insert(OWNER_KEY.to_string(), marker.owner.clone());
        meta.insert(CREATED_KEY.to_string(), unix_millis(marker.created).to_string());
    }

    if version.is_unversioned {
        meta.insert(IS_UNVERSIONED_KEY.to_string(), "true".to_string());
    }

    meta
}

/// Metadata for the bucket-settings singleton.
pub fn meta_from_settings(settings: &BucketSettings) -> HashMap<String, String> {
    let mut meta = HashMap::with_capacity(3);
    meta.insert(FILE_NAME_KEY.to_string(), SETTINGS_FILE_NAME.to_string());
    meta.insert(VERSIONING_KEY.to_string(), settings.versioning.as_str().to_string());
    meta.insert(
        LOCK_CONFIGURATION_KEY.to_string(),
        encode_lock_configuration(settings.lock_configuration.as_ref()),
    );
    meta
}

/// Metadata for a multipart upload root. `file_name` is the final path
/// segment of the upload key.
pub fn meta_from_multipart(info: &MultipartUpload, file_name: &str) -> HashMap<String, String> {
    let mut meta = info.meta.clone();
    meta.insert(FILE_NAME_KEY.to_string(), file_name.to_string());
    meta.insert(UPLOAD_ID_KEY.to_string(), info.upload_id.clone());
    meta.insert(OWNER_KEY.to_string(), info.owner.clone());
    meta.insert(CREATED_KEY.to_string(), unix_millis(info.created).to_string());
    meta
}

/// Metadata for an upload part node.
pub fn meta_from_part(part: &Part) -> HashMap<String, String> {
    let mut meta = HashMap::with_capacity(5);
    meta.insert(PART_NUMBER_KEY.to_string(), part.number.to_string());
    meta.insert(OID_KEY.to_string(), part.oid.to_hex());
    meta.insert(SIZE_KEY.to_string(), part.size.to_string());
    meta.insert(CREATED_KEY.to_string(), unix_millis(part.created).to_string());
    meta.insert(ETAG_KEY.to_string(), part.etag.clone());
    meta
}

/// Metadata for a lock sidecar node.
pub fn meta_from_lock(lock: &LockInfo) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    meta.insert(IS_LOCK_KEY.to_string(), "true".to_string());

    if let Some(legal_hold) = &lock.legal_hold {
        meta.insert(LEGAL_HOLD_OID_KEY.to_string(), legal_hold.to_hex());
    }
    if let Some(retention) = &lock.retention {
        meta.insert(RETENTION_OID_KEY.to_string(), retention.oid.to_hex());
        meta.insert(UNTIL_DATE_KEY.to_string(), retention.until_date.clone());
        if retention.is_compliance {
            meta.insert(IS_COMPLIANCE_KEY.to_string(), "true".to_string());
        }
    }

    meta
}

/// Metadata for a tag sidecar node.
pub fn meta_from_tags(tags: &HashMap<String, String>) -> HashMap<String, String> {
    let mut meta = HashMap::with_capacity(tags.len() + 1);
    meta.insert(IS_TAG_KEY.to_string(), "true".to_string());
    for (key, value) in tags {
        meta.insert(format!("{USER_TAG_PREFIX}{key}"), value.clone());
    }
    meta
}

/// Metadata for the bucket-tagging singleton.
pub fn meta_from_bucket_tags(tags: &HashMap<String, String>) -> HashMap<String, String> {
    let mut meta = HashMap::with_capacity(tags.len() + 1);
    meta.insert(FILE_NAME_KEY.to_string(), BUCKET_TAGGING_FILE_NAME.to_string());
    for (key, value) in tags {
        meta.insert(format!("{USER_TAG_PREFIX}{key}"), value.clone());
    }
    meta
}

// ── Lock configuration string codec ─────────────────────────────────

/// Parse the comma-joined lock configuration: either a single
/// `<enabled>` field or the four-field
/// `<enabled>,<days>,<mode>,<years>` form.
pub fn parse_lock_configuration(value: &str) -> Result<ObjectLockConfiguration, TreeError> {
    if value.is_empty() {
        return Ok(ObjectLockConfiguration::default());
    }

    let fields: Vec<&str> = value.split(',').collect();
    let mut result = ObjectLockConfiguration {
        object_lock_enabled: fields[0].to_string(),
        rule: None,
    };

    if fields.len() == 1 {
        return Ok(result);
    }
    if fields.len() != 4 {
        return Err(TreeError::InvalidLockConfiguration(value.to_string()));
    }

    let days: i64 = if fields[1].is_empty() {
        0
    } else {
        fields[1]
            .parse()
            .map_err(|_| TreeError::InvalidLockConfiguration(value.to_string()))?
    };
    let years: i64 = if fields[3].is_empty() {
        0
    } else {
        fields[3]
            .parse()
            .map_err(|_| TreeError::InvalidLockConfiguration(value.to_string()))?
    };

    result.rule = Some(ObjectLockRule {
        default_retention: DefaultRetention {
            days,
            mode: fields[2].to_string(),
            years,
        },
    });

    Ok(result)
}

/// Encode a lock configuration. `None` encodes as the empty string; a
/// configuration without a default retention keeps only the enabled
/// literal.
pub fn encode_lock_configuration(conf: Option<&ObjectLockConfiguration>) -> String {
    let Some(conf) = conf else {
        return String::new();
    };

    match &conf.rule {
        None => conf.object_lock_enabled.clone(),
        Some(rule) => {
            let defaults = &rule.default_retention;
            format!(
                "{},{},{},{}",
                conf.object_lock_enabled, defaults.days, defaults.mode, defaults.years
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(meta: &[(&str, &str)]) -> RawNode {
        RawNode {
            node_id: 1,
            parent_id: 0,
            timestamp: 1,
            meta: meta
                .iter()
                .map(|(k, v)| KeyValue::new(*k, v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn parse_extracts_oid_and_size() {
        let oid = Oid::new([7; 32]);
        let node = TreeNode::from_raw(&raw(&[
            ("FileName", "obj"),
            ("OID", &oid.to_hex()),
            ("Size", "42"),
        ]))
        .unwrap();
        assert_eq!(node.oid, Some(oid));
        assert_eq!(node.size, 42);
        assert_eq!(node.file_name().as_deref(), Some("obj"));
        assert!(node.get("OID").is_none()); // extracted, not residual
    }

    #[test]
    fn parse_rejects_malformed_oid_and_size() {
        assert!(matches!(
            TreeNode::from_raw(&raw(&[("OID", "xyz")])),
            Err(TreeError::InvalidMeta { field: "OID", .. })
        ));
        assert!(matches!(
            TreeNode::from_raw(&raw(&[("Size", "12q")])),
            Err(TreeError::InvalidMeta { field: "Size", .. })
        ));
        // An empty Size value is tolerated.
        assert_eq!(TreeNode::from_raw(&raw(&[("Size", "")])).unwrap().size, 0);
    }

    #[test]
    fn file_name_decodes_empty_sentinel() {
        let node = TreeNode::from_raw(&raw(&[("FileName", "<empty>")])).unwrap();
        assert_eq!(node.file_name().as_deref(), Some(""));
    }

    #[test]
    fn roles_follow_key_presence() {
        let oid_hex = Oid::new([1; 32]).to_hex();
        let cases: Vec<(RawNode, NodeRole)> = vec![
            (raw(&[("FileName", "dir")]), NodeRole::Intermediate),
            (
                raw(&[("FileName", "o"), ("OID", &oid_hex)]),
                NodeRole::Version,
            ),
            (
                raw(&[
                    ("FileName", "o"),
                    ("OID", &oid_hex),
                    ("IsDeleteMarker", "true"),
                    ("Owner", "me"),
                    ("Created", "0"),
                ]),
                NodeRole::DeleteMarker,
            ),
            (
                raw(&[("FileName", "o"), ("UploadId", "u1"), ("Created", "0")]),
                NodeRole::UploadRoot,
            ),
            (
                raw(&[("Number", "1"), ("OID", &oid_hex)]),
                NodeRole::Part,
            ),
            (raw(&[("IsTag", "true")]), NodeRole::TagSidecar),
            (raw(&[("IsLock", "true")]), NodeRole::LockSidecar),
            (
                raw(&[("FileName", "bucket-settings"), ("Versioning", "Enabled")]),
                NodeRole::SystemSingleton,
            ),
        ];
        for (raw_node, expected) in cases {
            let node = TreeNode::from_raw(&raw_node).unwrap();
            assert_eq!(node.role(), expected, "meta: {:?}", raw_node.meta);
        }
    }

    #[test]
    fn version_meta_round_trip() {
        let version = ObjectVersion {
            id: 0,
            oid: Oid::new([3; 32]),
            timestamp: 0,
            size: 17,
            etag: "etag-3".to_string(),
            file_path: "a/b".to_string(),
            is_unversioned: true,
            delete_marker: None,
        };
        let meta = meta_from_version(&version, "b");
        let node = TreeNode::from_raw(&raw(
            &meta
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
        ))
        .unwrap();
        let decoded = decode_version("a/b", &node).unwrap();
        assert_eq!(decoded.oid, version.oid);
        assert_eq!(decoded.size, version.size);
        assert_eq!(decoded.etag, version.etag);
        assert!(decoded.is_unversioned);
        assert!(decoded.delete_marker.is_none());
    }

    #[test]
    fn delete_marker_meta_round_trip() {
        let created = from_unix_millis(1_700_000_000_000);
        let version = ObjectVersion {
            id: 0,
            oid: Oid::new([9; 32]),
            timestamp: 0,
            size: 0,
            etag: String::new(),
            file_path: "a".to_string(),
            is_unversioned: false,
            delete_marker: Some(DeleteMarkerInfo {
                created,
                owner: "owner-1".to_string(),
            }),
        };
        let meta = meta_from_version(&version, "a");
        let node = TreeNode::from_raw(&raw(
            &meta
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
        ))
        .unwrap();
        let decoded = decode_version("a", &node).unwrap();
        let marker = decoded.delete_marker.expect("delete marker");
        assert_eq!(marker.owner, "owner-1");
        assert_eq!(marker.created, created);
    }

    #[test]
    fn multipart_decode_requires_upload_id() {
        let node = TreeNode::from_raw(&raw(&[("FileName", "k")])).unwrap();
        assert!(matches!(
            decode_multipart("k", &node),
            Err(TreeError::NotMultipartNode)
        ));
    }

    #[test]
    fn multipart_decode_keeps_user_meta() {
        let node = TreeNode::from_raw(&raw(&[
            ("FileName", "k"),
            ("UploadId", "u1"),
            ("Owner", "me"),
            ("Created", "1000"),
            ("X-Custom", "v"),
        ]))
        .unwrap();
        let info = decode_multipart("dir/k", &node).unwrap();
        assert_eq!(info.upload_id, "u1");
        assert_eq!(info.key, "dir/k");
        assert_eq!(info.meta.get("X-Custom").map(String::as_str), Some("v"));
        assert!(!info.meta.contains_key("UploadId"));
    }

    #[test]
    fn part_decode_requires_positive_number() {
        let no_number = TreeNode::from_raw(&raw(&[("FileName", "k")])).unwrap();
        assert!(matches!(decode_part(&no_number), Err(TreeError::NotPartNode)));

        let zero = TreeNode::from_raw(&raw(&[("Number", "0")])).unwrap();
        assert!(matches!(decode_part(&zero), Err(TreeError::NotPartNode)));

        let bad = TreeNode::from_raw(&raw(&[("Number", "one")])).unwrap();
        assert!(matches!(
            decode_part(&bad),
            Err(TreeError::InvalidMeta { field: "Number", .. })
        ));
    }

    #[test]
    fn tags_round_trip_through_prefix() {
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        tags.insert("team".to_string(), "storage".to_string());

        let meta = meta_from_tags(&tags);
        assert_eq!(meta.get("User-Tag-env").map(String::as_str), Some("prod"));

        let node = TreeNode::from_raw(&raw(
            &meta
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
        ))
        .unwrap();
        assert_eq!(node.role(), NodeRole::TagSidecar);
        assert_eq!(decode_tags(&node), tags);
    }

    #[test]
    fn lock_meta_round_trip() {
        let lock = LockInfo {
            id: 0,
            legal_hold: Some(Oid::new([4; 32])),
            retention: Some(Retention {
                oid: Oid::new([5; 32]),
                until_date: "2030-01-01T00:00:00Z".to_string(),
                is_compliance: true,
            }),
        };
        let meta = meta_from_lock(&lock);
        let node = TreeNode::from_raw(&raw(
            &meta
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
        ))
        .unwrap();
        assert_eq!(node.role(), NodeRole::LockSidecar);
        let decoded = decode_lock(&node).unwrap();
        assert_eq!(decoded.legal_hold, lock.legal_hold);
        assert_eq!(decoded.retention, lock.retention);
    }

    #[test]
    fn lock_decode_rejects_bad_oid() {
        let node = TreeNode::from_raw(&raw(&[
            ("IsLock", "true"),
            ("LegalHoldOID", "nope"),
        ]))
        .unwrap();
        assert!(matches!(
            decode_lock(&node),
            Err(TreeError::InvalidMeta { field: "LegalHoldOID", .. })
        ));
    }

    #[test]
    fn lock_configuration_round_trip() {
        let full = ObjectLockConfiguration {
            object_lock_enabled: "Enabled".to_string(),
            rule: Some(ObjectLockRule {
                default_retention: DefaultRetention {
                    days: 10,
                    mode: "COMPLIANCE".to_string(),
                    years: 0,
                },
            }),
        };
        assert_eq!(encode_lock_configuration(Some(&full)), "Enabled,10,COMPLIANCE,0");
        assert_eq!(parse_lock_configuration("Enabled,10,COMPLIANCE,0").unwrap(), full);

        let bare = ObjectLockConfiguration {
            object_lock_enabled: "Enabled".to_string(),
            rule: None,
        };
        assert_eq!(encode_lock_configuration(Some(&bare)), "Enabled");
        assert_eq!(parse_lock_configuration("Enabled").unwrap(), bare);

        assert_eq!(encode_lock_configuration(None), "");
        assert_eq!(
            parse_lock_configuration("").unwrap(),
            ObjectLockConfiguration::default()
        );
    }

    #[test]
    fn lock_configuration_rejects_malformed_input() {
        assert!(parse_lock_configuration("Enabled,1").is_err());
        assert!(parse_lock_configuration("Enabled,ten,COMPLIANCE,0").is_err());
        assert!(parse_lock_configuration("Enabled,1,COMPLIANCE,zero").is_err());
        // Empty day and year fields fall back to zero.
        let conf = parse_lock_configuration("Enabled,,GOVERNANCE,").unwrap();
        let rule = conf.rule.expect("rule");
        assert_eq!(rule.default_retention.days, 0);
        assert_eq!(rule.default_retention.years, 0);
    }

    #[test]
    fn settings_decode_defaults_to_unversioned() {
        let node = TreeNode::from_raw(&raw(&[("FileName", "bucket-settings")])).unwrap();
        let settings = decode_settings(&node).unwrap();
        assert_eq!(settings.versioning, Versioning::Unversioned);
        assert!(settings.lock_configuration.is_none());
    }

    #[test]
    fn settings_decode_rejects_unknown_mode() {
        let node =
            TreeNode::from_raw(&raw(&[("Versioning", "Sometimes")])).unwrap();
        assert!(matches!(
            decode_settings(&node),
            Err(TreeError::InvalidMeta { field: "Versioning", .. })
        ));
    }

    #[test]
    fn millis_round_trip() {
        let t = from_unix_millis(123_456_789);
        assert_eq!(unix_millis(t), 123_456_789);
    }
}

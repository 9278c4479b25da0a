//! Domain records projected onto the tree service.
//!
//! These are the S3-level entities the engine encodes into tree nodes and
//! decodes back on read: object versions, multipart uploads and parts,
//! lock state, and bucket-wide settings.  All records are plain structs
//! with public fields; the metadata encoding lives in [`crate::tree::codec`].

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Version id surfaced for objects written in unversioned mode.
pub const UNVERSIONED_OBJECT_VERSION_ID: &str = "null";

// ── Identifiers ─────────────────────────────────────────────────────

/// Identifier of a payload blob in the backing object store.
///
/// Opaque to the tree backend; hex-encoded wherever it crosses the
/// metadata map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Oid([u8; 32]);

impl Oid {
    /// Wrap raw id bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Oid(bytes)
    }

    /// Parse a hex-encoded id. Returns `None` on malformed input.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Oid(bytes))
    }

    /// Hex encoding used in node metadata.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

/// Identifier of the container (bucket) whose trees the engine operates on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContainerId([u8; 32]);

impl ContainerId {
    /// Wrap raw id bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        ContainerId(bytes)
    }

    /// Parse a hex-encoded id. Returns `None` on malformed input.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(ContainerId(bytes))
    }

    /// Raw id bytes, for transports that frame them directly.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", hex::encode(self.0))
    }
}

// ── Object versions ─────────────────────────────────────────────────

/// One version of an object as stored in the `version` tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVersion {
    /// Node id in the tree backend. Zero for records not yet written.
    pub id: u64,
    /// Payload id in the backing object store.
    pub oid: Oid,
    /// Backend-assigned timestamp; orders versions within a name.
    pub timestamp: u64,
    /// Payload size in bytes.
    pub size: i64,
    /// Payload entity tag.
    pub etag: String,
    /// Full object key this version belongs to.
    pub file_path: String,
    /// Whether this version occupies the single unversioned slot.
    pub is_unversioned: bool,
    /// Present when this version is a tombstone.
    pub delete_marker: Option<DeleteMarkerInfo>,
}

impl ObjectVersion {
    /// Version id surfaced to S3 clients: the payload id, or the literal
    /// `null` for unversioned objects.
    pub fn version_id(&self) -> String {
        if self.is_unversioned {
            UNVERSIONED_OBJECT_VERSION_ID.to_string()
        } else {
            self.oid.to_hex()
        }
    }

    /// Whether this version is a delete marker.
    pub fn is_delete_marker(&self) -> bool {
        self.delete_marker.is_some()
    }
}

/// Origin of a delete marker. The tombstone payload is not stored in the
/// object store, so the tree node carries this information itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMarkerInfo {
    /// When the marker was written.
    pub created: SystemTime,
    /// Who wrote it.
    pub owner: String,
}

/// An [`ObjectVersion`] plus its computed position within its name group.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedObjectVersion {
    /// The underlying version record.
    pub version: ObjectVersion,
    /// True for exactly the newest version of each name in a listing.
    pub is_latest: bool,
}

// ── Multipart uploads ───────────────────────────────────────────────

/// An in-progress multipart upload rooted in the `system` tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartUpload {
    /// Node id of the upload root. Zero for records not yet written.
    pub id: u64,
    /// Full object key the upload will complete to.
    pub key: String,
    /// Caller-chosen upload identifier.
    pub upload_id: String,
    /// Initiator of the upload.
    pub owner: String,
    /// When the upload was initiated.
    pub created: SystemTime,
    /// User-defined metadata carried through to the final object.
    pub meta: HashMap<String, String>,
}

/// A single uploaded part, child of a multipart upload root.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// 1-based part number.
    pub number: u32,
    /// Payload id of the part body.
    pub oid: Oid,
    /// Part size in bytes.
    pub size: i64,
    /// Part entity tag.
    pub etag: String,
    /// When the part was uploaded.
    pub created: SystemTime,
}

// ── Locks ───────────────────────────────────────────────────────────

/// Lock state attached to an object version via its lock sidecar node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LockInfo {
    /// Node id of the sidecar. Zero means the sidecar does not exist yet;
    /// a put with a zero id adds a node, a nonzero id moves it in place.
    pub id: u64,
    /// Payload id of the legal-hold lock object, if a legal hold is set.
    pub legal_hold: Option<Oid>,
    /// Retention lock, if set.
    pub retention: Option<Retention>,
}

/// Retention portion of a lock sidecar.
#[derive(Debug, Clone, PartialEq)]
pub struct Retention {
    /// Payload id of the retention lock object.
    pub oid: Oid,
    /// Retain-until date, carried as an opaque string.
    pub until_date: String,
    /// Whether the retention is in compliance mode.
    pub is_compliance: bool,
}

// ── Bucket settings ─────────────────────────────────────────────────

/// Bucket versioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Versioning {
    /// Versioning has never been enabled; writes reuse the single slot.
    #[default]
    Unversioned,
    /// Every write creates a new version.
    Enabled,
    /// Versioning was enabled and later suspended.
    Suspended,
}

impl Versioning {
    /// The literal stored under the `Versioning` metadata key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Versioning::Unversioned => "Unversioned",
            Versioning::Enabled => "Enabled",
            Versioning::Suspended => "Suspended",
        }
    }

    /// Parse the stored literal. Returns `None` for off-vocabulary values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Unversioned" => Some(Versioning::Unversioned),
            "Enabled" => Some(Versioning::Enabled),
            "Suspended" => Some(Versioning::Suspended),
            _ => None,
        }
    }
}

/// Bucket-wide settings singleton stored in the `system` tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BucketSettings {
    /// Versioning mode; absent metadata decodes to `Unversioned`.
    pub versioning: Versioning,
    /// Object lock configuration, if the bucket has one.
    pub lock_configuration: Option<ObjectLockConfiguration>,
}

/// Object lock configuration, serialized as a comma-joined string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectLockConfiguration {
    /// The ObjectLockEnabled literal (usually `Enabled`, may be empty).
    pub object_lock_enabled: String,
    /// Default retention rule, if configured.
    pub rule: Option<ObjectLockRule>,
}

/// Rule portion of an object lock configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLockRule {
    /// Default retention applied to new object versions.
    pub default_retention: DefaultRetention,
}

/// Default retention settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultRetention {
    /// Retention period in days (0 when unset).
    pub days: i64,
    /// Retention mode literal (`GOVERNANCE` or `COMPLIANCE`).
    pub mode: String,
    /// Retention period in years (0 when unset).
    pub years: i64,
}

// ── Listing ─────────────────────────────────────────────────────────

/// Parameters of a ListObjectVersions call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectVersionsParams {
    /// Only keys starting with this prefix are listed.
    pub prefix: String,
    /// Keys containing this delimiter past the prefix collapse into
    /// common prefixes. Empty disables grouping.
    pub delimiter: String,
    /// Cursor: key component of the position to resume from.
    pub key_marker: String,
    /// Cursor: version-id component of the position to resume from.
    pub version_id_marker: String,
    /// Page size.
    pub max_keys: usize,
}

/// Result of a ListObjectVersions call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectVersionsInfo {
    /// Key groups collapsed by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Whether the page was cut at `max_keys`.
    pub is_truncated: bool,
    /// Echoed cursor: the last included item's key (set when truncated).
    pub key_marker: String,
    /// Echoed cursor: the last included item's version id.
    pub version_id_marker: String,
    /// Cursor for the next page: the first dropped item's key.
    pub next_key_marker: String,
    /// Cursor for the next page: the first dropped item's version id.
    pub next_version_id_marker: String,
    /// Live versions, in listing order.
    pub versions: Vec<ExtendedObjectVersion>,
    /// Delete markers, in listing order.
    pub delete_markers: Vec<ExtendedObjectVersion>,
}

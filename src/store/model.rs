//! Record types persisted in the store file.

use serde::{Deserialize, Serialize};

use crate::package::DistKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

/// A package, keyed by its normalized name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    /// Display name as first imported (e.g. the wheel's spelling).
    pub name: String,
    /// Normalized name; unique across the store.
    pub normalized: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Unix timestamp of first import.
    pub created: u64,
}

/// A release of a package, keyed by (package, version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub package_id: PackageId,
    pub version: String,
    /// Repository that supplied this release (`owner/repo`). A release may
    /// only ever be claimed by one repository.
    pub source_repo: String,
    /// Release tag on the hosting side (e.g. `v1.2.0`).
    pub source_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

/// A distribution file belonging to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub release_id: ReleaseId,
    /// Unique within the release.
    pub filename: String,
    pub size: u64,
    /// Hex-encoded SHA-256 digest; immutable once recorded.
    pub sha256: String,
    /// Download URL on the hosting side.
    pub url: String,
    pub kind: DistKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_tag: Option<String>,
}

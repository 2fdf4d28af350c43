//! Durable record store for packages, releases and files.
//!
//! The store is a single JSON file, the source of truth for everything the
//! generator renders. It is loaded fully into memory on open; [`Store::commit`]
//! serializes the whole state to a temp file in the same directory and renames
//! it over the store path, so readers always observe a complete snapshot and a
//! crash never leaves a half-written file behind. A lock file next to the
//! store enforces a single writer at a time.

mod model;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};

pub use model::{FileId, FileRecord, Package, PackageId, Release, ReleaseId};

use crate::package::{DistKind, compare_version_strings, normalize_name};

/// Errors from store operations.
#[derive(Debug)]
pub enum StoreError {
    /// The same package+version is already claimed by a different source
    /// repository. Never auto-resolved; the operator has to rename one side.
    Conflict {
        package: String,
        version: String,
        existing_repo: String,
        claimed_repo: String,
    },
    /// A recorded filename's hash would change. The artifact was modified
    /// without a version bump; installers cache by hash, so this is never
    /// silently overwritten.
    Integrity {
        filename: String,
        recorded: String,
        observed: String,
    },
    /// Another process holds the store write lock.
    Locked(PathBuf),
    /// The store file exists but is not valid JSON.
    Corrupt(PathBuf, serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict { package, version, existing_repo, claimed_repo } => write!(
                f,
                "{} {} is already provided by repository '{}', but '{}' also claims it",
                package, version, existing_repo, claimed_repo
            ),
            StoreError::Integrity { filename, recorded, observed } => write!(
                f,
                "hash of '{}' changed (recorded sha256 {}, observed {}); refusing to overwrite",
                filename, recorded, observed
            ),
            StoreError::Locked(path) => write!(
                f,
                "store is locked by another process ({})",
                path.display()
            ),
            StoreError::Corrupt(path, e) => {
                write!(f, "store file {} is corrupt: {}", path.display(), e)
            }
            StoreError::Io(e) => write!(f, "store I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Corrupt(_, e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// On-disk shape of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    /// Unix timestamp of the last successful commit.
    #[serde(default)]
    last_commit: Option<u64>,
    #[serde(default)]
    packages: Vec<Package>,
    #[serde(default)]
    releases: Vec<Release>,
    #[serde(default)]
    files: Vec<FileRecord>,
}

/// The record store.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    data: StoreData,
    /// Lock file path, held for the lifetime of a writable store.
    lock: Option<PathBuf>,
}

impl Store {
    /// Open the store for writing. Creates an empty store if the file does
    /// not exist. Takes the write lock; fails with [`StoreError::Locked`] if
    /// another process holds it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = Self::acquire_lock(&path)?;
        let data = Self::read_data(&path)?;
        Ok(Self { path, data, lock: Some(lock) })
    }

    /// Open the store read-only (no lock). Commits are rejected.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = Self::read_data(&path)?;
        Ok(Self { path, data, lock: None })
    }

    fn read_data(path: &Path) -> Result<StoreData> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(path.to_path_buf(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store file {} does not exist yet, starting empty", path.display());
                Ok(StoreData::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn acquire_lock(path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let lock = Self::lock_path(path);
        match fs::OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(lock)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::Locked(lock))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state durably: serialize to a temp file in the same
    /// directory, flush, and atomically rename over the store path.
    pub fn commit(&mut self) -> Result<()> {
        if self.lock.is_none() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store was opened read-only",
            )));
        }
        self.data.last_commit = Some(unix_now());
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, &self.data)
            .map_err(|e| StoreError::Io(e.into()))?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        debug!("committed store to {}", self.path.display());
        Ok(())
    }

    // =========================================================================
    // Upserts
    // =========================================================================

    /// Insert a package or return the existing one with the same normalized
    /// name. Never errors on duplicate input; normalization absorbs spelling
    /// differences. A summary refreshes an empty recorded one.
    pub fn upsert_package(&mut self, name: &str, summary: Option<&str>) -> PackageId {
        let normalized = normalize_name(name);
        if let Some(pkg) = self.data.packages.iter_mut().find(|p| p.normalized == normalized) {
            if pkg.summary.is_none() {
                pkg.summary = summary.map(str::to_string);
            }
            return pkg.id;
        }
        let id = PackageId(next_id(self.data.packages.iter().map(|p| p.id.0)));
        self.data.packages.push(Package {
            id,
            name: name.to_string(),
            normalized,
            summary: summary.map(str::to_string),
            created: unix_now(),
        });
        id
    }

    /// Insert a release or return the existing (package, version) one.
    ///
    /// Fails with [`StoreError::Conflict`] if the release already exists but
    /// was imported from a different source repository.
    pub fn upsert_release(
        &mut self,
        package_id: PackageId,
        version: &str,
        source_repo: &str,
        source_tag: &str,
        uploaded_at: Option<&str>,
    ) -> Result<(ReleaseId, bool)> {
        if let Some(rel) = self
            .data
            .releases
            .iter()
            .find(|r| r.package_id == package_id && r.version == version)
        {
            if rel.source_repo != source_repo {
                let package = self
                    .data
                    .packages
                    .iter()
                    .find(|p| p.id == package_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                return Err(StoreError::Conflict {
                    package,
                    version: version.to_string(),
                    existing_repo: rel.source_repo.clone(),
                    claimed_repo: source_repo.to_string(),
                });
            }
            return Ok((rel.id, false));
        }
        let id = ReleaseId(next_id(self.data.releases.iter().map(|r| r.id.0)));
        self.data.releases.push(Release {
            id,
            package_id,
            version: version.to_string(),
            source_repo: source_repo.to_string(),
            source_tag: source_tag.to_string(),
            uploaded_at: uploaded_at.map(str::to_string),
        });
        Ok((id, true))
    }

    /// Insert a file record, idempotent on (release, filename).
    ///
    /// Fails with [`StoreError::Integrity`] if the filename is already
    /// recorded under this release with a different hash.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_file(
        &mut self,
        release_id: ReleaseId,
        filename: &str,
        size: u64,
        sha256: &str,
        url: &str,
        kind: DistKind,
        python_tag: Option<&str>,
    ) -> Result<(FileId, bool)> {
        if let Some(file) = self
            .data
            .files
            .iter()
            .find(|f| f.release_id == release_id && f.filename == filename)
        {
            if !file.sha256.eq_ignore_ascii_case(sha256) {
                return Err(StoreError::Integrity {
                    filename: filename.to_string(),
                    recorded: file.sha256.clone(),
                    observed: sha256.to_string(),
                });
            }
            return Ok((file.id, false));
        }
        let id = FileId(next_id(self.data.files.iter().map(|f| f.id.0)));
        self.data.files.push(FileRecord {
            id,
            release_id,
            filename: filename.to_string(),
            size,
            sha256: sha256.to_ascii_lowercase(),
            url: url.to_string(),
            kind,
            python_tag: python_tag.map(str::to_string),
        });
        Ok((id, true))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All packages, normalized name ascending.
    pub fn list_packages(&self) -> Vec<&Package> {
        let mut packages: Vec<&Package> = self.data.packages.iter().collect();
        packages.sort_by(|a, b| a.normalized.cmp(&b.normalized));
        packages
    }

    /// Releases of a package, version ascending.
    pub fn list_releases(&self, package_id: PackageId) -> Vec<&Release> {
        let mut releases: Vec<&Release> = self
            .data
            .releases
            .iter()
            .filter(|r| r.package_id == package_id)
            .collect();
        releases.sort_by(|a, b| compare_version_strings(&a.version, &b.version));
        releases
    }

    /// Files of a release, filename ascending.
    pub fn list_files(&self, release_id: ReleaseId) -> Vec<&FileRecord> {
        let mut files: Vec<&FileRecord> = self
            .data
            .files
            .iter()
            .filter(|f| f.release_id == release_id)
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        files
    }

    /// Whether a filename is already recorded under a release. The importer
    /// uses this to skip re-downloading known artifacts.
    pub fn file_exists(&self, release_id: ReleaseId, filename: &str) -> bool {
        self.data
            .files
            .iter()
            .any(|f| f.release_id == release_id && f.filename == filename)
    }

    /// Look up a release by package and version.
    pub fn find_release(&self, package_id: PackageId, version: &str) -> Option<&Release> {
        self.data
            .releases
            .iter()
            .find(|r| r.package_id == package_id && r.version == version)
    }

    /// Look up a package by (any spelling of) its name.
    pub fn find_package(&self, name: &str) -> Option<&Package> {
        let normalized = normalize_name(name);
        self.data.packages.iter().find(|p| p.normalized == normalized)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let _ = fs::remove_file(lock);
        }
    }
}

fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().map_or(0, |max| max + 1)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("data.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_upsert_package_idempotent_via_normalization() {
        let (_dir, mut store) = open_temp();
        let a = store.upsert_package("My-Pkg", None);
        let b = store.upsert_package("my_pkg", None);
        assert_eq!(a, b);
        assert_eq!(store.list_packages().len(), 1);
    }

    #[test]
    fn test_upsert_package_refreshes_missing_summary() {
        let (_dir, mut store) = open_temp();
        let id = store.upsert_package("widgets", None);
        store.upsert_package("widgets", Some("A widget library"));
        let pkg = store.list_packages()[0];
        assert_eq!(pkg.id, id);
        assert_eq!(pkg.summary.as_deref(), Some("A widget library"));
    }

    #[test]
    fn test_upsert_release_idempotent() {
        let (_dir, mut store) = open_temp();
        let pkg = store.upsert_package("widgets", None);
        let (rel1, created1) = store
            .upsert_release(pkg, "1.2.0", "acme/widgets", "v1.2.0", None)
            .unwrap();
        let (rel2, created2) = store
            .upsert_release(pkg, "1.2.0", "acme/widgets", "v1.2.0", None)
            .unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(rel1, rel2);
    }

    #[test]
    fn test_upsert_release_conflict_on_other_repo() {
        let (_dir, mut store) = open_temp();
        let pkg = store.upsert_package("widgets", None);
        store
            .upsert_release(pkg, "1.2.0", "acme/widgets", "v1.2.0", None)
            .unwrap();
        let err = store
            .upsert_release(pkg, "1.2.0", "rival/widgets", "v1.2.0", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn test_upsert_file_idempotent_and_integrity() {
        let (_dir, mut store) = open_temp();
        let pkg = store.upsert_package("widgets", None);
        let (rel, _) = store
            .upsert_release(pkg, "1.2.0", "acme/widgets", "v1.2.0", None)
            .unwrap();

        let (f1, created1) = store
            .upsert_file(rel, "widgets-1.2.0-py3-none-any.whl", 42, "aa11", "u", DistKind::BdistWheel, Some("py3"))
            .unwrap();
        let (f2, created2) = store
            .upsert_file(rel, "widgets-1.2.0-py3-none-any.whl", 42, "AA11", "u", DistKind::BdistWheel, Some("py3"))
            .unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(f1, f2);

        let err = store
            .upsert_file(rel, "widgets-1.2.0-py3-none-any.whl", 42, "bb22", "u", DistKind::BdistWheel, Some("py3"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
    }

    #[test]
    fn test_list_releases_version_ascending() {
        let (_dir, mut store) = open_temp();
        let pkg = store.upsert_package("widgets", None);
        for version in ["1.0", "2.0", "1.0a1", "1.0.1"] {
            store
                .upsert_release(pkg, version, "acme/widgets", version, None)
                .unwrap();
        }
        let versions: Vec<&str> = store
            .list_releases(pkg)
            .iter()
            .map(|r| r.version.as_str())
            .collect();
        assert_eq!(versions, ["1.0a1", "1.0", "1.0.1", "2.0"]);
    }

    #[test]
    fn test_list_packages_normalized_order() {
        let (_dir, mut store) = open_temp();
        store.upsert_package("Zeta", None);
        store.upsert_package("alpha_pkg", None);
        store.upsert_package("Beta.Pkg", None);
        let names: Vec<&str> = store
            .list_packages()
            .iter()
            .map(|p| p.normalized.as_str())
            .collect();
        assert_eq!(names, ["alpha-pkg", "beta-pkg", "zeta"]);
    }

    #[test]
    fn test_commit_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        {
            let mut store = Store::open(&path).unwrap();
            let pkg = store.upsert_package("widgets", Some("summary"));
            let (rel, _) = store
                .upsert_release(pkg, "1.2.0", "acme/widgets", "v1.2.0", Some("2024-01-01T00:00:00Z"))
                .unwrap();
            store
                .upsert_file(rel, "widgets-1.2.0.tar.gz", 7, "cafe", "u", DistKind::Sdist, None)
                .unwrap();
            store.commit().unwrap();
        }
        let store = Store::open(&path).unwrap();
        let packages = store.list_packages();
        assert_eq!(packages.len(), 1);
        let releases = store.list_releases(packages[0].id);
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].source_tag, "v1.2.0");
        let files = store.list_files(releases[0].id);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].sha256, "cafe");
    }

    #[test]
    fn test_uncommitted_changes_are_not_durable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        {
            let mut store = Store::open(&path).unwrap();
            store.upsert_package("widgets", None);
            store.commit().unwrap();
            store.upsert_package("gadgets", None);
            // Dropped without commit.
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_packages().len(), 1);
    }

    #[test]
    fn test_write_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let _writer = Store::open(&path).unwrap();
        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)));
        // Readers are not blocked.
        assert!(Store::open_read_only(&path).is_ok());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        drop(Store::open(&path).unwrap());
        assert!(Store::open(&path).is_ok());
    }

    #[test]
    fn test_read_only_commit_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        drop(Store::open(&path).unwrap());
        let mut store = Store::open_read_only(&path).unwrap();
        assert!(store.commit().is_err());
    }

    #[test]
    fn test_corrupt_store_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Store::open_read_only(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(..)));
    }
}

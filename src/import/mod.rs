//! Importing release artifacts from the hosting API into the store.
//!
//! One run walks the given repositories, registers every recognized
//! distribution asset, and downloads the artifact bytes into the index's
//! `files/` directory. Re-running against unchanged repositories is cheap:
//! already-recorded files are detected by filename and never re-downloaded.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};

use crate::github::{GitHubRepo, ListReleases, Release};
use crate::http::HttpClient;
use crate::package::{ParsedDist, parse_dist_filename};
use crate::store::{PackageId, Store};

/// Non-fatal events collected during an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportWarning {
    /// A repository identifier that did not parse as `owner/repo`.
    InvalidRepository { input: String, cause: String },
    /// The hosting API failed for one repository; the rest still ran.
    RepositoryFailed { repo: String, cause: String },
    /// An asset that matches neither the wheel nor the sdist grammar.
    UnrecognizedAsset {
        repo: String,
        tag: String,
        filename: String,
    },
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportWarning::InvalidRepository { input, cause } => {
                write!(f, "invalid repository '{}': {}", input, cause)
            }
            ImportWarning::RepositoryFailed { repo, cause } => {
                write!(f, "repository {} failed: {}", repo, cause)
            }
            ImportWarning::UnrecognizedAsset { repo, tag, filename } => write!(
                f,
                "{} {}: asset '{}' is not a recognized distribution, skipped",
                repo, tag, filename
            ),
        }
    }
}

/// Outcome summary of an import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub packages_created: usize,
    pub packages_existing: usize,
    pub releases_created: usize,
    pub releases_existing: usize,
    pub files_created: usize,
    pub files_existing: usize,
    pub assets_skipped: usize,
    pub warnings: Vec<ImportWarning>,
}

impl ImportReport {
    /// True when nothing new was recorded.
    pub fn is_noop(&self) -> bool {
        self.packages_created == 0 && self.releases_created == 0 && self.files_created == 0
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "packages: {} new, {} already present; releases: {} new, {} already present; files: {} new, {} already present; assets skipped: {}",
            self.packages_created,
            self.packages_existing,
            self.releases_created,
            self.releases_existing,
            self.files_created,
            self.files_existing,
            self.assets_skipped,
        )?;
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        Ok(())
    }
}

/// Pulls releases from the hosting API into the store.
pub struct Importer<'a, L: ListReleases> {
    api: &'a L,
    http: &'a HttpClient,
    store: &'a mut Store,
    files_dir: PathBuf,
}

impl<'a, L: ListReleases> Importer<'a, L> {
    pub fn new(
        api: &'a L,
        http: &'a HttpClient,
        store: &'a mut Store,
        files_dir: PathBuf,
    ) -> Self {
        Self { api, http, store, files_dir }
    }

    /// Import every repository in turn.
    ///
    /// API failures are isolated per repository and reported as warnings.
    /// Store conflicts (two repositories claiming the same package+version)
    /// and integrity violations (a recorded hash changing) abort the whole
    /// run; everything committed before the offending release stays durable.
    pub async fn run(&mut self, repositories: &[String]) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        // Packages touched during this run, so each counts once in the
        // report no matter how many of its assets show up.
        let mut seen_packages: HashSet<PackageId> = HashSet::new();

        for input in repositories {
            let repo: GitHubRepo = match input.parse() {
                Ok(repo) => repo,
                Err(e) => {
                    warn!("Skipping repository '{}': {}", input, e);
                    report.warnings.push(ImportWarning::InvalidRepository {
                        input: input.clone(),
                        cause: e.to_string(),
                    });
                    continue;
                }
            };
            if let Err(e) = self
                .import_repository(&repo, &mut report, &mut seen_packages)
                .await
            {
                // Store-level conflicts are fatal; network failures are not.
                if e.downcast_ref::<crate::store::StoreError>().is_some() {
                    return Err(e);
                }
                warn!("Repository {} failed: {:#}", repo, e);
                report.warnings.push(ImportWarning::RepositoryFailed {
                    repo: repo.to_string(),
                    cause: format!("{:#}", e),
                });
            }
        }

        Ok(report)
    }

    async fn import_repository(
        &mut self,
        repo: &GitHubRepo,
        report: &mut ImportReport,
        seen_packages: &mut HashSet<PackageId>,
    ) -> Result<()> {
        info!("Importing releases of {}", repo);

        let releases = self.api.get_releases(repo).await?;
        if releases.is_empty() {
            info!("{} has no releases", repo);
            return Ok(());
        }
        // The repository description doubles as the package summary; losing
        // it is not worth failing the whole repository for.
        let summary = match self.api.get_repo_info(repo).await {
            Ok(info) => info.description,
            Err(e) => {
                warn!("Could not fetch metadata for {}: {:#}", repo, e);
                None
            }
        };

        for release in releases {
            self.import_release(repo, &release, summary.as_deref(), report, seen_packages)
                .await?;
        }
        Ok(())
    }

    async fn import_release(
        &mut self,
        repo: &GitHubRepo,
        release: &Release,
        summary: Option<&str>,
        report: &mut ImportReport,
        seen_packages: &mut HashSet<PackageId>,
    ) -> Result<()> {
        // Releases touched by this call, so a wheel+sdist pair counts its
        // release once.
        let mut seen: HashSet<(PackageId, String)> = HashSet::new();

        for asset in &release.assets {
            let ParsedDist::Recognized { name, version, kind, python_tag } =
                parse_dist_filename(&asset.name)
            else {
                report.assets_skipped += 1;
                report.warnings.push(ImportWarning::UnrecognizedAsset {
                    repo: repo.to_string(),
                    tag: release.tag_name.clone(),
                    filename: asset.name.clone(),
                });
                continue;
            };

            let package_new = self.store.find_package(&name).is_none();
            let package_id = self.store.upsert_package(&name, summary);
            if seen_packages.insert(package_id) {
                if package_new {
                    report.packages_created += 1;
                } else {
                    report.packages_existing += 1;
                }
            }

            let (release_id, release_created) = self.store.upsert_release(
                package_id,
                &version,
                &repo.to_string(),
                &release.tag_name,
                release.published_at.as_deref(),
            )?;
            if seen.insert((package_id, version.clone())) {
                if release_created {
                    report.releases_created += 1;
                } else {
                    report.releases_existing += 1;
                }
            }

            if self.store.file_exists(release_id, &asset.name) {
                info!("{} is already recorded, not downloading", asset.name);
                report.files_existing += 1;
                continue;
            }

            let dest = self.files_dir.join(&asset.name);
            let download = self.http.download_to(&asset.browser_download_url, &dest).await?;
            if download.size != asset.size {
                warn!(
                    "{}: API reported {} bytes but download was {} bytes",
                    asset.name, asset.size, download.size
                );
            }

            self.store.upsert_file(
                release_id,
                &asset.name,
                download.size,
                &download.sha256,
                &asset.browser_download_url,
                kind,
                python_tag.as_deref(),
            )?;
            // Per-file durability: an interrupted run keeps everything
            // recorded so far and resumes without re-downloading it.
            self.store.commit()?;
            report.files_created += 1;
            info!("Recorded {} ({} bytes)", asset.name, download.size);
        }

        Ok(())
    }
}

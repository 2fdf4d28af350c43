//! API response types for the hosting API.

use serde::Deserialize;

/// Repository metadata; the description becomes the package summary.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RepoInfo {
    pub description: Option<String>,
    pub homepage: Option<String>,
}

/// A release as listed by the API.
#[derive(Deserialize, Debug, Clone)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A downloadable asset attached to a release.
#[derive(Deserialize, Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub size: u64,
    pub browser_download_url: String,
}

//! GitHub-compatible hosting API boundary.

mod client;
mod repo;
mod types;

pub use client::{GitHub, ListReleases};
#[cfg(test)]
pub use client::MockListReleases;
pub use repo::GitHubRepo;
pub use types::{Asset, Release, RepoInfo};

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

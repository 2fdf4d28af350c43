//! Release listing against the hosting API.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::http::HttpClient;

use super::repo::GitHubRepo;
use super::types::{Release, RepoInfo};

/// Read access to a repository's metadata and release listing.
///
/// Kept as a trait so the importer can be exercised against a mock in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListReleases: Send + Sync {
    async fn get_repo_info(&self, repo: &GitHubRepo) -> Result<RepoInfo>;
    async fn get_releases(&self, repo: &GitHubRepo) -> Result<Vec<Release>>;
}

/// Hosting API client.
pub struct GitHub {
    http_client: HttpClient,
    api_url: String,
}

impl GitHub {
    pub fn new(http_client: HttpClient, api_url: impl Into<String>) -> Self {
        Self {
            http_client,
            api_url: api_url.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl ListReleases for GitHub {
    #[tracing::instrument(skip(self, repo))]
    async fn get_repo_info(&self, repo: &GitHubRepo) -> Result<RepoInfo> {
        let url = format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.repo);
        debug!("Fetching repo info from {}...", url);
        self.http_client.get_json(&url).await
    }

    /// Enumerate every release, exhausting pagination. Pages are fetched
    /// until the API returns an empty page; there is no page cap, since a
    /// cap would silently truncate the index.
    #[tracing::instrument(skip(self, repo))]
    async fn get_releases(&self, repo: &GitHubRepo) -> Result<Vec<Release>> {
        let url = format!("{}/repos/{}/{}/releases", self.api_url, repo.owner, repo.repo);
        let mut releases = Vec::new();
        let mut page: u32 = 1;

        loop {
            debug!("Fetching releases page {} from {}...", page, url);
            let parsed: Vec<Release> = self
                .http_client
                .get_json_with_query(&url, &[("per_page", "100"), ("page", &page.to_string())])
                .await?;

            if parsed.is_empty() {
                break;
            }

            releases.extend(parsed);
            page += 1;
        }

        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    fn github(url: &str) -> GitHub {
        GitHub::new(HttpClient::new(Client::new(), None), url)
    }

    #[tokio::test]
    async fn test_get_repo_info() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/repos/acme/widgets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"description": "A widget library", "homepage": null}"#)
            .create_async()
            .await;

        let repo: GitHubRepo = "acme/widgets".parse().unwrap();
        let info = github(&server.url()).get_repo_info(&repo).await.unwrap();

        mock.assert_async().await;
        assert_eq!(info.description.as_deref(), Some("A widget library"));
    }

    #[tokio::test]
    async fn test_get_releases_exhausts_pagination() {
        let mut server = mockito::Server::new_async().await;

        let page1 = server
            .mock("GET", "/repos/acme/widgets/releases?per_page=100&page=1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"tag_name": "v1.0.0", "name": null}]"#)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/repos/acme/widgets/releases?per_page=100&page=2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"tag_name": "v2.0.0", "name": null}]"#)
            .create_async()
            .await;
        let page3 = server
            .mock("GET", "/repos/acme/widgets/releases?per_page=100&page=3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let repo: GitHubRepo = "acme/widgets".parse().unwrap();
        let releases = github(&server.url()).get_releases(&repo).await.unwrap();

        page1.assert_async().await;
        page2.assert_async().await;
        page3.assert_async().await;
        let tags: Vec<&str> = releases.iter().map(|r| r.tag_name.as_str()).collect();
        assert_eq!(tags, ["v1.0.0", "v2.0.0"]);
    }

    #[tokio::test]
    async fn test_get_releases_not_found() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/repos/acme/missing/releases?per_page=100&page=1")
            .with_status(404)
            .create_async()
            .await;

        let repo: GitHubRepo = "acme/missing".parse().unwrap();
        let result = github(&server.url()).get_releases(&repo).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }
}

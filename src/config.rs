//! Site configuration.
//!
//! A small JSON settings file read once per invocation. Everything the
//! importer and generator need to know about the hosted index lives here;
//! credentials and repository lists come from the CLI instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;
use serde::{Deserialize, Serialize};

/// Immutable per-invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Root directory of the hosted index (pages and artifacts land here).
    pub path: PathBuf,
    /// Store filename, relative to `path`.
    #[serde(default = "default_database")]
    pub database: String,
    /// Public base URL of the index, e.g. `https://user.github.io/index/`.
    pub url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_image_url")]
    pub image_url: String,
}

fn default_database() -> String {
    "data.json".to_string()
}

fn default_title() -> String {
    "Personal Python Package Index".to_string()
}

fn default_description() -> String {
    "Welcome to your private Python package index!".to_string()
}

fn default_image_url() -> String {
    "https://pypi.org/static/images/logo-small.95de8436.svg".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            database: default_database(),
            url: String::new(),
            title: default_title(),
            description: default_description(),
            image_url: default_image_url(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// If the file does not exist, a default one is written and an error is
    /// returned asking the operator to fill in the site URL.
    pub fn load(file: &Path) -> Result<Self> {
        if !file.exists() {
            info!("Writing default config to {}", file.display());
            if let Some(parent) = file.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let default = serde_json::to_string_pretty(&Settings::default())?;
            fs::write(file, default)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            bail!(
                "No config found; wrote defaults to {}. Set 'url' to your index's base URL and re-run.",
                file.display()
            );
        }

        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read config {}", file.display()))?;
        let mut settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Malformed config {}", file.display()))?;

        if settings.url.is_empty() {
            bail!(
                "Config {} does not set 'url'; the generated pages need the index's base URL",
                file.display()
            );
        }
        if !settings.url.ends_with('/') {
            settings.url.push('/');
        }
        Ok(settings)
    }

    /// Path of the store file.
    pub fn store_path(&self) -> PathBuf {
        self.path.join(&self.database)
    }

    /// Directory holding the downloaded artifacts.
    pub fn files_dir(&self) -> PathBuf {
        self.path.join("files")
    }
}

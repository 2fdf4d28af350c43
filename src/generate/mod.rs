//! Rendering the store into the static index tree.
//!
//! The generator is read-only with respect to the store and deterministic
//! with respect to its contents: the same store renders to byte-identical
//! pages. The whole tree is staged in a temp directory inside the output
//! root and swapped into place only once every page has rendered, so a
//! failed run leaves the previous tree untouched.
//!
//! Produced layout:
//!
//! ```text
//! <root>/index.html                     homepage
//! <root>/simple/index.html              simple index of packages
//! <root>/simple/<name>/index.html       simple per-package file listing
//! <root>/pypi/<name>/json/index.json    per-package JSON metadata
//! ```
//!
//! The `files/` directory next to these is owned by the importer and never
//! touched here.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::json;

use crate::config::Settings;
use crate::store::{Package, Store};

const HOMEPAGE_TEMPLATE: &str = include_str!("../../templates/homepage.html");
const SIMPLE_TEMPLATE: &str = include_str!("../../templates/simple.html");
const STYLE: &str = include_str!("../../templates/style.css");

/// Errors that abort a generation run.
#[derive(Debug)]
pub enum GenerationError {
    /// The output root or staging area could not be created or written.
    Unwritable(PathBuf, std::io::Error),
    /// A file record is missing a field the index cannot be built without.
    MissingData { filename: String, field: &'static str },
    Io(std::io::Error),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Unwritable(path, e) => {
                write!(f, "output location {} is not writable: {}", path.display(), e)
            }
            GenerationError::MissingData { filename, field } => write!(
                f,
                "file record '{}' has no {}; re-import it before generating",
                filename, field
            ),
            GenerationError::Io(e) => write!(f, "generation I/O error: {}", e),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerationError::Unwritable(_, e) | GenerationError::Io(e) => Some(e),
            GenerationError::MissingData { .. } => None,
        }
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(e: std::io::Error) -> Self {
        GenerationError::Io(e)
    }
}

/// Summary of a generation run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub packages: usize,
    pub pages: usize,
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generated {} pages for {} packages", self.pages, self.packages)
    }
}

/// Render the store into the index tree under `settings.path`.
pub fn generate(store: &Store, settings: &Settings) -> Result<GenerationReport, GenerationError> {
    let root = &settings.path;
    fs::create_dir_all(root).map_err(|e| GenerationError::Unwritable(root.clone(), e))?;
    let staging = tempfile::TempDir::with_prefix_in(".generate-", root)
        .map_err(|e| GenerationError::Unwritable(root.clone(), e))?;

    let mut report = GenerationReport::default();
    let packages = store.list_packages();
    report.packages = packages.len();

    write_page(
        &staging.path().join("index.html"),
        &render_homepage(store, &packages, settings),
        &mut report,
    )?;
    write_page(
        &staging.path().join("simple/index.html"),
        &render_simple_index(&packages, settings),
        &mut report,
    )?;
    for &package in &packages {
        write_page(
            &staging.path().join("simple").join(&package.normalized).join("index.html"),
            &render_simple_package(store, package, settings)?,
            &mut report,
        )?;
        write_page(
            &staging.path().join("pypi").join(&package.normalized).join("json/index.json"),
            &render_json_package(store, package, settings)?,
            &mut report,
        )?;
    }

    // Everything rendered; swap the tree into place. The old entries are
    // parked inside the staging directory before any new one is renamed in,
    // so a rename failure mid-swap leaves every previous page recoverable
    // on disk; the parked entries vanish with the staging directory once
    // the swap is complete.
    for entry in ["index.html", "simple", "pypi"] {
        let live = root.join(entry);
        if live.exists() {
            let parked = staging.path().join(format!("previous-{}", entry));
            fs::rename(&live, &parked)
                .map_err(|e| GenerationError::Unwritable(live.clone(), e))?;
        }
    }
    for entry in ["index.html", "simple", "pypi"] {
        let staged = staging.path().join(entry);
        let live = root.join(entry);
        if staged.exists() {
            fs::rename(&staged, &live)
                .map_err(|e| GenerationError::Unwritable(live.clone(), e))?;
        }
    }

    info!("{}", report);
    Ok(report)
}

fn write_page(path: &Path, content: &str, report: &mut GenerationReport) -> Result<(), GenerationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("Rendering {}", path.display());
    fs::write(path, content)?;
    report.pages += 1;
    Ok(())
}

fn render_homepage(store: &Store, packages: &[&Package], settings: &Settings) -> String {
    let mut listing = String::new();
    for package in packages {
        let releases = store.list_releases(package.id);
        // Releases are version-ascending, so the last one is the latest.
        let latest = releases.last().map(|r| r.version.as_str()).unwrap_or("");
        let summary = package.summary.as_deref().unwrap_or("");
        listing.push_str(&format!(
            "\n            <a class=\"card\" href=\"{url}simple/{normalized}/\">\
             \n                {name}<span class=\"version\">{version}</span>\
             \n                <span class=\"description\">{summary}</span>\
             \n            </a>",
            url = settings.url,
            normalized = escape_html(&package.normalized),
            name = escape_html(&package.name),
            version = escape_html(latest),
            summary = escape_html(summary),
        ));
    }

    let style = STYLE
        .lines()
        .map(|line| format!("\n        {}", line))
        .collect::<String>();

    substitute(
        HOMEPAGE_TEMPLATE,
        &[
            ("%%TITLE%%", &escape_html(&settings.title)),
            ("%%DESCRIPTION%%", &escape_html(&settings.description)),
            ("%%IMAGE%%", &settings.image_url),
            ("%%URL%%", &settings.url),
            ("%%STYLE%%", &style),
            ("%%PACKAGES%%", &listing),
        ],
    )
}

fn render_simple_index(packages: &[&Package], settings: &Settings) -> String {
    let mut listing = String::new();
    for package in packages {
        listing.push_str(&format!(
            "\n    <a href=\"{}/\">{}</a><br/>",
            escape_html(&package.normalized),
            escape_html(&package.name),
        ));
    }
    substitute(
        SIMPLE_TEMPLATE,
        &[
            ("%%TITLE%%", &escape_html(&settings.title)),
            ("%%IMAGE%%", &settings.image_url),
            ("%%LIST%%", &listing),
        ],
    )
}

fn render_simple_package(
    store: &Store,
    package: &Package,
    settings: &Settings,
) -> Result<String, GenerationError> {
    let mut listing = String::new();
    for release in store.list_releases(package.id) {
        for file in store.list_files(release.id) {
            if file.sha256.is_empty() {
                return Err(GenerationError::MissingData {
                    filename: file.filename.clone(),
                    field: "content hash",
                });
            }
            // The fragment carries the digest so installers can verify
            // integrity straight from the link.
            listing.push_str(&format!(
                "\n    <a href=\"{url}files/{filename}#sha256={digest}\">{filename}</a><br/>",
                url = settings.url,
                filename = escape_html(&file.filename),
                digest = file.sha256,
            ));
        }
    }
    Ok(substitute(
        SIMPLE_TEMPLATE,
        &[
            ("%%TITLE%%", &escape_html(&package.name)),
            ("%%IMAGE%%", &settings.image_url),
            ("%%LIST%%", &listing),
        ],
    ))
}

fn render_json_package(
    store: &Store,
    package: &Package,
    settings: &Settings,
) -> Result<String, GenerationError> {
    let mut releases_json = serde_json::Map::new();
    let releases = store.list_releases(package.id);
    for release in &releases {
        let mut files = Vec::new();
        for file in store.list_files(release.id) {
            if file.sha256.is_empty() {
                return Err(GenerationError::MissingData {
                    filename: file.filename.clone(),
                    field: "content hash",
                });
            }
            files.push(json!({
                "filename": file.filename,
                "python_version": file.python_tag,
                "packagetype": file.kind.as_str(),
                "size": file.size,
                "digests": { "sha256": file.sha256 },
                "upload_time": release.uploaded_at,
                "url": format!("{}files/{}", settings.url, file.filename),
                "yanked": false,
            }));
        }
        releases_json.insert(release.version.clone(), serde_json::Value::Array(files));
    }

    let latest = releases.last();
    let urls = latest
        .and_then(|r| releases_json.get(&r.version).cloned())
        .unwrap_or(serde_json::Value::Array(Vec::new()));
    let document = json!({
        "info": {
            "name": package.name,
            "version": latest.map(|r| r.version.as_str()).unwrap_or(""),
            "summary": package.summary,
            "package_url": format!("{}simple/{}/", settings.url, package.normalized),
        },
        "releases": releases_json,
        "urls": urls,
    });

    // Map keys serialize sorted, so the output is deterministic.
    serde_json::to_string_pretty(&document)
        .map_err(|e| GenerationError::Io(e.into()))
}

fn substitute(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut page = template.to_string();
    for (placeholder, value) in replacements {
        page = page.replace(placeholder, value);
    }
    page
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::DistKind;
    use crate::store::Store;
    use tempfile::tempdir;

    fn settings(root: &Path) -> Settings {
        Settings {
            path: root.to_path_buf(),
            url: "https://example.com/index/".to_string(),
            ..Settings::default()
        }
    }

    fn populated_store(dir: &Path) -> Store {
        let mut store = Store::open(dir.join("data.json")).unwrap();
        let pkg = store.upsert_package("widgets", Some("A widget library"));
        let (r1, _) = store
            .upsert_release(pkg, "1.0", "acme/widgets", "v1.0", Some("2024-01-01T00:00:00Z"))
            .unwrap();
        store
            .upsert_file(r1, "widgets-1.0.tar.gz", 10, "aaaa", "u", DistKind::Sdist, None)
            .unwrap();
        let (r2, _) = store
            .upsert_release(pkg, "1.2.0", "acme/widgets", "v1.2.0", Some("2024-02-01T00:00:00Z"))
            .unwrap();
        store
            .upsert_file(
                r2,
                "widgets-1.2.0-py3-none-any.whl",
                20,
                "bbbb",
                "u",
                DistKind::BdistWheel,
                Some("py3"),
            )
            .unwrap();
        store.commit().unwrap();
        store
    }

    #[test]
    fn test_generate_produces_expected_tree() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = populated_store(dir.path());

        let report = generate(&store, &settings(&out)).unwrap();
        assert_eq!(report.packages, 1);
        assert_eq!(report.pages, 4);

        assert!(out.join("index.html").exists());
        assert!(out.join("simple/index.html").exists());
        assert!(out.join("simple/widgets/index.html").exists());
        assert!(out.join("pypi/widgets/json/index.json").exists());
        // No staging leftovers.
        let leftovers: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".generate-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_simple_pages_link_with_hash_fragment() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = populated_store(dir.path());
        generate(&store, &settings(&out)).unwrap();

        let root_page = fs::read_to_string(out.join("simple/index.html")).unwrap();
        assert!(root_page.contains("<a href=\"widgets/\">widgets</a>"));

        let package_page = fs::read_to_string(out.join("simple/widgets/index.html")).unwrap();
        assert!(package_page.contains(
            "https://example.com/index/files/widgets-1.0.tar.gz#sha256=aaaa"
        ));
        assert!(package_page.contains(
            "https://example.com/index/files/widgets-1.2.0-py3-none-any.whl#sha256=bbbb"
        ));
        // Version-ascending: 1.0 before 1.2.0.
        let first = package_page.find("widgets-1.0.tar.gz").unwrap();
        let second = package_page.find("widgets-1.2.0-py3-none-any.whl").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_names_are_html_escaped() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let mut store = Store::open(dir.path().join("data.json")).unwrap();
        // '&' survives normalization, so it must be escaped in markup.
        let pkg = store.upsert_package("a&b", Some("ampers & sons"));
        let (rel, _) = store
            .upsert_release(pkg, "1.0", "acme/ampersand", "v1.0", None)
            .unwrap();
        store
            .upsert_file(rel, "a&b-1.0.tar.gz", 3, "cccc", "u", DistKind::Sdist, None)
            .unwrap();

        generate(&store, &settings(&out)).unwrap();

        let simple_index = fs::read_to_string(out.join("simple/index.html")).unwrap();
        assert!(simple_index.contains("<a href=\"a&amp;b/\">a&amp;b</a>"));
        assert!(!simple_index.contains("\"a&b/\""));

        let package_page = fs::read_to_string(out.join("simple/a&b/index.html")).unwrap();
        assert!(package_page.contains("a&amp;b-1.0.tar.gz#sha256=cccc\">a&amp;b-1.0.tar.gz</a>"));

        let homepage = fs::read_to_string(out.join("index.html")).unwrap();
        assert!(homepage.contains("ampers &amp; sons"));
        assert!(!homepage.contains("simple/a&b/"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = populated_store(dir.path());

        generate(&store, &settings(&out)).unwrap();
        let first: Vec<(PathBuf, Vec<u8>)> = read_tree(&out);
        generate(&store, &settings(&out)).unwrap();
        let second = read_tree(&out);
        assert_eq!(first, second);
    }

    fn read_tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut entries = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    entries.push((path.clone(), fs::read(&path).unwrap()));
                }
            }
        }
        entries.sort();
        entries
    }

    #[test]
    fn test_generate_replaces_previous_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = populated_store(dir.path());

        generate(&store, &settings(&out)).unwrap();
        // A stale page from a package that no longer exists.
        fs::create_dir_all(out.join("simple/oldpkg")).unwrap();
        fs::write(out.join("simple/oldpkg/index.html"), "stale").unwrap();

        generate(&store, &settings(&out)).unwrap();
        assert!(!out.join("simple/oldpkg").exists());
        // The parked previous tree went away with the staging directory.
        let leftovers: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("previous-") || name.starts_with(".generate-"))
            .collect();
        assert!(leftovers.is_empty(), "unexpected leftovers: {:?}", leftovers);
    }

    #[test]
    fn test_generate_preserves_files_dir() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = populated_store(dir.path());

        fs::create_dir_all(out.join("files")).unwrap();
        fs::write(out.join("files/widgets-1.0.tar.gz"), "artifact").unwrap();

        generate(&store, &settings(&out)).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("files/widgets-1.0.tar.gz")).unwrap(),
            "artifact"
        );
    }

    #[test]
    fn test_missing_hash_aborts_and_keeps_previous_tree() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = populated_store(dir.path());
        generate(&store, &settings(&out)).unwrap();
        let before = read_tree(&out);

        // A second store with a record missing its digest.
        let mut broken = Store::open(dir.path().join("broken.json")).unwrap();
        let pkg = broken.upsert_package("gadgets", None);
        let (rel, _) = broken
            .upsert_release(pkg, "1.0", "acme/gadgets", "v1.0", None)
            .unwrap();
        broken
            .upsert_file(rel, "gadgets-1.0.tar.gz", 5, "", "u", DistKind::Sdist, None)
            .unwrap();

        let err = generate(&broken, &settings(&out)).unwrap_err();
        assert!(matches!(err, GenerationError::MissingData { .. }));
        assert_eq!(read_tree(&out), before);
    }

    #[test]
    fn test_empty_store_generates_empty_index() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let store = Store::open(dir.path().join("data.json")).unwrap();

        let report = generate(&store, &settings(&out)).unwrap();
        assert_eq!(report.packages, 0);
        assert_eq!(report.pages, 2);
        assert!(out.join("simple/index.html").exists());
    }
}

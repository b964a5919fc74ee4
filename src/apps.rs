//! App directory handling.
//!
//! An app location holds one directory per app; each app keeps its
//! configuration under `default/` and `local/` and its access metadata under
//! `metadata/`.

use anyhow::{Context, Result, bail};
use stanzakit::{ConfigDocument, Tier, conf};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Saved search configuration file name.
pub const SAVEDSEARCHES: &str = "savedsearches.conf";

/// Directory name of the copy made before disabling.
pub const DISABLED_COPY: &str = "apps_ss_disabled";

/// One app directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub name: String,
    pub path: PathBuf,
}

impl App {
    /// Path of a conf file in a tier.
    pub fn conf_path(&self, tier: Tier, file: &str) -> PathBuf {
        self.path.join(tier.dir_name()).join(file)
    }

    /// Path of a tier's metadata file (`default.meta` or `local.meta`).
    pub fn meta_path(&self, tier: Tier) -> PathBuf {
        self.path
            .join("metadata")
            .join(format!("{}.meta", tier.dir_name()))
    }

    /// Parse a tier's conf file. A missing file is `None`; an unreadable one
    /// is logged and also `None`.
    pub fn read_conf(&self, tier: Tier, file: &str) -> Option<ConfigDocument> {
        read_document(&self.conf_path(tier, file))
    }

    /// Parse a tier's metadata file, same rules as [`App::read_conf`].
    pub fn read_meta(&self, tier: Tier) -> Option<ConfigDocument> {
        read_document(&self.meta_path(tier))
    }
}

/// Parse a document, logging its diagnostics.
pub fn read_document(path: &Path) -> Option<ConfigDocument> {
    if !path.is_file() {
        return None;
    }
    match conf::parse_file(path) {
        Ok(doc) => {
            log_diagnostics(path, &doc);
            Some(doc)
        }
        Err(e) => {
            log::error!("Error parsing {}: {e}", path.display());
            None
        }
    }
}

/// Log what the parser recovered from while reading `path`.
pub fn log_diagnostics(path: &Path, doc: &ConfigDocument) {
    for diagnostic in &doc.diagnostics {
        let error = stanzakit::Error::from(diagnostic);
        let category = error.category();
        if category.is_line_local() {
            log::warn!("{}: {error}, {}", path.display(), category.recovery());
        } else {
            log::warn!("{}: {error}", path.display());
        }
    }
}

/// Apps under a location, sorted by name.
pub fn list(location: &Path) -> Result<Vec<App>> {
    let entries = fs::read_dir(location)
        .with_context(|| format!("Cannot read app location {}", location.display()))?;

    let mut apps: Vec<App> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| App {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
        })
        .collect();
    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}

/// Sibling directory receiving the disabled copy. The location is resolved
/// first so `.` or a trailing `..` still name a real sibling.
pub fn disabled_copy_path(location: &Path) -> Result<PathBuf> {
    let location = fs::canonicalize(location)
        .with_context(|| format!("Cannot resolve app location {}", location.display()))?;
    if location.parent().is_none() {
        bail!("App location {} has no parent directory", location.display());
    }
    Ok(location.with_file_name(DISABLED_COPY))
}

/// Copy a directory tree. Returns the number of files copied. A target
/// inside the source is refused.
pub fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let source =
        fs::canonicalize(from).with_context(|| format!("Cannot resolve {}", from.display()))?;
    let target = match fs::canonicalize(to) {
        Ok(target) => target,
        Err(_) => std::path::absolute(to)
            .with_context(|| format!("Cannot resolve {}", to.display()))?,
    };
    if target.starts_with(&source) {
        bail!(
            "Refusing to copy {} into itself ({})",
            source.display(),
            target.display()
        );
    }

    let mut copied = 0;
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .context("Walked outside of the source tree")?;
        let target = to.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            copied += 1;
        } else {
            log::debug!("Skipping {}", entry.path().display());
        }
    }
    Ok(copied)
}

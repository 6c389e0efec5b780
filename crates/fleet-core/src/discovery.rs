// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Config directory discovery.
//!
//! Walks the directory tree and collects every file whose name ends in
//! `.conf`. Directories named `..something` are skipped: Kubernetes mounts
//! ConfigMaps through `..data` and timestamped `..2024_01_01_...` directories,
//! and walking those would load every file twice.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::DiscoveryError;

const CONFIG_SUFFIX: &str = ".conf";

/// Path to one candidate configuration document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigFile(PathBuf);

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    #[must_use]
    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for ConfigFile {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Returns every configuration candidate under `dir`, in lexical order.
///
/// Fails only when `dir` itself is missing, not a directory, or unreadable.
/// Nested entries that cannot be read are logged and skipped.
///
/// # Arguments
///
/// * `dir` - Root of the agent configuration tree, usually `conf.d`.
///
/// # Errors
///
/// Returns [`DiscoveryError::NotFound`], [`DiscoveryError::NotADirectory`] or
/// [`DiscoveryError::Unreadable`] for problems with `dir` itself.
///
/// # Examples
///
/// ```
/// use fleet_core::walk_directory;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("mem.conf"), "").unwrap();
/// std::fs::write(dir.path().join("cpu.conf"), "").unwrap();
/// std::fs::write(dir.path().join("notes.txt"), "").unwrap();
///
/// let files = walk_directory(dir.path()).unwrap();
/// let names: Vec<_> = files
///     .iter()
///     .map(|f| f.path().file_name().unwrap().to_string_lossy().into_owned())
///     .collect();
/// assert_eq!(names, ["cpu.conf", "mem.conf"]);
/// ```
pub fn walk_directory(dir: &Path) -> Result<Vec<ConfigFile>, DiscoveryError> {
    let metadata = fs::metadata(dir).map_err(|e| root_error(dir, e))?;
    if !metadata.is_dir() {
        return Err(DiscoveryError::NotADirectory(dir.to_path_buf()));
    }
    // metadata succeeds on directories we cannot list
    fs::read_dir(dir).map_err(|e| root_error(dir, e))?;

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_configmap_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in config directory: {e}");
                continue;
            }
        };
        if entry.file_type().is_dir() || !is_candidate(entry.file_name().to_string_lossy().as_ref())
        {
            continue;
        }
        debug!("discovered config file {}", entry.path().display());
        files.push(ConfigFile::new(entry.into_path()));
    }

    Ok(files)
}

fn root_error(dir: &Path, e: io::Error) -> DiscoveryError {
    if e.kind() == io::ErrorKind::NotFound {
        DiscoveryError::NotFound(dir.to_path_buf())
    } else {
        DiscoveryError::Unreadable {
            path: dir.to_path_buf(),
            source: e,
        }
    }
}

fn is_configmap_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with("..")
}

fn is_candidate(name: &str) -> bool {
    name.len() > CONFIG_SUFFIX.len() && name.ends_with(CONFIG_SUFFIX)
}

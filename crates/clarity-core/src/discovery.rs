//! Input selection for batch jobs.
//!
//! Builds the ordered, deduplicated input list handed to a [`JobRequest`].
//! Every output lands in one folder under the input's file name, so a
//! selection never holds two inputs with the same file name.
//!
//! [`JobRequest`]: crate::jobs::JobRequest

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::DEFAULT_EXTENSIONS;

/// Ordered set of input files picked by the user.
#[derive(Debug, Clone)]
pub struct InputSelection {
    extensions: Vec<String>,
    paths: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    /// File name -> the input that claimed it
    names: HashMap<OsString, PathBuf>,
}

impl Default for InputSelection {
    fn default() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS)
    }
}

impl InputSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection that accepts the given extensions when scanning folders.
    pub fn with_extensions<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            paths: Vec::new(),
            seen: HashSet::new(),
            names: HashMap::new(),
        }
    }

    /// Add explicitly chosen files. Returns how many were new.
    ///
    /// A file whose name is already taken by an earlier input is skipped
    /// with a warning, since both would be written to the same output.
    pub fn add_files<I, P>(&mut self, files: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut added = 0;
        for file in files {
            if self.push(file.into()) {
                added += 1;
            }
        }
        added
    }

    /// Add every supported file under `dir`. Returns how many were new.
    ///
    /// Entries are visited in name order. Unreadable subdirectories are
    /// skipped with a warning; an unreadable `dir` is an error.
    pub fn add_folder(&mut self, dir: &Path, recursive: bool) -> Result<usize> {
        let mut found = Vec::new();
        self.scan(dir, recursive, &mut found)
            .with_context(|| format!("Failed to read folder {}", dir.display()))?;

        tracing::debug!("Found {} image files in {}", found.len(), dir.display());
        Ok(self.add_files(found))
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|e| self.extensions.contains(&e))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.seen.clear();
        self.names.clear();
    }

    pub fn into_inputs(self) -> Vec<PathBuf> {
        self.paths
    }

    fn push(&mut self, path: PathBuf) -> bool {
        if self.seen.contains(&path) {
            return false;
        }

        if let Some(name) = path.file_name() {
            if let Some(first) = self.names.get(name) {
                tracing::warn!(
                    "Skipping {}: its output would replace {}",
                    path.display(),
                    first.display()
                );
                return false;
            }
            self.names.insert(name.to_os_string(), path.clone());
        }

        self.seen.insert(path.clone());
        self.paths.push(path);
        true
    }

    fn scan(&self, dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        for path in entries {
            if path.is_file() {
                if self.is_supported(&path) {
                    found.push(path);
                }
            } else if path.is_dir() && recursive {
                if let Err(e) = self.scan(&path, recursive, found) {
                    tracing::warn!("Failed to read directory {}: {}", path.display(), e);
                }
            }
        }

        Ok(())
    }
}

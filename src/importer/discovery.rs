//! Source file discovery: include roots, exclude patterns, extension filter.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::registry::ServerSpec;

/// Compiled exclude patterns. A pattern ending in `$` is a regex; anything
/// else excludes by plain path prefix.
#[derive(Debug, Default)]
pub struct ExcludeMatcher {
    prefixes: Vec<String>,
    regexes: Vec<Regex>,
}

impl ExcludeMatcher {
    /// Compiles the patterns; a malformed regex is a setup error.
    pub fn new(patterns: &[String]) -> Result<Self, ImportError> {
        let mut matcher = Self::default();
        for pattern in patterns {
            if pattern.ends_with('$') {
                let regex = Regex::new(pattern).map_err(|e| {
                    ImportError::Setup(format!("invalid exclude pattern '{pattern}': {e}"))
                })?;
                matcher.regexes.push(regex);
            } else {
                matcher.prefixes.push(pattern.clone());
            }
        }
        Ok(matcher)
    }

    /// Whether the path (absolute or project-relative form) is excluded.
    pub fn matches(&self, absolute: &Path, relative: &Path) -> bool {
        let abs = absolute.to_string_lossy();
        let rel = relative.to_string_lossy();
        self.prefixes
            .iter()
            .any(|p| abs.starts_with(p.as_str()) || rel.starts_with(p.as_str()))
            || self.regexes.iter().any(|r| r.is_match(&abs) || r.is_match(&rel))
    }
}

/// Enumerates the files to import: everything under the include roots whose
/// extension the chosen server claims, minus the excludes. Sorted and
/// de-duplicated so overlapping include roots stay harmless.
pub fn discover_files(
    config: &ImportConfig,
    spec: &ServerSpec,
) -> Result<Vec<PathBuf>, ImportError> {
    let excludes = ExcludeMatcher::new(&config.exclude_paths)?;
    let mut files = BTreeSet::new();

    for root in config.effective_includes() {
        if !root.is_dir() {
            return Err(ImportError::Setup(format!(
                "include directory {} does not exist",
                root.display()
            )));
        }
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !spec.claims(path) {
                continue;
            }
            let relative = path
                .strip_prefix(&config.project_root)
                .unwrap_or(path)
                .to_path_buf();
            if excludes.matches(path, &relative) {
                continue;
            }
            files.insert(path.to_path_buf());
        }
    }

    Ok(files.into_iter().collect())
}

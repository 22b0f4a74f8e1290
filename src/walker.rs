use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};

use crate::error::{Error, Result};

/// Files smaller than this many bytes carry too little text to compare and
/// are not discovered.
pub const MIN_SIZE: u64 = 16;

/// A discovered document file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the walked root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Which files [`discover_files`] reports.
#[derive(Debug, Clone)]
pub struct Filter {
    glob: Option<GlobMatcher>,
    min_size: u64,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            glob: None,
            min_size: MIN_SIZE,
        }
    }
}

impl Filter {
    /// Only report files whose relative path matches `pattern`.
    pub fn with_glob(mut self, pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Config(format!("invalid glob pattern: {e}"))
        })?;
        self.glob = Some(glob.compile_matcher());
        Ok(self)
    }

    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    fn accepts(&self, relative_path: &Path, size: u64) -> bool {
        size >= self.min_size
            && self
                .glob
                .as_ref()
                .is_none_or(|glob| glob.is_match(relative_path))
    }
}

/// Recursively walk a directory and discover document files.
///
/// Skips hidden files/directories (names starting with `.`) and files
/// rejected by `filter`. Results are sorted by relative path.
pub fn discover_files(
    root: &Path,
    filter: &Filter,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, filter, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    filter: &Filter,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files and directories.
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &entry.path(), filter, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = entry.path().canonicalize() else {
                tracing::debug!(
                    path = %entry.path().display(),
                    "Skipping broken symlink"
                );
                continue;
            };
            // Directory links are not followed (cycle prevention).
            if resolved.is_file()
                && let Some(df) =
                    make_discovered(root, &entry.path(), &resolved, filter)?
            {
                results.push(df);
            }
        } else if file_type.is_file() {
            let abs = entry.path().canonicalize()?;
            if let Some(df) = make_discovered(root, &entry.path(), &abs, filter)?
            {
                results.push(df);
            }
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
    filter: &Filter,
) -> Result<Option<DiscoveredFile>> {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    let size = std::fs::metadata(absolute_path)?.len();
    if !filter.accepts(&relative_path, size) {
        tracing::trace!(path = %relative_path.display(), size, "Filtered out");
        return Ok(None);
    }

    Ok(Some(DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
        size,
    }))
}

//! Directory scanner for discovering candidate workbook files

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Prefix Office uses for the lock file it keeps next to an open workbook
pub const LOCK_FILE_PREFIX: &str = "~$";

/// Extension matched when no filter is configured
pub const DEFAULT_EXTENSION: &str = "xlsx";

/// Lazily walks a root directory and yields candidate input files.
///
/// Entries are visited in file-name order so the sequence is reproducible.
/// Unreadable directory entries are logged and skipped.
pub struct FileEnumerator {
    walker: walkdir::IntoIter,
    extensions: Vec<String>,
    exclude: Option<PathBuf>,
}

impl FileEnumerator {
    /// Start a scan of `root`.
    ///
    /// Fails with [`Error::NotFound`] when `root` is not an existing directory.
    pub fn new<P: AsRef<Path>>(root: P, recurse: bool, extensions: &[String]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::NotFound(root.to_path_buf()));
        }

        let mut walk = WalkDir::new(root).follow_links(true).sort_by_file_name();
        if !recurse {
            walk = walk.max_depth(1);
        }

        let extensions = if extensions.is_empty() {
            vec![DEFAULT_EXTENSION.to_string()]
        } else {
            extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect()
        };

        Ok(Self {
            walker: walk.into_iter(),
            extensions,
            exclude: None,
        })
    }

    /// Skip one specific path (typically the output workbook)
    pub fn excluding(mut self, path: Option<PathBuf>) -> Self {
        self.exclude = path.map(|p| p.canonicalize().unwrap_or(p));
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if is_lock_file(name) {
            return false;
        }
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|want| *want == ext)
            });
        if !matches_ext {
            return false;
        }
        match &self.exclude {
            Some(excluded) => {
                let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
                resolved != *excluded
            }
            None => true,
        }
    }
}

impl Iterator for FileEnumerator {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.accepts(entry.path()) {
                return Some(entry.into_path());
            }
        }
    }
}

/// Whether a file name is an editor lock/temp file
pub fn is_lock_file(file_name: &str) -> bool {
    file_name.starts_with(LOCK_FILE_PREFIX)
}

/// Collect all candidate files under `root`
pub fn scan_directory<P: AsRef<Path>>(
    root: P,
    recurse: bool,
    extensions: &[String],
) -> Result<Vec<PathBuf>> {
    Ok(FileEnumerator::new(root, recurse, extensions)?.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_lock_file_detection() {
        assert!(is_lock_file("~$report.xlsx"));
        assert!(!is_lock_file("report.xlsx"));
        assert!(!is_lock_file("$report.xlsx"));
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let err = scan_directory("/definitely/not/here", false, &[]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_filters_and_orders_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.xlsx"));
        touch(&dir.path().join("a.XLSX"));
        touch(&dir.path().join("~$a.xlsx"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/c.xlsx"));

        let files = scan_directory(dir.path(), false, &[]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XLSX", "b.xlsx"]);

        let recursive = scan_directory(dir.path(), true, &[]).unwrap();
        assert_eq!(recursive.len(), 3);
    }

    #[test]
    fn test_custom_extensions_and_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.csv"));
        touch(&dir.path().join("b.xlsx"));
        touch(&dir.path().join("merged.xlsx"));

        let exts = vec![".csv".to_string(), "xlsx".to_string()];
        let files: Vec<_> = FileEnumerator::new(dir.path(), false, &exts)
            .unwrap()
            .excluding(Some(dir.path().join("merged.xlsx")))
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !p.ends_with("merged.xlsx")));
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_directory(dir.path(), true, &[]).unwrap().is_empty());
    }
}

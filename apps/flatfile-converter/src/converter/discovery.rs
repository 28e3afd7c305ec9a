//! Channel file discovery.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConvertError, Result};

/// List the channel files in `source_dir`, sorted by name.
///
/// Only regular files are returned. With a non-empty `extensions` list, a
/// file is kept when its last extension matches one entry
/// (case-insensitive); so `a.csv.gz` matches `gz`. Hidden files are
/// skipped.
pub fn discover_channel_files(source_dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(source_dir).map_err(|e| ConvertError::io(source_dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::io(source_dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| ConvertError::io(&path, e))?;
        if !file_type.is_file() {
            continue;
        }
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if hidden || !matches_extension(&path, extensions) {
            continue;
        }
        files.push(path);
    }
    files.sort();

    debug!(source_dir = %source_dir.display(), files = files.len(), "Discovered channel files");
    Ok(files)
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy();
        extensions
            .iter()
            .any(|wanted| ext.eq_ignore_ascii_case(wanted.trim_start_matches('.')))
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_discovery_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["c.csv", "a.csv.gz", "b.CSV", "notes.txt", ".hidden.csv"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("sub.csv")).unwrap();

        let files = discover_channel_files(dir.path(), &["csv".to_string(), ".gz".to_string()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.csv.gz", "b.CSV", "c.csv"]);
    }

    #[test]
    fn test_no_extension_filter_keeps_everything() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.txt"), "").unwrap();
        fs::write(dir.path().join("y"), "").unwrap();

        assert_eq!(discover_channel_files(dir.path(), &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_directory() {
        let err = discover_channel_files(Path::new("/nonexistent/raw"), &[]).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}

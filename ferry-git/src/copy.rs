//! Override-on-conflict recursive copy
//!
//! Places the selected subset of the source checkout into the target
//! checkout. Conflicts are never merged: an identical-path file or
//! directory at the destination is deleted first, then the source entry
//! is copied whole. With no patterns configured the entire source tree
//! is copied (the git metadata directory excluded).

use std::fs;
use std::path::{Path, PathBuf};

use ferry_core::domain::config::CopyMode;
use ferry_core::error::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("source path not found: {0}")]
    SourceMissing(PathBuf),

    #[error("entry escapes the repository root: {0}")]
    PathEscape(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<CopyError> for PipelineError {
    fn from(err: CopyError) -> Self {
        match err {
            CopyError::SourceMissing(path) => {
                PipelineError::NotFound(format!("source path not found: {}", path.display()))
            }
            CopyError::PathEscape(entry) => {
                PipelineError::Validation(format!("entry escapes the repository root: {}", entry))
            }
            io @ CopyError::Io { .. } => PipelineError::Integration(io.to_string()),
        }
    }
}

/// Counters reported back into the run result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files_copied: u64,
    pub folders_copied: u64,
}

impl CopyStats {
    pub fn absorb(&mut self, other: CopyStats) {
        self.files_copied += other.files_copied;
        self.folders_copied += other.folders_copied;
    }
}

/// Selects the entries the copy step operates on. `None` means the whole
/// source tree.
pub fn select_entries(mode: CopyMode, files: &[String], folders: &[String]) -> Option<Vec<String>> {
    let entries: Vec<String> = match mode {
        CopyMode::Files => files.to_vec(),
        CopyMode::Folders => folders.to_vec(),
        CopyMode::Mixed => files.iter().chain(folders.iter()).cloned().collect(),
    };
    if entries.is_empty() { None } else { Some(entries) }
}

/// Resolves an input that may be absolute or repository-relative.
pub fn resolve_path(root: &Path, input: &str) -> PathBuf {
    let path = Path::new(input);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Copies one configured entry (file or whole directory tree), deleting
/// any identical-path destination first.
///
/// With `preserve_structure` the entry keeps its repository-relative path
/// under `dest_root`; otherwise it lands flat under `dest_root` by name.
pub fn copy_entry(
    source_root: &Path,
    dest_root: &Path,
    entry: &str,
    preserve_structure: bool,
) -> Result<CopyStats, CopyError> {
    if Path::new(entry)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(CopyError::PathEscape(entry.to_string()));
    }

    let src = resolve_path(source_root, entry);
    if !src.exists() {
        return Err(CopyError::SourceMissing(src));
    }

    let relative = if preserve_structure {
        src.strip_prefix(source_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| name_of(&src))
    } else {
        name_of(&src)
    };
    let dest = dest_root.join(relative);

    remove_existing(&dest)?;

    if src.is_dir() {
        copy_tree(&src, &dest, false)
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::copy(&src, &dest).map_err(|e| io_err(&dest, e))?;
        Ok(CopyStats {
            files_copied: 1,
            folders_copied: 0,
        })
    }
}

/// Recursively copies `src` into `dest`, overriding conflicting entries
/// in place. `skip_git` excludes `.git` directories, used for whole-tree
/// copies where the destination is itself a checkout.
pub fn copy_tree(src: &Path, dest: &Path, skip_git: bool) -> Result<CopyStats, CopyError> {
    if !src.is_dir() {
        return Err(CopyError::SourceMissing(src.to_path_buf()));
    }

    let mut stats = CopyStats::default();
    if !dest.is_dir() {
        // A file standing where the directory goes is a conflict.
        remove_existing(dest)?;
        fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
        stats.folders_copied += 1;
    }

    for child in fs::read_dir(src).map_err(|e| io_err(src, e))? {
        let child = child.map_err(|e| io_err(src, e))?;
        let name = child.file_name();
        if skip_git && name == ".git" {
            continue;
        }

        let child_src = child.path();
        let child_dest = dest.join(&name);
        let file_type = child.file_type().map_err(|e| io_err(&child_src, e))?;

        if file_type.is_dir() {
            if child_dest.exists() && !child_dest.is_dir() {
                remove_existing(&child_dest)?;
            }
            stats.absorb(copy_tree(&child_src, &child_dest, skip_git)?);
        } else {
            if child_dest.is_dir() {
                remove_existing(&child_dest)?;
            }
            fs::copy(&child_src, &child_dest).map_err(|e| io_err(&child_dest, e))?;
            stats.files_copied += 1;
        }
    }

    Ok(stats)
}

fn name_of(path: &Path) -> PathBuf {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
}

fn remove_existing(dest: &Path) -> Result<(), CopyError> {
    if dest.is_dir() {
        fs::remove_dir_all(dest).map_err(|e| io_err(dest, e))?;
    } else if dest.exists() {
        fs::remove_file(dest).map_err(|e| io_err(dest, e))?;
    }
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> CopyError {
    CopyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        fs::read_to_string(root.join(rel)).unwrap()
    }

    #[test]
    fn test_select_entries_modes() {
        let files = vec!["a.txt".to_string()];
        let folders = vec!["docs".to_string()];

        assert_eq!(
            select_entries(CopyMode::Files, &files, &folders),
            Some(vec!["a.txt".to_string()])
        );
        assert_eq!(
            select_entries(CopyMode::Folders, &files, &folders),
            Some(vec!["docs".to_string()])
        );
        assert_eq!(
            select_entries(CopyMode::Mixed, &files, &folders),
            Some(vec!["a.txt".to_string(), "docs".to_string()])
        );
        // No patterns at all means whole-tree copy.
        assert_eq!(select_entries(CopyMode::Files, &[], &[]), None);
    }

    #[test]
    fn test_copy_file_preserving_relative_path() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "a.txt", "alpha");
        write(src.path(), "sub/b.txt", "beta");

        let mut stats = CopyStats::default();
        stats.absorb(copy_entry(src.path(), dest.path(), "a.txt", true).unwrap());
        stats.absorb(copy_entry(src.path(), dest.path(), "sub/b.txt", true).unwrap());

        assert_eq!(stats.files_copied, 2);
        assert_eq!(read(dest.path(), "a.txt"), "alpha");
        assert_eq!(read(dest.path(), "sub/b.txt"), "beta");
    }

    #[test]
    fn test_copy_file_flattened_when_structure_not_preserved() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "sub/deep/c.txt", "gamma");

        copy_entry(src.path(), dest.path(), "sub/deep/c.txt", false).unwrap();

        assert_eq!(read(dest.path(), "c.txt"), "gamma");
        assert!(!dest.path().join("sub").exists());
    }

    #[test]
    fn test_existing_destination_file_is_replaced_not_merged() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "a.txt", "new contents");
        write(dest.path(), "a.txt", "old contents that are longer");

        copy_entry(src.path(), dest.path(), "a.txt", true).unwrap();

        assert_eq!(read(dest.path(), "a.txt"), "new contents");
    }

    #[test]
    fn test_directory_replaces_conflicting_destination_dir() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "docs/new.md", "new");
        write(dest.path(), "docs/stale.md", "stale");

        let stats = copy_entry(src.path(), dest.path(), "docs", true).unwrap();

        assert_eq!(stats.files_copied, 1);
        assert_eq!(read(dest.path(), "docs/new.md"), "new");
        // The old directory was deleted first, not merged into.
        assert!(!dest.path().join("docs/stale.md").exists());
    }

    #[test]
    fn test_file_over_directory_conflict() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "thing", "now a file");
        write(dest.path(), "thing/nested.txt", "was a dir");

        copy_entry(src.path(), dest.path(), "thing", true).unwrap();

        assert_eq!(read(dest.path(), "thing"), "now a file");
    }

    #[test]
    fn test_whole_tree_copy_skips_git_dir() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "a.txt", "a");
        write(src.path(), "sub/b.txt", "b");
        write(src.path(), ".git/HEAD", "ref: refs/heads/main");

        let stats = copy_tree(src.path(), dest.path(), true).unwrap();

        assert_eq!(stats.files_copied, 2);
        assert_eq!(read(dest.path(), "sub/b.txt"), "b");
        assert!(!dest.path().join(".git").exists());
    }

    #[test]
    fn test_missing_source_entry_errors() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        let err = copy_entry(src.path(), dest.path(), "absent.txt", true).unwrap_err();
        assert!(matches!(err, CopyError::SourceMissing(_)));
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        let err = copy_entry(src.path(), dest.path(), "../outside.txt", true).unwrap_err();
        assert!(matches!(err, CopyError::PathEscape(_)));
    }

    #[test]
    fn test_absolute_entry_resolved_as_is() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "abs.txt", "absolute");
        let abs = src.path().join("abs.txt");

        copy_entry(src.path(), dest.path(), abs.to_str().unwrap(), true).unwrap();

        assert_eq!(read(dest.path(), "abs.txt"), "absolute");
    }
}

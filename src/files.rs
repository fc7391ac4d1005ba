//! File Storage - the door to disk for views and the cache
//!
//! Views, compiled artifacts, temporary evaluation programs and cache sidecars
//! all go through [`Files`]. The configuration file is the one exception: it is
//! read directly, before any storage is set up.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Permission class for written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Shared runtime files (0666)
    #[default]
    Runtime,
    /// Files nobody but the owner rewrites (0644)
    Readonly,
}

impl FileMode {
    pub fn bits(self) -> u32 {
        match self {
            FileMode::Runtime => 0o666,
            FileMode::Readonly => 0o644,
        }
    }
}

pub trait Files: Send + Sync {
    fn write(
        &self,
        path: &Path,
        content: &str,
        mode: FileMode,
        ensure_directory: bool,
    ) -> Result<(), StorageError>;

    fn read(&self, path: &Path) -> Result<String, StorageError>;

    /// Deleting a file that does not exist is an error.
    fn delete(&self, path: &Path) -> Result<(), StorageError>;

    fn exists(&self, path: &Path) -> bool;

    /// Every file under `directory`, recursively, in sorted order.
    fn list_files(&self, directory: &Path) -> Result<Vec<PathBuf>, StorageError>;

    fn relative_path(&self, path: &Path, base: &Path) -> String {
        path.strip_prefix(base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Local filesystem storage
#[derive(Debug, Clone, Default)]
pub struct LocalFiles;

impl LocalFiles {
    pub fn new() -> Self {
        Self
    }

    fn collect(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StorageError> {
        for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
            let entry = entry.map_err(|e| StorageError::io(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl Files for LocalFiles {
    fn write(
        &self,
        path: &Path,
        content: &str,
        mode: FileMode,
        ensure_directory: bool,
    ) -> Result<(), StorageError> {
        if ensure_directory {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }

        fs::write(path, content).map_err(|e| StorageError::io(path, e))?;
        set_mode(path, mode)
    }

    fn read(&self, path: &Path) -> Result<String, StorageError> {
        fs::read_to_string(path).map_err(|e| StorageError::io(path, e))
    }

    fn delete(&self, path: &Path) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|e| StorageError::io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_files(&self, directory: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut files = vec![];
        self.collect(directory, &mut files)?;
        files.sort();
        Ok(files)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode.bits()))
        .map_err(|e| StorageError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.txt");
        let files = LocalFiles::new();

        files.write(&path, "hello", FileMode::Runtime, true).unwrap();
        assert_eq!(files.read(&path).unwrap(), "hello");
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFiles::new().delete(&dir.path().join("gone")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_list_files_recursive_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let files = LocalFiles::new();
        files.write(&dir.path().join("b.txt"), "", FileMode::Runtime, true).unwrap();
        files.write(&dir.path().join("a/c.txt"), "", FileMode::Runtime, true).unwrap();

        let listed: Vec<_> = files
            .list_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| files.relative_path(p, dir.path()))
            .collect();
        assert_eq!(listed, vec!["a/c.txt", "b.txt"]);
    }
}

//! Template Sources - what gets compiled

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{StorageError, ViewError};
use crate::files::Files;
use crate::hashing::sha256_hex;

/// Immutable template text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub name: String,
    pub path: Option<PathBuf>,
    pub content: String,
}

impl TemplateSource {
    pub fn from_string(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            content: content.into(),
        }
    }

    /// SHA-256 of the content. Changes whenever the template text changes.
    pub fn fingerprint(&self) -> String {
        sha256_hex(self.content.as_bytes())
    }
}

/// Loads templates from the views directory through the file collaborator.
pub struct TemplateLoader {
    directory: PathBuf,
    extension: String,
    files: Arc<dyn Files>,
}

impl TemplateLoader {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>, files: Arc<dyn Files>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
            files,
        }
    }

    /// `admin/users` -> `<directory>/admin/users.<extension>`
    pub fn path_for(&self, view: &str) -> Result<PathBuf, ViewError> {
        let relative = Path::new(view);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if view.is_empty() || escapes {
            return Err(ViewError::ViewNotFound(view.to_string()));
        }
        Ok(self.directory.join(format!("{}.{}", view, self.extension)))
    }

    pub fn load(&self, view: &str) -> Result<TemplateSource, ViewError> {
        let path = self.path_for(view)?;
        let content = self.files.read(&path).map_err(|e| match e {
            StorageError::NotFound(_) => ViewError::ViewNotFound(view.to_string()),
            other => ViewError::Storage(other),
        })?;

        Ok(TemplateSource {
            name: view.to_string(),
            path: Some(path),
            content,
        })
    }

    /// Names of every view under the directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, ViewError> {
        if !self.files.exists(&self.directory) {
            return Ok(vec![]);
        }

        let suffix = format!(".{}", self.extension);
        let views = self
            .files
            .list_files(&self.directory)?
            .iter()
            .map(|p| self.files.relative_path(p, &self.directory))
            .filter_map(|rel| rel.strip_suffix(&suffix).map(str::to_string))
            .collect();
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{FileMode, LocalFiles};

    fn loader(dir: &Path) -> TemplateLoader {
        TemplateLoader::new(dir, "tpl", Arc::new(LocalFiles::new()))
    }

    #[test]
    fn test_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let files = LocalFiles::new();
        files.write(&dir.path().join("home.tpl"), "<p>home</p>", FileMode::Runtime, true).unwrap();
        files.write(&dir.path().join("admin/users.tpl"), "users", FileMode::Runtime, true).unwrap();
        files.write(&dir.path().join("notes.txt"), "skip", FileMode::Runtime, true).unwrap();

        let loader = loader(dir.path());
        let home = loader.load("home").unwrap();
        assert_eq!(home.content, "<p>home</p>");
        assert_eq!(loader.list().unwrap(), vec!["admin/users", "home"]);
    }

    #[test]
    fn test_missing_view() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader(dir.path()).load("nope").unwrap_err();
        assert!(matches!(err, ViewError::ViewNotFound(_)));
    }

    #[test]
    fn test_escaping_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(loader(dir.path()).path_for("../secret").is_err());
        assert!(loader(dir.path()).path_for("/etc/passwd").is_err());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = TemplateSource::from_string("a", "x");
        let b = TemplateSource::from_string("b", "x");
        let c = TemplateSource::from_string("a", "y");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}

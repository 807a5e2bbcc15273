//! Fragment library sources.
//!
//! The bundler never touches the filesystem itself: `includes` entries are
//! looked up by name through a [`FragmentSource`] supplied by the caller.
//! [`FileSystemSource`] serves libraries from one directory (and refuses
//! names that escape it); [`InMemorySource`] serves hosts and tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("fragment library '{0}' not found")]
    NotFound(String),
    #[error("fragment library '{0}' resolves outside the rules directory")]
    Escapes(String),
    #[error("cannot read fragment library '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies fragment library text by include name.
pub trait FragmentSource {
    fn load(&self, name: &str) -> Result<String, SourceError>;
}

/// Serves `<root>/<name>` (with `.json` appended when the name has no
/// extension). Resolved paths must stay inside `root`.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSystemSource { root: root.into() }
    }

    /// Source rooted at the directory containing `rules_file`.
    pub fn beside(rules_file: &Path) -> Self {
        let dir = rules_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        FileSystemSource::new(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FragmentSource for FileSystemSource {
    fn load(&self, name: &str) -> Result<String, SourceError> {
        let io_err = |source: std::io::Error| SourceError::Io {
            name: name.to_string(),
            source,
        };

        let mut relative = PathBuf::from(name);
        if relative.extension().is_none() {
            relative.set_extension("json");
        }
        let sandbox = self.root.canonicalize().map_err(io_err)?;
        // Canonicalize the candidate (fail closed) before the sandbox check
        // so `..` and symlinks cannot step outside the root.
        let candidate = match sandbox.join(&relative).canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(name.to_string()))
            }
            Err(e) => return Err(io_err(e)),
        };
        if !candidate.starts_with(&sandbox) {
            return Err(SourceError::Escapes(name.to_string()));
        }
        std::fs::read_to_string(&candidate).map_err(io_err)
    }
}

/// Libraries held in memory, keyed by include name.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    libraries: HashMap<String, String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.libraries.insert(name.to_string(), text.to_string());
    }
}

impl FragmentSource for InMemorySource {
    fn load(&self, name: &str) -> Result<String, SourceError> {
        self.libraries
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_lookup() {
        let source = InMemorySource::new().with("shared", "{}");
        assert_eq!(source.load("shared").unwrap(), "{}");
        assert!(matches!(source.load("missing"), Err(SourceError::NotFound(n)) if n == "missing"));
    }

    #[test]
    fn filesystem_appends_json_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shared.json"), r#"{"fragments":{}}"#).unwrap();
        let source = FileSystemSource::new(dir.path());
        assert_eq!(source.load("shared").unwrap(), r#"{"fragments":{}}"#);
        assert_eq!(source.load("shared.json").unwrap(), r#"{"fragments":{}}"#);
    }

    #[test]
    fn filesystem_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSystemSource::new(dir.path());
        assert!(matches!(source.load("nope"), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn filesystem_refuses_escaping_names() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("rules");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(outer.path().join("secret.json"), "{}").unwrap();
        let source = FileSystemSource::new(&inner);
        assert!(matches!(source.load("../secret"), Err(SourceError::Escapes(_))));
    }

    #[test]
    fn beside_uses_parent_directory() {
        let source = FileSystemSource::beside(Path::new("rules.json"));
        assert_eq!(source.root(), Path::new("."));
        let source = FileSystemSource::beside(Path::new("conf/rules.json"));
        assert_eq!(source.root(), Path::new("conf"));
    }
}

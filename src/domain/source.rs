//! Source unit providers
//!
//! A provider lists source units and reads each into a [`SourceUnit`]. Files
//! without an `ns` form (`in-ns` fragments pulled in by `load`, scripts) are
//! not namespaces and are skipped; a malformed `ns` form is an error. The
//! directory-backed provider lives in the storage layer; [`MemoryProvider`]
//! serves in-memory sources for embedding and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::decl::{DeclError, NsDecl};
use super::node::{Fingerprint, SourceUnit};
use super::reader::ReadOptions;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to list source units: {0}")]
    List(String),

    #[error("Failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: DeclError,
    },
}

impl SourceError {
    /// Path of the offending unit, if the error concerns one
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceError::List(_) => None,
            SourceError::Io { path, .. } | SourceError::Parse { path, .. } => Some(path),
        }
    }
}

/// Supplies source units to the graph builder
pub trait SourceProvider {
    /// Lists the paths of every source unit
    fn list(&self) -> Result<Vec<PathBuf>, SourceError>;

    /// Reads one source unit: its declaration and fingerprint
    ///
    /// Returns `None` when the file declares no namespace.
    fn read(&self, path: &Path) -> Result<Option<SourceUnit>, SourceError>;

    /// Reads every listed unit, stopping at the first failure
    fn read_all(&self) -> Result<Vec<SourceUnit>, SourceError> {
        let mut paths = self.list()?;
        paths.sort();

        let mut units = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read(&path)? {
                Some(unit) => units.push(unit),
                None => tracing::debug!(path = %path.display(), "no ns declaration, skipping"),
            }
        }
        Ok(units)
    }
}

/// Decodes the `ns` form of `text`; `None` if there is none
pub fn decode_decl(path: &Path, text: &str, opts: &ReadOptions) -> Result<Option<NsDecl>, SourceError> {
    match NsDecl::parse(text, opts) {
        Ok(decl) => Ok(Some(decl)),
        Err(DeclError::MissingNs) => Ok(None),
        Err(source) => Err(SourceError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Provider over in-memory source text
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    sources: BTreeMap<PathBuf, String>,
    options: ReadOptions,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReadOptions) -> Self {
        Self {
            sources: BTreeMap::new(),
            options,
        }
    }

    /// Adds or replaces a source unit
    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }

    /// Removes a source unit, returning true if it existed
    pub fn remove(&mut self, path: impl AsRef<Path>) -> bool {
        self.sources.remove(path.as_ref()).is_some()
    }
}

impl SourceProvider for MemoryProvider {
    fn list(&self) -> Result<Vec<PathBuf>, SourceError> {
        Ok(self.sources.keys().cloned().collect())
    }

    fn read(&self, path: &Path) -> Result<Option<SourceUnit>, SourceError> {
        let text = self.sources.get(path).ok_or_else(|| SourceError::Io {
            path: path.to_path_buf(),
            message: "no such source unit".to_string(),
        })?;

        let Some(decl) = decode_decl(path, text, &self.options)? else {
            return Ok(None);
        };
        Ok(Some(SourceUnit::new(path, decl, Fingerprint::of_content(text.as_bytes()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_provider_reads_units() {
        let mut provider = MemoryProvider::new();
        provider.insert("b.clj", "(ns b (:require a))");
        provider.insert("a.clj", "(ns a)");

        let units = provider.read_all().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].decl.name.as_str(), "a");
        assert_eq!(units[1].decl.requires().len(), 1);
    }

    #[test]
    fn parse_failure_names_path() {
        let mut provider = MemoryProvider::new();
        provider.insert("a.clj", "(ns a)");
        provider.insert("bad.clj", "(ns bad (:require 7))");

        let err = provider.read_all().unwrap_err();
        assert_eq!(err.path(), Some(Path::new("bad.clj")));
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn units_without_ns_are_skipped() {
        let mut provider = MemoryProvider::new();
        provider.insert("src/a.clj", "(ns a)");
        provider.insert("src/a/impl.clj", "(in-ns 'a)\n(defn helper [] 1)");
        provider.insert("src/script.clj", "(println \"hi\")");

        assert!(provider.read(Path::new("src/a/impl.clj")).unwrap().is_none());

        let units = provider.read_all().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].decl.name.as_str(), "a");
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut provider = MemoryProvider::new();
        provider.insert("a.clj", "(ns a)");
        let before = provider.read(Path::new("a.clj")).unwrap().unwrap().fingerprint;

        provider.insert("a.clj", "(ns a)\n(def x 1)");
        let after = provider.read(Path::new("a.clj")).unwrap().unwrap().fingerprint;

        assert_ne!(before, after);
    }

    #[test]
    fn remove_unit() {
        let mut provider = MemoryProvider::new();
        provider.insert("a.clj", "(ns a)");
        assert!(provider.remove("a.clj"));
        assert!(!provider.remove("a.clj"));
        assert!(provider.list().unwrap().is_empty());
    }
}

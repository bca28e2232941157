//! Locating and reading shader sources and binaries.
//!
//! The core never opens files by itself; every lookup goes through an
//! [`AssetResolver`], which maps a logical path such as `shader/flat.vp` to a
//! concrete path and reads it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Maps logical asset paths to readable resources.
pub trait AssetResolver {
    /// Resolve `logical` to a concrete path, or `None` if it does not exist.
    fn resolve(&self, logical: &str) -> Option<PathBuf>;

    /// Read a resolved path as UTF-8 text.
    fn read_text(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a resolved path as raw bytes.
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<F> AssetResolver for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        self(logical)
    }
}

/// Resolves against an ordered list of root directories.
///
/// Absolute paths that exist are returned unchanged; relative paths are tried
/// under each root in insertion order and the first existing file wins.
#[derive(Debug, Clone, Default)]
pub struct FileAssets {
    roots: Vec<PathBuf>,
}

impl FileAssets {
    /// A resolver with no roots (absolute paths only).
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver searching `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    /// Append a search root.
    pub fn add_root(&mut self, root: impl Into<PathBuf>) -> &mut Self {
        self.roots.push(root.into());
        self
    }

    /// The search roots, in lookup order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl AssetResolver for FileAssets {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        let path = Path::new(logical);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
    }
}

/// In-memory assets keyed by normalized logical path.
///
/// Useful for shaders embedded with `include_str!` and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryAssets {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(normalize(Path::new(path)), contents.into());
        self
    }

    /// Builder form of [`MemoryAssets::insert`].
    #[must_use]
    pub fn with(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    fn get(&self, path: &Path) -> Result<&[u8]> {
        self.files
            .get(&normalize(path))
            .map(Vec::as_slice)
            .ok_or_else(|| Error::not_found(path.display().to_string()))
    }
}

impl AssetResolver for MemoryAssets {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        let key = normalize(Path::new(logical));
        self.files.contains_key(&key).then_some(key)
    }

    fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = self.get(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            Error::invalid_argument(format!("{} is not UTF-8: {e}", path.display()))
        })
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        self.get(path).map(<[u8]>::to_vec)
    }
}

/// Lexically resolve `.` and `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_assets_normalize() {
        let assets = MemoryAssets::new().with("shader/flat.vp", "void main(){}");
        assert_eq!(
            assets.resolve("shader/./lib/../flat.vp"),
            Some(PathBuf::from("shader/flat.vp"))
        );
        assert!(assets.resolve("shader/other.vp").is_none());
        let path = assets.resolve("shader/flat.vp").expect("resolved");
        assert_eq!(assets.read_text(&path).expect("text"), "void main(){}");
    }

    #[test]
    fn test_memory_assets_missing_read() {
        let assets = MemoryAssets::new();
        assert!(matches!(
            assets.read_bytes(Path::new("nope.bin")),
            Err(Error::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn test_file_assets_roots_in_order() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        std::fs::write(second.path().join("a.fp"), "second").expect("write");
        std::fs::write(first.path().join("b.fp"), "first").expect("write");
        std::fs::write(second.path().join("b.fp"), "second").expect("write");

        let mut assets = FileAssets::with_root(first.path());
        assets.add_root(second.path());

        let a = assets.resolve("a.fp").expect("a");
        assert_eq!(assets.read_text(&a).expect("read"), "second");
        let b = assets.resolve("b.fp").expect("b");
        assert_eq!(assets.read_text(&b).expect("read"), "first");
        assert!(assets.resolve("c.fp").is_none());

        let absolute = b.to_str().expect("utf-8 path");
        assert_eq!(FileAssets::new().resolve(absolute), Some(b.clone()));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |name: &str| (name == "x").then(|| PathBuf::from("/x"));
        assert_eq!(resolver.resolve("x"), Some(PathBuf::from("/x")));
        assert_eq!(resolver.resolve("y"), None);
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Content store failures, classified so a scan can decide skip vs. report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    PermissionDenied(String),
    /// Interrupted / timed out reads that may succeed on a later attempt
    Transient(String),
    Other(String),
}

impl StoreError {
    /// Missing documents and transient failures are expected during a scan
    pub fn is_skippable(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(msg) => write!(f, "not found: {}", msg),
            StoreError::PermissionDenied(msg) => write!(f, "permission denied: {}", msg),
            StoreError::Transient(msg) => write!(f, "transient failure: {}", msg),
            StoreError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied(e.to_string()),
            io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                StoreError::Transient(e.to_string())
            }
            _ => StoreError::Other(e.to_string()),
        }
    }
}

impl From<walkdir::Error> for StoreError {
    fn from(e: walkdir::Error) -> Self {
        let msg = e.to_string();
        match e.into_io_error() {
            Some(io_err) => io_err.into(),
            None => StoreError::Other(msg),
        }
    }
}

/// Named text blobs arranged in a directory-like hierarchy.
///
/// Paths are `/`-separated and relative to the store root; `""` is the root.
pub trait ContentStore: Send + Sync {
    fn list_children(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError>;

    /// Read at most `max_bytes` from the start of a document
    fn read_prefix(&self, path: &str, max_bytes: usize) -> Result<String, StoreError>;

    fn read(&self, path: &str) -> Result<String, StoreError>;
}

/// Join a parent store path and a child name
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// `/`-joined path of `path` relative to `root`, or `None` outside of it
pub fn relative_doc_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Content store backed by a vault directory on disk
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(StoreError::PermissionDenied(format!(
                "path escapes the vault: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Map an absolute file-system path back to a store path (document id)
    pub fn doc_id_for(&self, path: &Path) -> Option<String> {
        relative_doc_id(&self.root, path)
    }
}

impl ContentStore for FsContentStore {
    fn list_children(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(format!("{:?}", dir)));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let kind = if entry.file_type().is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(StoreEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
            });
        }
        Ok(entries)
    }

    fn read_prefix(&self, path: &str, max_bytes: usize) -> Result<String, StoreError> {
        let file = fs::File::open(self.resolve(path)?)?;
        let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
        file.take(max_bytes as u64).read_to_end(&mut buf)?;
        // A multi-byte character cut at the boundary becomes U+FFFD
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read(&self, path: &str) -> Result<String, StoreError> {
        Ok(fs::read_to_string(self.resolve(path)?)?)
    }
}

/// In-memory content store keyed by full document path
#[derive(Default)]
pub struct MemoryContentStore {
    docs: RwLock<BTreeMap<String, String>>,
    read_errors: RwLock<HashMap<String, StoreError>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, content: &str) {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(path.to_string(), content.to_string());
        }
    }

    pub fn remove(&self, path: &str) {
        if let Ok(mut docs) = self.docs.write() {
            docs.remove(path);
        }
    }

    /// Make every read of `path` fail with `error`
    pub fn fail_reads(&self, path: &str, error: StoreError) {
        if let Ok(mut errors) = self.read_errors.write() {
            errors.insert(path.to_string(), error);
        }
    }

    fn lookup(&self, path: &str) -> Result<String, StoreError> {
        let errors = self
            .read_errors
            .read()
            .map_err(|e| StoreError::Other(e.to_string()))?;
        if let Some(err) = errors.get(path) {
            return Err(err.clone());
        }
        let docs = self
            .docs
            .read()
            .map_err(|e| StoreError::Other(e.to_string()))?;
        docs.get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

impl ContentStore for MemoryContentStore {
    fn list_children(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let docs = self
            .docs
            .read()
            .map_err(|e| StoreError::Other(e.to_string()))?;
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };

        let mut entries: Vec<StoreEntry> = Vec::new();
        for key in docs.keys().filter(|k| k.starts_with(&prefix)) {
            let rest = &key[prefix.len()..];
            let entry = match rest.split_once('/') {
                Some((dir, _)) => StoreEntry {
                    name: dir.to_string(),
                    kind: EntryKind::Directory,
                },
                None => StoreEntry {
                    name: rest.to_string(),
                    kind: EntryKind::File,
                },
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }

        if entries.is_empty() && !path.is_empty() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(entries)
    }

    fn read_prefix(&self, path: &str, max_bytes: usize) -> Result<String, StoreError> {
        let content = self.lookup(path)?;
        if content.len() <= max_bytes {
            return Ok(content);
        }
        let mut end = max_bytes;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        Ok(content[..end].to_string())
    }

    fn read(&self, path: &str) -> Result<String, StoreError> {
        self.lookup(path)
    }
}

//! Filesystem adapters backing the template loader.
//!
//! [`FileSystem`] exposes both async and sync entry points so the same
//! adapter serves `render_file` and `render_file_sync`. [`StdFileSystem`]
//! is the on-disk implementation; [`MemoryFileSystem`] holds templates in a
//! map and backs most tests.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::sync::RwLock;

use async_trait::async_trait;
use weft_core::WeftError;

/// Access to template files plus the path algebra the loader needs.
///
/// `resolve` appends `ext` when the file has no extension and normalizes
/// `.` and `..` segments lexically. `contains` answers whether `path` sits
/// under `root` and is the containment check behind relative references.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether the file exists.
    async fn exists(&self, path: &str) -> bool;

    /// Synchronous variant of [`FileSystem::exists`].
    fn exists_sync(&self, path: &str) -> bool;

    /// Reads the file to a string.
    async fn read_file(&self, path: &str) -> Result<String, WeftError>;

    /// Synchronous variant of [`FileSystem::read_file`].
    fn read_file_sync(&self, path: &str) -> Result<String, WeftError>;

    /// Joins `file` onto `dir`, appending `ext` when `file` has no
    /// extension, and normalizes the result.
    fn resolve(&self, dir: &str, file: &str, ext: &str) -> String;

    /// The directory containing `file`, used to resolve `./` references.
    fn dirname(&self, file: &str) -> Option<String>;

    /// Whether `path` lies strictly under `root`.
    fn contains(&self, root: &str, path: &str) -> bool;
}

/// The on-disk filesystem, async reads via tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl StdFileSystem {
    fn absolutize(path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        };
        normalize_components(&joined)
    }
}

#[async_trait]
impl FileSystem for StdFileSystem {
    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    fn exists_sync(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    async fn read_file(&self, path: &str) -> Result<String, WeftError> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    fn read_file_sync(&self, path: &str) -> Result<String, WeftError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn resolve(&self, dir: &str, file: &str, ext: &str) -> String {
        let mut file = file.to_string();
        if !ext.is_empty() && Path::new(&file).extension().is_none() {
            file.push_str(ext);
        }
        Self::absolutize(&Path::new(dir).join(file))
            .to_string_lossy()
            .into_owned()
    }

    fn dirname(&self, file: &str) -> Option<String> {
        Self::absolutize(Path::new(file))
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn contains(&self, root: &str, path: &str) -> bool {
        let mut root = Self::absolutize(Path::new(root))
            .to_string_lossy()
            .into_owned();
        if !root.ends_with(MAIN_SEPARATOR) {
            root.push(MAIN_SEPARATOR);
        }
        let path = Self::absolutize(Path::new(path))
            .to_string_lossy()
            .into_owned();
        path.starts_with(&root)
    }
}

/// Lexically resolves `.` and `..` components without touching the disk.
fn normalize_components(path: &Path) -> PathBuf {
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

/// An in-memory filesystem with `/`-separated paths.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryFileSystem {
    /// Creates an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filesystem from `(path, content)` pairs.
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let fs = Self::new();
        for (path, content) in files {
            fs.add(path, content);
        }
        fs
    }

    /// Adds or replaces a file.
    pub fn add(&self, path: &str, content: &str) {
        self.files
            .write()
            .expect("file map poisoned")
            .insert(normalize_str(path), content.to_string());
    }

    fn lookup(&self, path: &str) -> Option<String> {
        self.files
            .read()
            .expect("file map poisoned")
            .get(&normalize_str(path))
            .cloned()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn exists_sync(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    async fn read_file(&self, path: &str) -> Result<String, WeftError> {
        self.read_file_sync(path)
    }

    fn read_file_sync(&self, path: &str) -> Result<String, WeftError> {
        self.lookup(path).ok_or_else(|| {
            WeftError::Io(io::Error::new(io::ErrorKind::NotFound, path.to_string()))
        })
    }

    fn resolve(&self, dir: &str, file: &str, ext: &str) -> String {
        let mut file = file.to_string();
        let last_segment = file.rsplit('/').next().unwrap_or("");
        if !ext.is_empty() && !last_segment.contains('.') {
            file.push_str(ext);
        }
        if file.starts_with('/') {
            normalize_str(&file)
        } else if dir.is_empty() {
            normalize_str(&file)
        } else {
            normalize_str(&format!("{dir}/{file}"))
        }
    }

    fn dirname(&self, file: &str) -> Option<String> {
        let normalized = normalize_str(file);
        match normalized.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(i) => Some(normalized[..i].to_string()),
            None => Some(String::new()),
        }
    }

    fn contains(&self, root: &str, path: &str) -> bool {
        let root = normalize_str(root);
        if root.is_empty() || root == "." {
            return true;
        }
        let path = normalize_str(path);
        path.starts_with(&format!("{}/", root.trim_end_matches('/')))
    }
}

/// Normalizes a `/`-separated path string: collapses `.` and resolves `..`
/// against preceding segments.
fn normalize_str(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|s| *s != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }
    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

//! Template lookup.
//!
//! The loader turns a logical template name into a concrete path. Names
//! starting with `./` or `../` resolve against the directory of the
//! referencing file first, and only count when the result stays inside a
//! configured root; plain names resolve against each configured directory
//! in order. The first candidate that exists wins, and a miss reports every
//! path that was tried.

use std::sync::Arc;

use weft_core::WeftError;

use crate::options::NormalizedOptions;

/// Which directory list a lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupType {
    /// Top-level templates (`render_file`).
    Root,
    /// Partials (`include`, `render`).
    Partials,
    /// Layouts (`layout`).
    Layouts,
}

/// Resolves template names against the configured directories.
pub struct Loader {
    options: Arc<NormalizedOptions>,
}

impl Loader {
    /// Creates a loader over the engine configuration.
    pub const fn new(options: Arc<NormalizedOptions>) -> Self {
        Self { options }
    }

    fn dirs(&self, lookup: LookupType) -> &[String] {
        match lookup {
            LookupType::Root => &self.options.root,
            LookupType::Partials => &self.options.partials,
            LookupType::Layouts => &self.options.layouts,
        }
    }

    /// Whether the name is a relative reference (`./` or `../`).
    pub fn is_relative(file: &str) -> bool {
        file.starts_with("./") || file.starts_with("../")
    }

    /// Generates candidate paths in probe order.
    pub fn candidates(
        &self,
        file: &str,
        lookup: LookupType,
        current_file: Option<&str>,
    ) -> Vec<String> {
        let fs = &self.options.fs;
        let ext = &self.options.extname;
        let dirs = self.dirs(lookup);
        let enforce_root = Self::is_relative(file);
        let mut out = Vec::new();

        if self.options.relative_reference && enforce_root {
            if let Some(current) = current_file {
                if let Some(dir) = fs.dirname(current) {
                    let referenced = fs.resolve(&dir, file, ext);
                    // the relative candidate counts once, and only inside a root
                    if dirs.iter().any(|root| fs.contains(root, &referenced)) {
                        out.push(referenced);
                    }
                }
            }
        }

        for dir in dirs {
            let candidate = fs.resolve(dir, file, ext);
            if (!enforce_root || fs.contains(dir, &candidate)) && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// Finds the first existing candidate.
    pub async fn lookup(
        &self,
        file: &str,
        lookup: LookupType,
        current_file: Option<&str>,
    ) -> Result<String, WeftError> {
        let candidates = self.candidates(file, lookup, current_file);
        for candidate in &candidates {
            if self.options.fs.exists(candidate).await {
                tracing::debug!(name = file, path = %candidate, "template resolved");
                return Ok(candidate.clone());
            }
        }
        Err(WeftError::FileNotFound {
            name: file.to_string(),
            attempted: candidates,
        })
    }

    /// Synchronous variant of [`Loader::lookup`].
    pub fn lookup_sync(
        &self,
        file: &str,
        lookup: LookupType,
        current_file: Option<&str>,
    ) -> Result<String, WeftError> {
        let candidates = self.candidates(file, lookup, current_file);
        for candidate in &candidates {
            if self.options.fs.exists_sync(candidate) {
                tracing::debug!(name = file, path = %candidate, "template resolved");
                return Ok(candidate.clone());
            }
        }
        Err(WeftError::FileNotFound {
            name: file.to_string(),
            attempted: candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::options::EngineOptions;

    fn loader(fs: MemoryFileSystem, root: &str, partials: Option<&str>) -> Loader {
        let options = EngineOptions {
            root: vec![root.to_string()],
            partials: partials.map(|p| vec![p.to_string()]),
            extname: ".html".to_string(),
            fs: Arc::new(fs),
            ..EngineOptions::default()
        }
        .normalize()
        .unwrap();
        Loader::new(Arc::new(options))
    }

    #[test]
    fn test_plain_name_resolves_against_roots() {
        let fs = MemoryFileSystem::with_files([("/site/a.html", "A")]);
        let loader = loader(fs, "/site", None);
        assert_eq!(
            loader.lookup_sync("a", LookupType::Root, None).unwrap(),
            "/site/a.html"
        );
    }

    #[test]
    fn test_partials_use_their_own_dirs() {
        let fs = MemoryFileSystem::with_files([("/partials/p.html", "P")]);
        let loader = loader(fs, "/site", Some("/partials"));
        assert_eq!(
            loader.lookup_sync("p", LookupType::Partials, None).unwrap(),
            "/partials/p.html"
        );
        assert!(loader.lookup_sync("p", LookupType::Root, None).is_err());
    }

    #[test]
    fn test_relative_reference_resolves_against_current_file() {
        let fs = MemoryFileSystem::with_files([("/site/sub/b.html", "B")]);
        let loader = loader(fs, "/site", None);
        let found = loader
            .lookup_sync("./b", LookupType::Partials, Some("/site/sub/a.html"))
            .unwrap();
        assert_eq!(found, "/site/sub/b.html");
    }

    #[test]
    fn test_relative_escape_is_rejected() {
        let fs = MemoryFileSystem::with_files([("/etc/passwd", "secret")]);
        let loader = loader(fs, "/site/templates", None);
        let err = loader
            .lookup_sync(
                "../../../etc/passwd",
                LookupType::Partials,
                Some("/site/templates/page.html"),
            )
            .unwrap_err();
        match err {
            WeftError::FileNotFound { attempted, .. } => {
                assert!(attempted.iter().all(|p| !p.starts_with("/etc")));
            }
            other => panic!("expected file-not-found, got {other:?}"),
        }
    }

    #[test]
    fn test_miss_reports_all_candidates() {
        let fs = MemoryFileSystem::new();
        let options = EngineOptions {
            root: vec!["/a".to_string(), "/b".to_string()],
            extname: ".html".to_string(),
            fs: Arc::new(fs),
            ..EngineOptions::default()
        }
        .normalize()
        .unwrap();
        let loader = Loader::new(Arc::new(options));
        let err = loader.lookup_sync("x", LookupType::Root, None).unwrap_err();
        match err {
            WeftError::FileNotFound { name, attempted } => {
                assert_eq!(name, "x");
                assert_eq!(attempted, vec!["/a/x.html", "/b/x.html"]);
            }
            other => panic!("expected file-not-found, got {other:?}"),
        }
    }
}

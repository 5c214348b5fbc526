//! Build context access
//!
//! The cache never touches the build context directly; it goes through a
//! [`ContextWalker`], which the builder supplies. [`FsContext`] is the
//! implementation for a context that is a plain directory on disk.

use crate::cache::origin::CONTEXT_ROOT;
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Metadata of one item in the build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Context-relative, `/`-separated path (`.` for the context root)
    pub name: String,

    /// Location on disk, used for hashing and staging
    pub path: PathBuf,

    pub modified: DateTime<Utc>,
    pub is_dir: bool,
    pub size: u64,
}

/// Read-only view of a build context
///
/// Implementations are called from blocking threads.
pub trait ContextWalker: Send + Sync {
    /// Metadata of one context-relative path
    fn stat(&self, name: &str) -> CacheResult<FileMeta>;

    /// Visit `root` and everything below it, parents before children
    ///
    /// Only directories and regular files are visited.
    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&FileMeta) -> CacheResult<()>,
    ) -> CacheResult<()>;
}

/// Build context backed by a local directory
#[derive(Debug, Clone)]
pub struct FsContext {
    root: PathBuf,
}

impl FsContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a context-relative name to its location on disk
    pub fn resolve(&self, name: &str) -> CacheResult<PathBuf> {
        let mut path = self.root.clone();
        for part in name.split('/').filter(|p| !p.is_empty() && *p != ".") {
            if part == ".." {
                return Err(CacheError::invalid_origin(
                    name,
                    "path escapes the build context",
                ));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn meta(name: String, path: PathBuf, metadata: &fs::Metadata) -> CacheResult<FileMeta> {
        let modified = metadata
            .modified()
            .map_err(|e| CacheError::io(format!("reading mtime of {}", path.display()), e))?;
        Ok(FileMeta {
            name,
            path,
            modified: DateTime::<Utc>::from(modified),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        })
    }
}

/// Context-relative name of `child` below `parent`
fn child_name(parent: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    match (parent, relative.is_empty()) {
        (_, true) => parent.to_string(),
        (CONTEXT_ROOT, false) => relative,
        (_, false) => format!("{}/{}", parent, relative),
    }
}

impl ContextWalker for FsContext {
    fn stat(&self, name: &str) -> CacheResult<FileMeta> {
        let path = self.resolve(name)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::PathNotFound(name.to_string()))
            }
            Err(e) => return Err(CacheError::io(format!("stat {}", path.display()), e)),
        };
        Self::meta(name.to_string(), path, &metadata)
    }

    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&FileMeta) -> CacheResult<()>,
    ) -> CacheResult<()> {
        let base = self.resolve(root)?;
        if !base.exists() {
            return Err(CacheError::PathNotFound(root.to_string()));
        }

        let walker = WalkDir::new(&base)
            .follow_links(false)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry
                .map_err(|e| CacheError::Internal(format!("walking {}: {}", base.display(), e)))?;
            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&base)
                .map_err(|e| CacheError::Internal(e.to_string()))?;
            let metadata = entry.metadata().map_err(|e| {
                CacheError::Internal(format!("reading {}: {}", entry.path().display(), e))
            })?;

            let meta = Self::meta(
                child_name(root, relative),
                entry.path().to_path_buf(),
                &metadata,
            )?;
            visit(&meta)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> (TempDir, FsContext) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/nested")).unwrap();
        fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(temp.path().join("src/nested/lib.rs"), "").unwrap();
        fs::write(temp.path().join("README"), "readme").unwrap();
        let ctx = FsContext::new(temp.path());
        (temp, ctx)
    }

    fn names(ctx: &FsContext, root: &str) -> Vec<String> {
        let mut names = vec![];
        ctx.walk(root, &mut |meta| {
            names.push(meta.name.clone());
            Ok(())
        })
        .unwrap();
        names
    }

    #[test]
    fn stat_reports_kind_and_size() {
        let (_temp, ctx) = context();

        let file = ctx.stat("src/main.rs").unwrap();
        assert!(!file.is_dir);
        assert_eq!(file.size, 12);
        assert_eq!(file.name, "src/main.rs");

        assert!(ctx.stat("src").unwrap().is_dir);
        assert!(matches!(
            ctx.stat("missing").unwrap_err(),
            CacheError::PathNotFound(_)
        ));
    }

    #[test]
    fn walk_names_are_context_relative() {
        let (_temp, ctx) = context();

        assert_eq!(
            names(&ctx, "src"),
            vec!["src", "src/main.rs", "src/nested", "src/nested/lib.rs"]
        );
        assert_eq!(
            names(&ctx, "."),
            vec![".", "README", "src", "src/main.rs", "src/nested", "src/nested/lib.rs"]
        );
    }

    #[test]
    fn walk_single_file_visits_it() {
        let (_temp, ctx) = context();
        assert_eq!(names(&ctx, "README"), vec!["README"]);
    }

    #[test]
    fn escaping_paths_rejected() {
        let (_temp, ctx) = context();
        assert!(ctx.stat("../etc/passwd").is_err());
        assert!(ctx.resolve("src/../../x").is_err());
    }

    #[test]
    fn visitor_errors_stop_the_walk() {
        let (_temp, ctx) = context();
        let mut seen = 0;
        let result = ctx.walk(".", &mut |_| {
            seen += 1;
            Err(CacheError::Internal("stop".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }
}

//! Path containment checks.
//!
//! A [`PathGuard`] holds the set of allowed root directories. Candidate paths
//! are normalized lexically (`.` and `..` are folded, symlinks are never
//! followed) and admitted only when they equal a root or sit below one.
//!
//! An empty root set means **no restriction**: every path is admitted. This
//! is the behaviour when no allowed directory is configured at startup, and
//! callers that need a sandbox must supply at least one root.

use std::path::{Component, Path, PathBuf};

/// Immutable allow-list of root directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
    base: PathBuf,
}

impl PathGuard {
    /// Create a guard resolving relative paths against the process working
    /// directory.
    pub fn new<P: AsRef<Path>>(roots: &[P]) -> Self {
        Self::with_base(roots, current_dir())
    }

    /// Create a guard resolving relative paths (roots and candidates) against
    /// `base`.
    pub fn with_base<P: AsRef<Path>>(roots: &[P], base: impl AsRef<Path>) -> Self {
        let base = normalize_path(base.as_ref(), Path::new("/"));
        let mut normalized: Vec<PathBuf> = Vec::with_capacity(roots.len());
        for root in roots {
            let root = normalize_path(root.as_ref(), &base);
            if !normalized.contains(&root) {
                normalized.push(root);
            }
        }

        Self {
            roots: normalized,
            base,
        }
    }

    /// A guard that admits every path
    pub fn permit_all() -> Self {
        Self::new::<PathBuf>(&[])
    }

    /// Whether this guard admits every path (no roots configured)
    pub fn is_unrestricted(&self) -> bool {
        self.roots.is_empty()
    }

    /// Configured roots, normalized, in configuration order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Directory relative candidates are resolved against
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve `candidate` to an absolute, normalized path
    pub fn resolve<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        normalize_path(candidate.as_ref(), &self.base)
    }

    /// Check whether `candidate` lies inside an allowed root
    pub fn is_allowed<P: AsRef<Path>>(&self, candidate: P) -> bool {
        if self.is_unrestricted() {
            return true;
        }

        let resolved = self.resolve(candidate);
        // Component-wise prefix: `/a/b` admits `/a/b/c` but never `/a/bc`
        self.roots.iter().any(|root| resolved.starts_with(root))
    }
}

/// Lexically normalize `path`, resolving it against `base` when relative.
///
/// `..` never climbs above the filesystem root.
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    normalized
}

/// Normalize `path` against the process working directory
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path, Path::new("/"))
    } else {
        normalize_path(path, &current_dir())
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        log::warn!("Cannot read working directory ({}), resolving relative paths from /", e);
        PathBuf::from("/")
    })
}

//! Normalized virtual folder paths.
//!
//! Every folder location in the system is carried as a [`VirtualPath`]: a
//! cleaned absolute path with a leading *and* trailing slash (`/`, `/docs/`,
//! `/docs/2024/`). The trailing slash is load-bearing: with it, plain string
//! prefix matching is exactly segment-prefix matching, so `/a/b/` matches
//! `/a/b/c/` but can never match `/a/bc/`. That is what lets subtree
//! operations run as ordered range scans plus `starts_with` on a flat store.

use std::fmt;

/// A normalized virtual folder path. Construction cleans the input, so two
/// paths naming the same folder always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The root folder, `/`.
    pub fn root() -> Self {
        VirtualPath("/".to_owned())
    }

    /// Normalize arbitrary input into a virtual path.
    ///
    /// Empty segments and `.` are dropped, `..` pops one level (clamped at
    /// root). `""`, `"/"`, `"//."` and `"/a/.."` all normalize to root.
    pub fn new(input: &str) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in input.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Self::root();
        }
        let mut path = String::with_capacity(input.len() + 2);
        path.push('/');
        for segment in segments {
            path.push_str(segment);
            path.push('/');
        }
        VirtualPath(path)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments from the root down. Empty for the root itself.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Append one segment. Slashes in `name` are cleaned away rather than
    /// creating extra levels.
    pub fn join(&self, name: &str) -> Self {
        Self::new(&format!("{}{}/", self.0, name))
    }

    /// The containing folder, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let leaf = self.leaf()?;
        let end = self.0.len() - leaf.len() - 1;
        Some(VirtualPath(self.0[..end].to_owned()))
    }

    /// The last segment, or `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments().next_back()
    }

    /// Segment-aware prefix test: true when `other` is this folder or lives
    /// anywhere below it. `/a/b/` is a prefix of `/a/b/` and `/a/b/c/`,
    /// never of `/a/bc/`.
    pub fn is_segment_prefix_of(&self, other: &VirtualPath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Rewrite this path by substituting the `old` prefix with `new`.
    /// Returns `None` when this path is not under `old`.
    pub fn rebase(&self, old: &VirtualPath, new: &VirtualPath) -> Option<Self> {
        let rest = self.0.strip_prefix(old.as_str())?;
        Some(Self::new(&format!("{}{rest}", new.as_str())))
    }

    /// The part of this path below `base`, without a leading slash and with
    /// the trailing slash kept (`""` when equal to `base`). `None` when this
    /// path is not under `base`.
    pub fn relative_to(&self, base: &VirtualPath) -> Option<&str> {
        self.0.strip_prefix(base.as_str())
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VirtualPath {
    fn from(input: &str) -> Self {
        Self::new(input)
    }
}

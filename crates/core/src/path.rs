//! Page path helpers.
//!
//! Page paths are absolute, slash-separated strings. The site tree root is
//! written `/`. A [`RelativePath`] is what remains of a page path once the
//! root of the tree being merged is stripped off; it is the key that pairs a
//! source page with its target counterpart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The path of the site tree root.
pub const TREE_ROOT: &str = "/";

/// Normalize an operator-entered page path.
///
/// Adds the leading slash when it is missing, drops trailing slashes and maps
/// empty input to the tree root.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return TREE_ROOT.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Whether `path` designates the tree root (`/` or empty).
pub fn is_tree_root(path: &str) -> bool {
    path.is_empty() || path == TREE_ROOT
}

/// Parent directory of `path`; the tree root for top-level pages.
pub fn parent(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => TREE_ROOT.to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Last segment of `path` (the page handle).
pub fn handle(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a child handle onto a parent path.
pub fn join(parent: &str, handle: &str) -> String {
    if is_tree_root(parent) {
        format!("/{}", handle)
    } else {
        format!("{}/{}", parent, handle)
    }
}

/// Prefix every strict descendant of `path` starts with.
pub fn descendant_prefix(path: &str) -> String {
    if is_tree_root(path) {
        TREE_ROOT.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Whether `candidate` lies strictly below `ancestor`.
pub fn is_descendant_of(candidate: &str, ancestor: &str) -> bool {
    candidate != ancestor && candidate.starts_with(&descendant_prefix(ancestor))
}

/// A page path relative to the root of the tree being merged.
///
/// Always starts with a slash, e.g. `/team` for `/about/team` under `/about`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativePath(String);

impl RelativePath {
    /// Compute the key of `absolute` under `root`.
    ///
    /// When `root` is the tree root the full path is the key. Returns `None`
    /// when `absolute` is not below `root`.
    pub fn from_absolute(root: &str, absolute: &str) -> Option<Self> {
        if is_tree_root(root) {
            return Some(Self(absolute.to_string()));
        }
        absolute
            .strip_prefix(root)
            .filter(|rest| rest.starts_with('/'))
            .map(|rest| Self(rest.to_string()))
    }

    /// Absolute path of this key under `root`.
    pub fn under(&self, root: &str) -> String {
        if is_tree_root(root) {
            self.0.clone()
        } else {
            format!("{}{}", root, self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Mountpoint scoping for callers outside the plugin's mount namespace.
//!
//! Docker runs managed plugins under a relocated root
//! (`/var/lib/docker/plugins/<id>/propagated-mount/`) and re-scopes any path a
//! plugin returns relative to it. ZFS, however, reports mountpoints as the
//! plugin sees them. Prefixing the reported path with one `..` per level of
//! relocation walks back out to the host root.
//!
//! The prefix must be joined by string concatenation: a normalising join
//! would collapse the `..` tokens.

use std::path::{Component, Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScoper {
    prefix: String,
}

impl PathScoper {
    /// Escape `depth` levels with no anchor
    pub fn new(depth: usize) -> Self {
        Self::anchored("", depth)
    }

    /// Escape `depth` levels, starting from `anchor`
    pub fn anchored(anchor: &str, depth: usize) -> Self {
        let mut prefix = anchor.to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') && depth > 0 {
            prefix.push('/');
        }
        prefix.push_str(&vec![".."; depth].join("/"));
        Self { prefix }
    }

    /// Escape as many levels as `anchor` has components
    pub fn for_relocation(anchor: &str) -> Self {
        Self::anchored(anchor, relocation_depth(anchor))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn scope(&self, engine_path: &str) -> String {
        format!("{}{}", self.prefix, engine_path)
    }
}

/// Number of normal components in `path`
pub fn relocation_depth(path: &str) -> usize {
    Path::new(path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

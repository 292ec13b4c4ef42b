//! Mount point matching.
//!
//! # Responsibilities
//! - Match a request path against a mount point by prefix (HTTP)
//! - Match a request path against a mount point exactly (websocket upgrades)
//! - Strip the mount point so modules see paths relative to themselves
//!
//! # Design Decisions
//! - Prefix matching respects segment boundaries: `/api` matches `/api` and
//!   `/api/x` but not `/apix`
//! - `/` matches every path
//! - Matching is case-sensitive
//! - No regex to guarantee O(n) matching

use std::fmt;

/// A validated mount point such as `/`, `/api` or `/config`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPoint {
    prefix: String,
}

impl MountPoint {
    /// Validate and normalize a mount point.
    ///
    /// A mount point must start with `/`. A trailing `/` is dropped unless
    /// the mount point is the root.
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.starts_with('/') || raw.contains(['?', '#']) {
            return None;
        }
        let trimmed = raw.trim_end_matches('/');
        let prefix = if trimmed.is_empty() { "/" } else { trimmed };
        Some(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn is_root(&self) -> bool {
        self.prefix == "/"
    }

    /// Used for ordering: longer mount points are more specific.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    /// True if `path` lies under this mount point.
    pub fn matches_prefix(&self, path: &str) -> bool {
        if self.is_root() {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// True if `path` is exactly this mount point.
    pub fn matches_exact(&self, path: &str) -> bool {
        path == self.prefix
    }

    /// The path as seen by the module, always starting with `/`.
    ///
    /// Callers must check [`MountPoint::matches_prefix`] first.
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        if self.is_root() {
            return path;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

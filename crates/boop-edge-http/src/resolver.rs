//! Fallback chain: the ordered object keys tried for one request path.
//!
//! ```text
//! Literal         /blog/post      -> blog/post
//! AssetRewrite    /assets/a.js    -> a.js              (asset paths only)
//! DirectoryIndex  /blog/          -> blog/index.html   (non-asset paths only)
//! SpaShell        /anything       -> index.html        (non-asset paths only)
//! ```
//!
//! Steps whose precondition does not hold are skipped, and a key already
//! planned by an earlier step is not planned again. A path that does not
//! decode to UTF-8, or that carries a `.` or `..` segment after decoding,
//! plans no keys at all, so every key stays under the deployment root.

use std::fmt;

use boop_edge_core::DeploymentRoot;
use percent_encoding::percent_decode_str;

use crate::policy::is_asset_path;

/// Document served for the site root and as the SPA shell.
pub const INDEX_DOCUMENT: &str = "index.html";

/// One strategy for deriving a candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStep {
    /// The request path itself.
    Literal,
    /// The path with its first segment removed.
    AssetRewrite,
    /// `index.html` inside the path treated as a directory.
    DirectoryIndex,
    /// `index.html` at the deployment root.
    SpaShell,
}

impl FallbackStep {
    /// All steps in the order they are tried.
    pub const CHAIN: [Self; 4] = [
        Self::Literal,
        Self::AssetRewrite,
        Self::DirectoryIndex,
        Self::SpaShell,
    ];

    /// Whether this step is tried for a path of the given class.
    #[must_use]
    pub fn applies_to(self, is_asset: bool) -> bool {
        match self {
            Self::Literal => true,
            Self::AssetRewrite => is_asset,
            Self::DirectoryIndex | Self::SpaShell => !is_asset,
        }
    }

    /// Key relative to the deployment root, or `None` if the step yields
    /// nothing for this path.
    #[must_use]
    pub fn relative_key(self, path: &str) -> Option<String> {
        match self {
            Self::Literal => Some(literal_key(path)),
            Self::AssetRewrite => {
                strip_first_segment(path).map(|rewritten| rewritten.trim_start_matches('/').to_owned())
            }
            Self::DirectoryIndex => {
                let dir = path.trim_matches('/');
                if dir.is_empty() {
                    Some(INDEX_DOCUMENT.to_owned())
                } else {
                    Some(format!("{dir}/{INDEX_DOCUMENT}"))
                }
            }
            Self::SpaShell => Some(INDEX_DOCUMENT.to_owned()),
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::AssetRewrite => "asset_rewrite",
            Self::DirectoryIndex => "directory_index",
            Self::SpaShell => "spa_shell",
        }
    }
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully qualified object key and the step that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Producing step.
    pub step: FallbackStep,
    /// Object key including the deployment prefix.
    pub key: String,
}

/// Planned candidates for one request, in the order they are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    candidates: Vec<Candidate>,
}

impl FallbackChain {
    /// Plan the chain for a raw (percent-encoded) request path.
    ///
    /// The chain is empty when [`decode_request_path`] rejects the path.
    #[must_use]
    pub fn plan(root: &DeploymentRoot, path: &str) -> Self {
        let Some(decoded) = decode_request_path(path) else {
            return Self {
                candidates: Vec::new(),
            };
        };
        let is_asset = is_asset_path(path);

        let mut candidates: Vec<Candidate> = Vec::with_capacity(FallbackStep::CHAIN.len());
        for step in FallbackStep::CHAIN {
            if !step.applies_to(is_asset) {
                continue;
            }
            let Some(relative) = step.relative_key(&decoded) else {
                continue;
            };
            let key = root.object_key(&relative);
            if candidates.iter().any(|c| c.key == key) {
                continue;
            }
            candidates.push(Candidate { step, key });
        }

        Self { candidates }
    }

    /// Candidates in fetch order.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Number of planned fetches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl<'a> IntoIterator for &'a FallbackChain {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Percent-decode a request path into key space.
///
/// Returns `None` for invalid UTF-8 and for any `.` or `..` segment, whether
/// it arrived raw or encoded (`%2e%2e`, `..%2f`).
#[must_use]
pub fn decode_request_path(path: &str) -> Option<String> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    if decoded.split('/').any(|segment| segment == "." || segment == "..") {
        return None;
    }
    Some(decoded.into_owned())
}

/// Literal key for a path: leading slash removed, `/` becomes `index.html`.
#[must_use]
pub fn literal_key(path: &str) -> String {
    let key = path.trim_start_matches('/');
    if key.is_empty() {
        INDEX_DOCUMENT.to_owned()
    } else {
        key.to_owned()
    }
}

/// Drop the first non-empty segment. Returns `None` when the path has at
/// most one segment.
#[must_use]
pub fn strip_first_segment(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 1 {
        return None;
    }
    Some(format!("/{}", segments[1..].join("/")))
}

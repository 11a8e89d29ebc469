//! Path classification and cache-control policy.
//!
//! Both heuristics are regex based and live here so they can be tuned in one
//! place. A non-hashed file that happens to carry 8+ hex characters before
//! `.js` is classified as content-addressed; that is accepted.

use std::sync::LazyLock;

use http::HeaderValue;
use regex::Regex;

/// Extensions served as static assets.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "png", "jpg", "jpeg", "webp", "avif", "svg", "gif", "ico", "woff",
    "woff2", "ttf", "otf", "eot", "map", "json", "xml", "txt", "pdf", "mp4", "webm", "mp3", "wav",
];

static ASSET_EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\.(?:{})$", ASSET_EXTENSIONS.join("|"));
    Regex::new(&pattern).expect("asset extension pattern is valid")
});

static CONTENT_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.[a-f0-9]{8,}\.(?:js|css)$").expect("content hash pattern is valid")
});

/// Prefix under which build tools place fingerprinted assets.
pub const ASSETS_PREFIX: &str = "/assets/";

/// Whether a request path looks like a static asset.
#[must_use]
pub fn is_asset_path(path: &str) -> bool {
    path.starts_with(ASSETS_PREFIX) || ASSET_EXTENSION_RE.is_match(path)
}

/// Whether a filename embeds a content hash.
#[must_use]
pub fn has_content_hash(path: &str) -> bool {
    CONTENT_HASH_RE.is_match(path)
}

/// Cache tier chosen for a served object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Site root and HTML documents; rebuilt on every deploy.
    Html,
    /// Content-addressed build output.
    Immutable,
    /// Other recognized static files.
    StaticAsset,
    /// Everything else.
    Default,
}

impl CachePolicy {
    /// Pick the tier for a request path. First match wins.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        if path == "/" || path.ends_with(".html") {
            Self::Html
        } else if path.starts_with(ASSETS_PREFIX) || has_content_hash(path) {
            Self::Immutable
        } else if ASSET_EXTENSION_RE.is_match(path) {
            Self::StaticAsset
        } else {
            Self::Default
        }
    }

    /// `cache-control` value for this tier.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Html => "public, max-age=60, s-maxage=60",
            Self::Immutable => "public, max-age=31536000, immutable",
            Self::StaticAsset => "public, max-age=86400, s-maxage=604800",
            Self::Default => "public, max-age=300, s-maxage=3600",
        }
    }

    /// `cache-control` header value for this tier.
    #[must_use]
    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.directive())
    }
}

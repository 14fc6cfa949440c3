//! Core data types used throughout the service

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Longest path kept in a counter key; longer paths are truncated
pub const MAX_PATH_CHARS: usize = 200;

/// Aggregation key for every page-level metric: host (with port, if any)
/// plus the normalized request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    host: String,
    path: String,
}

impl PageKey {
    /// Build a key from raw host and path components.
    ///
    /// Strips one trailing `/index` segment, forces a leading slash, maps
    /// local drive-letter paths to a placeholder and truncates long paths.
    pub fn new(host: impl Into<String>, path: &str) -> Self {
        let host = host.into();
        let path = path.strip_suffix("/index").unwrap_or(path);

        if is_drive_letter_path(path) {
            tracing::warn!(host = %host, path = %path, "Local file path detected");
            return Self {
                host,
                path: "/invalid-local-path".to_string(),
            };
        }

        let mut path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        if path.chars().count() > MAX_PATH_CHARS {
            tracing::warn!(host = %host, "Path too long, truncating");
            path = path.chars().take(MAX_PATH_CHARS).collect();
        }

        Self { host, path }
    }

    /// Parse a page URL (referer or beacon body) into a key.
    pub fn from_url(raw: &str) -> Result<Self, UrlRejection> {
        let url = Url::parse(raw).map_err(|e| UrlRejection::Format(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(UrlRejection::Protocol(url.scheme().to_string()));
        }

        let host = match (url.host_str(), url.port()) {
            (None, _) | (Some(""), _) => return Err(UrlRejection::EmptyHost),
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
        };

        Ok(Self::new(host, url.path()))
    }

    /// Host, including a non-default port
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Normalized path, always starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Referer used for site-wide lookups against the legacy provider
    pub fn site_referer(&self) -> String {
        format!("https://{}/", self.host)
    }

    /// Referer used for page lookups and hit notifications
    pub fn page_referer(&self) -> String {
        format!("https://{}{}", self.host, self.path)
    }

    /// Page referer with a trailing slash appended
    pub fn page_referer_with_slash(&self) -> String {
        format!("https://{}{}/", self.host, self.path)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

fn is_drive_letter_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 4
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b':'
        && bytes[3] == b'/'
}

/// Reason a page URL could not be turned into a [`PageKey`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlRejection {
    /// Not a parseable absolute URL
    Format(String),
    /// Scheme other than http/https
    Protocol(String),
    /// URL has no host
    EmptyHost,
}

impl UrlRejection {
    /// Message returned to clients alongside zeroed totals
    pub fn message(&self) -> &'static str {
        match self {
            UrlRejection::Format(_) => "Invalid URL format",
            UrlRejection::Protocol(_) => {
                "Invalid URL protocol. Only HTTP and HTTPS are supported."
            }
            UrlRejection::EmptyHost => "Invalid URL host",
        }
    }
}

impl fmt::Display for UrlRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlRejection::Format(e) => write!(f, "invalid URL: {}", e),
            UrlRejection::Protocol(scheme) => write!(f, "unsupported scheme: {}", scheme),
            UrlRejection::EmptyHost => write!(f, "empty host"),
        }
    }
}

/// Externally reported counts for one page view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Unique visitors for the site
    pub site_uv: u64,
    /// Page views for the site
    pub site_pv: u64,
    /// Page views for the page
    pub page_pv: u64,
}

impl Totals {
    /// Sum of historical and live counts, metric by metric
    pub fn merge(before: Totals, live: Totals) -> Totals {
        Totals {
            site_uv: before.site_uv.saturating_add(live.site_uv),
            site_pv: before.site_pv.saturating_add(live.site_pv),
            page_pv: before.page_pv.saturating_add(live.page_pv),
        }
    }
}

/// Counter store key layout
pub mod keys {
    use super::PageKey;

    /// Cached legacy unique-visitor count for a site
    pub fn site_uv_cache(host: &str) -> String {
        format!("site_uv_live:{}", host)
    }

    /// Cached legacy page-view count for a site
    pub fn site_pv_cache(host: &str) -> String {
        format!("site_pv_live:{}", host)
    }

    /// Cached legacy page-view count for a page
    pub fn page_pv_cache(page: &PageKey) -> String {
        format!("page_pv_live:{}:{}", page.host(), page.path())
    }

    /// Local site page-view counter
    pub fn site_pv(host: &str) -> String {
        format!("site_pv:{}", host)
    }

    /// Local page page-view counter
    pub fn page_pv(page: &PageKey) -> String {
        format!("page_pv:{}:{}", page.host(), page.path())
    }

    /// Local set of visitor IPs for a site
    pub fn site_uv(host: &str) -> String {
        format!("site_uv:{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_key_strips_trailing_index() {
        let key = PageKey::new("example.com", "/blog/index");
        assert_eq!(key.path(), "/blog");

        // Only the segment, not any suffix ending in those letters
        let key = PageKey::new("example.com", "/reindex");
        assert_eq!(key.path(), "/reindex");

        let key = PageKey::new("example.com", "/index");
        assert_eq!(key.path(), "/");
    }

    #[test]
    fn test_page_key_sanitization() {
        let key = PageKey::new("example.com", "/D:/notes/page.html");
        assert_eq!(key.path(), "/invalid-local-path");

        let key = PageKey::new("example.com", "about");
        assert_eq!(key.path(), "/about");

        let long = format!("/{}", "a".repeat(500));
        let key = PageKey::new("example.com", &long);
        assert_eq!(key.path().chars().count(), MAX_PATH_CHARS);
    }

    #[test]
    fn test_page_key_from_url() {
        let key = PageKey::from_url("https://example.com/blog/post").unwrap();
        assert_eq!(key.host(), "example.com");
        assert_eq!(key.path(), "/blog/post");

        let key = PageKey::from_url("http://localhost:4000/index").unwrap();
        assert_eq!(key.host(), "localhost:4000");
        assert_eq!(key.path(), "/");

        assert!(matches!(
            PageKey::from_url("file:///C:/site/index.html"),
            Err(UrlRejection::Protocol(_))
        ));
        assert!(matches!(
            PageKey::from_url("not a url"),
            Err(UrlRejection::Format(_))
        ));
    }

    #[test]
    fn test_hostless_url_is_rejected() {
        // Never reaches a counter key
        assert!(PageKey::from_url("http:///").is_err());
        assert!(PageKey::from_url("https://").is_err());
    }

    #[test]
    fn test_referers() {
        let key = PageKey::new("example.com", "/blog/post");
        assert_eq!(key.site_referer(), "https://example.com/");
        assert_eq!(key.page_referer(), "https://example.com/blog/post");
        assert_eq!(key.page_referer_with_slash(), "https://example.com/blog/post/");
    }

    #[test]
    fn test_totals_merge() {
        let before = Totals {
            site_uv: 10,
            site_pv: 20,
            page_pv: 3,
        };
        let live = Totals {
            site_uv: 1,
            site_pv: 1,
            page_pv: 1,
        };
        assert_eq!(
            Totals::merge(before, live),
            Totals {
                site_uv: 11,
                site_pv: 21,
                page_pv: 4
            }
        );
    }

    #[test]
    fn test_key_layout() {
        let page = PageKey::new("example.com", "/a");
        assert_eq!(keys::site_uv_cache("example.com"), "site_uv_live:example.com");
        assert_eq!(keys::page_pv_cache(&page), "page_pv_live:example.com:/a");
        assert_eq!(keys::page_pv(&page), "page_pv:example.com:/a");
        assert_eq!(keys::site_uv("example.com"), "site_uv:example.com");
    }
}

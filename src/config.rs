//! Optimizer configuration.
//!
//! [`DeferConfig`] carries everything that is fixed for a site: where it lives
//! on disk and on the web, the substring lists that steer classification, the
//! loader timings and the cache policy. Per-request inputs live in
//! [`PageContext`](crate::optimize::PageContext).

use std::path::PathBuf;

use serde::Deserialize;

use crate::cache::CachePolicy;
use crate::error::Result;
use crate::loader::Timings;

/// Static, site-wide optimizer settings.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use deferpage::DeferConfig;
///
/// let config = DeferConfig::from_json(r#"{
///     "base_url": "https://shop.test/",
///     "root_dir": "/srv/shop",
///     "media_dir": "/srv/shop/pub/media"
/// }"#)?;
/// assert_eq!(config.exclude_scripts, vec!["widget.js", "googletagmanager"]);
/// # Ok::<(), deferpage::Error>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeferConfig {
    /// Absolute base URL of the site, e.g. `https://shop.test/`.
    pub base_url: String,
    /// Filesystem directory the site is served from.
    pub root_dir: PathBuf,
    /// Absolute media directory; the cache lives in `<media_dir>/cache/defer`.
    pub media_dir: PathBuf,
    /// Script `src` substrings that bypass optimization entirely.
    pub exclude_scripts: Vec<String>,
    /// Inline-script signatures that force deferral.
    pub always_defer_inline: Vec<String>,
    /// Third-party widgets loaded through the loader's script chain.
    pub vendor_scripts: Vec<String>,
    /// Markers that keep an image, iframe or video from being lazy-loaded.
    pub lazy_exclusions: Vec<String>,
    /// Routes on which the first internal script loads early.
    pub fast_routes: Vec<String>,
    /// Selector of the navigation toggle whose early clicks get replayed.
    pub menu_selector: String,
    pub timings: Timings,
    pub cache_policy: CachePolicy,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DeferConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            root_dir: PathBuf::from("."),
            media_dir: PathBuf::from("./pub/media"),
            exclude_scripts: strings(&["widget.js", "googletagmanager"]),
            always_defer_inline: strings(&[
                "hotjar2",
                "bat.bing",
                "require.config",
                "require(",
                "livechat_visitor_data",
                "richSnippet",
                "GTM",
                "connect.facebook.net",
                "ga",
                "gtag",
                "requirejs.config",
            ]),
            vendor_scripts: strings(&["livechat", "reviews"]),
            lazy_exclusions: strings(&[
                "outbaxlogo.png",
                "base64",
                "logo",
                "rev-slidebg",
                "no-lazy",
                "facebook",
                "googletagmanager",
            ]),
            fast_routes: strings(&["catalog_product_view"]),
            menu_selector: ".nav-toggle".to_string(),
            timings: Timings::default(),
            cache_policy: CachePolicy::default(),
        }
    }
}

impl DeferConfig {
    /// Create a configuration for a site with default lists and timings.
    pub fn new(
        base_url: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        media_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            root_dir: root_dir.into(),
            media_dir: media_dir.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_exclude_scripts(mut self, patterns: Vec<String>) -> Self {
        self.exclude_scripts = patterns;
        self
    }

    pub fn with_lazy_exclusions(mut self, markers: Vec<String>) -> Self {
        self.lazy_exclusions = markers;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Directory holding every cache artifact.
    pub fn cache_dir(&self) -> PathBuf {
        self.media_dir.join("cache").join("defer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeferConfig::default();
        assert!(config.always_defer_inline.iter().any(|s| s == "gtag"));
        assert_eq!(config.cache_policy, CachePolicy::SourceModified);
        assert_eq!(config.timings.internal_js, 5000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = DeferConfig::from_json(
            r#"{"base_url": "https://shop.test/", "cache_policy": "existence_only",
                "timings": {"fonts": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://shop.test/");
        assert_eq!(config.cache_policy, CachePolicy::ExistenceOnly);
        assert_eq!(config.timings.fonts, 50);
        assert_eq!(config.timings.external_js, 10000);
        assert_eq!(config.menu_selector, ".nav-toggle");
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(DeferConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_cache_dir() {
        let config = DeferConfig::new("https://shop.test/", "/srv", "/srv/pub/media");
        assert_eq!(config.cache_dir(), PathBuf::from("/srv/pub/media/cache/defer"));
    }
}

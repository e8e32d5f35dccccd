//! Compiled patterns shared by the script and media classifiers.

use regex_lite::Regex;
use std::sync::LazyLock;

/// Matches the opener of a `window.onload = function() {` handler.
pub static ONLOAD_OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"window\.onload\s*=\s*function\s*\(\s*\)\s*\{").unwrap()
});

/// Matches a YouTube video id after `embed/`, `youtu.be/`, `?v=`, `/vi/` and friends.
pub static YOUTUBE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[/|?&]vi?[/|=]|youtu\.be/|embed/)([a-zA-Z0-9_-]+)").unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onload_opener_spacing() {
        assert!(ONLOAD_OPENER_RE.is_match("window.onload = function() {"));
        assert!(ONLOAD_OPENER_RE.is_match("window.onload=function(){"));
        assert!(ONLOAD_OPENER_RE.is_match("window.onload =\n  function () {"));
        assert!(!ONLOAD_OPENER_RE.is_match("window.onload = init;"));
    }

    #[test]
    fn test_youtube_id_alternatives() {
        let id = |url: &str| YOUTUBE_ID_RE.captures(url).map(|c| c[1].to_string());
        assert_eq!(id("https://www.youtube.com/vi/abc").as_deref(), Some("abc"));
        assert_eq!(id("https://www.youtube.com/watch?feature=x&v=def").as_deref(), Some("def"));
        assert_eq!(id("https://www.youtube.com/"), None);
    }
}

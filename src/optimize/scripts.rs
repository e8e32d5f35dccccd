//! Script classification.
//!
//! Each `<script>` ends up in one of five places:
//!
//! - left alone: non-JavaScript types, excluded sources, inline scripts
//!   that do not need to wait;
//! - the merged bundle: local `.js` files that could be cached;
//! - the loader's descriptor list: vendor widgets;
//! - `data-src`: every other external script, loaded after the bundle;
//! - `type="lazyload"`: inline scripts that need jQuery or match an
//!   always-defer signature, run after the bundle.

use std::borrow::Cow;

use super::Pass;
use crate::cache::cache_key;
use crate::patterns::ONLOAD_OPENER_RE;
use crate::scan::{AttributeMap, TagKind, TagOccurrence, inline_script_body, parse_attributes};
use crate::util::{has_extension, is_external, site_path, strip_version_segments};

/// Marker WordPress wraps localized data in; those scripts must run in place.
const CDATA_MARKER: &str = "/* <![CDATA[ */";

/// Whether a `type` attribute value denotes classic JavaScript.
pub fn is_javascript_type(kind: &str) -> bool {
    let kind = kind.trim();
    kind.eq_ignore_ascii_case("text/javascript") || kind.eq_ignore_ascii_case("text/jsx;harmony=true")
}

/// Whether an inline script must wait for the deferred bundle.
///
/// Scripts matching one of `signatures` always wait. Otherwise a script waits
/// when it calls jQuery, unless it carries localized data.
pub fn should_defer_inline(body: &str, signatures: &[String]) -> bool {
    if Pass::matches_any(body, signatures) {
        return true;
    }
    let uses_jquery = body.contains("jQuery(") || body.contains("$(");
    uses_jquery && !body.contains(CDATA_MARKER)
}

/// Unwrap a `window.onload = function() { ... };` handler into its body.
///
/// By the time a deferred script runs the load event is long gone. The
/// handler's closing brace is found by nesting depth; an unbalanced handler
/// is left as written.
pub fn unwrap_window_onload(body: &str) -> Cow<'_, str> {
    let Some(opener) = ONLOAD_OPENER_RE.find(body) else {
        return Cow::Borrowed(body);
    };
    let rest = &body[opener.end()..];
    let Some(close) = closing_brace(rest) else {
        return Cow::Borrowed(body);
    };
    let after = &rest[close + 1..];
    let after = after.strip_prefix(';').unwrap_or(after);

    let mut unwrapped = String::with_capacity(body.len());
    unwrapped.push_str(&body[..opener.start()]);
    unwrapped.push_str(&rest[..close]);
    unwrapped.push_str(after);
    Cow::Owned(unwrapped)
}

/// Offset of the `}` closing a block whose `{` was just consumed.
fn closing_brace(rest: &str) -> Option<usize> {
    let mut depth = 0usize;
    for at in memchr::memchr2_iter(b'{', b'}', rest.as_bytes()) {
        if rest.as_bytes()[at] == b'{' {
            depth += 1;
        } else if depth == 0 {
            return Some(at);
        } else {
            depth -= 1;
        }
    }
    None
}

pub(super) fn classify(pass: &mut Pass<'_>, scripts: &[TagOccurrence]) {
    for script in scripts {
        classify_script(pass, &script.raw);
    }
}

fn classify_script(pass: &mut Pass<'_>, raw: &str) {
    let attrs = parse_attributes(TagKind::Script, raw);
    if let Some(kind) = attrs.non_empty("type")
        && !is_javascript_type(kind)
    {
        return;
    }

    match attrs.non_empty("src").map(str::to_string) {
        Some(src) => classify_external(pass, raw, attrs, &src),
        None => classify_inline(pass, raw, attrs),
    }
}

fn classify_external(pass: &mut Pass<'_>, raw: &str, mut attrs: AttributeMap, src: &str) {
    if Pass::matches_any(&strip_version_segments(src), &pass.config.exclude_scripts) {
        tracing::trace!(src, "script excluded");
        pass.replacements.keep(raw);
        pass.stats.excluded += 1;
        return;
    }

    if !is_external(src, &pass.page.host)
        && let Some(path) = site_path(&pass.base, src).map(|p| strip_version_segments(&p))
        && has_extension(&path, ".js")
        && pass.cache.resolve(&path, &mut pass.fonts).is_some()
    {
        pass.merge_paths.push(path);
        pass.replacements.remove(raw);
        pass.stats.merged_scripts += 1;
        return;
    }

    if Pass::matches_any(raw, &pass.config.vendor_scripts) {
        if pass.seen_vendor.insert(cache_key(raw)) {
            pass.inline_scripts.push(attrs);
            pass.stats.vendor_scripts += 1;
        }
        pass.replacements.remove(raw);
        return;
    }

    attrs.insert("data-src", src);
    attrs.remove("src");
    pass.replacements.push(raw, attrs.to_element("script", ""));
    pass.stats.deferred_scripts += 1;
}

fn classify_inline(pass: &mut Pass<'_>, raw: &str, attrs: AttributeMap) {
    let body = inline_script_body(raw);
    if !should_defer_inline(body, &pass.config.always_defer_inline) {
        return;
    }

    let mut deferred = AttributeMap::new();
    deferred.insert("type", "lazyload");
    for (name, value) in attrs.iter().filter(|(name, _)| *name != "type") {
        deferred.insert(name, value);
    }

    let body = unwrap_window_onload(body);
    pass.replacements.push(raw, deferred.to_element("script", &body));
    pass.stats.deferred_inline_scripts += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signatures() -> Vec<String> {
        vec!["gtag".to_string(), "require(".to_string()]
    }

    #[test]
    fn test_is_javascript_type() {
        assert!(is_javascript_type("text/javascript"));
        assert!(is_javascript_type("TEXT/JavaScript"));
        assert!(is_javascript_type("text/jsx;harmony=true"));
        assert!(!is_javascript_type("application/ld+json"));
        assert!(!is_javascript_type("text/x-magento-init"));
        assert!(!is_javascript_type("module"));
    }

    #[test]
    fn test_should_defer_inline() {
        assert!(should_defer_inline("jQuery(function(){})", &signatures()));
        assert!(should_defer_inline("$('.a').hide()", &signatures()));
        assert!(!should_defer_inline("/* <![CDATA[ */ var x = $('.a');", &signatures()));
        assert!(should_defer_inline("/* <![CDATA[ */ gtag('js')", &signatures()));
        assert!(!should_defer_inline("var x = 1;", &signatures()));
        assert!(!should_defer_inline("", &signatures()));
    }

    #[test]
    fn test_unwrap_window_onload() {
        assert_eq!(
            unwrap_window_onload("window.onload = function() { init(); };"),
            " init(); "
        );
        assert_eq!(
            unwrap_window_onload("a();window.onload=function(){b()};c();"),
            "a();b()c();"
        );
        assert!(matches!(unwrap_window_onload("init();"), Cow::Borrowed("init();")));
        assert!(matches!(
            unwrap_window_onload("window.onload = function() { init();"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_unwrap_window_onload_keeps_later_blocks() {
        assert_eq!(
            unwrap_window_onload("window.onload = function() { jQuery('.a').show(); };\nvar cfg = {a:1};"),
            " jQuery('.a').show(); \nvar cfg = {a:1};"
        );
        assert_eq!(
            unwrap_window_onload("window.onload = function () { if (x) { y(); } }\nz();"),
            " if (x) { y(); } \nz();"
        );
    }
}

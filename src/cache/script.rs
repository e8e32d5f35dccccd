//! Source fixes applied to scripts before they are cached.
//!
//! Cached scripts run after the page has finished loading, so handlers bound
//! to load-time events would never fire. The fixes rebind the common ones and
//! keep relative source maps pointing at the original directory.

use memchr::memmem;

/// Theme hook that only runs on `window.load`; call it right away as well.
const THEME_LOAD_HOOK: (&str, &str) = (
    "$(window).load(et_all_elements_loaded)",
    "$(window).load(et_all_elements_loaded);et_all_elements_loaded()",
);

/// `DOMContentLoaded` has already fired when a deferred script runs; jQuery's
/// ready callback runs immediately in that case.
const DOM_READY_SHIM: (&str, &str) = (
    "document.addEventListener(\"DOMContentLoaded\",function(){",
    "jQuery(document).ready(function(){",
);

const SOURCE_MAP_MARKER: &str = "sourceMappingURL=";

/// Apply every fix to the script found at site path `path`.
pub fn apply_source_fixes(source: &str, path: &str) -> String {
    let fixed = source
        .replace(THEME_LOAD_HOOK.0, THEME_LOAD_HOOK.1)
        .replace(DOM_READY_SHIM.0, DOM_READY_SHIM.1);
    prefix_source_maps(&fixed, source_dir(path))
}

/// Directory part of a site path, without the trailing slash.
fn source_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(end) => &path[..end],
        None => "",
    }
}

/// Point relative `sourceMappingURL=` references at `dir`.
///
/// The cached copy lives in a different directory than the original, so a
/// bare `app.js.map` would no longer resolve.
fn prefix_source_maps(script: &str, dir: &str) -> String {
    let mut output = String::with_capacity(script.len());
    let mut pos = 0;

    for at in memmem::find_iter(script.as_bytes(), SOURCE_MAP_MARKER.as_bytes()) {
        let value_start = at + SOURCE_MAP_MARKER.len();
        let value = &script[value_start..];
        let is_relative = !(value.starts_with('/')
            || value.starts_with("data:")
            || value.starts_with("http:")
            || value.starts_with("https:"));

        output.push_str(&script[pos..value_start]);
        if is_relative {
            output.push_str(dir);
            output.push('/');
        }
        pos = value_start;
    }

    output.push_str(&script[pos..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_ready_shim() {
        let source = "document.addEventListener(\"DOMContentLoaded\",function(){init()});";
        assert_eq!(
            apply_source_fixes(source, "/js/a.js"),
            "jQuery(document).ready(function(){init()});"
        );
    }

    #[test]
    fn test_theme_load_hook() {
        let source = "$(window).load(et_all_elements_loaded);";
        assert_eq!(
            apply_source_fixes(source, "/js/a.js"),
            "$(window).load(et_all_elements_loaded);et_all_elements_loaded();"
        );
    }

    #[test]
    fn test_relative_source_map_prefixed() {
        let source = "var a;\n//# sourceMappingURL=app.js.map";
        assert_eq!(
            apply_source_fixes(source, "/static/js/app.js"),
            "var a;\n//# sourceMappingURL=/static/js/app.js.map"
        );
    }

    #[test]
    fn test_absolute_source_map_untouched() {
        let source = "//# sourceMappingURL=https://cdn.test/app.js.map";
        assert_eq!(apply_source_fixes(source, "/js/app.js"), source);
        let source = "//# sourceMappingURL=/maps/app.js.map";
        assert_eq!(apply_source_fixes(source, "/js/app.js"), source);
    }

    #[test]
    fn test_plain_script_unchanged() {
        assert_eq!(apply_source_fixes("var a=1", "/js/a.js"), "var a=1");
    }
}

//! The client-side loader injected at the end of every optimized page.
//!
//! The browser half lives in `runtime.js` and is parameterized with one JSON
//! object built from [`LoaderParameters`]. It runs five independent chains:
//!
//! 1. fonts: the consolidated font stylesheet after [`Timings::fonts`];
//! 2. internal scripts: vendor descriptors, then the bundle, one at a time,
//!    re-announcing `DOMContentLoaded`/`load` after each; then the deferred
//!    inline scripts, then the `deferpage:ready` event;
//! 3. external scripts: `data-src` scripts once the internal chain is done;
//! 4. stylesheets: deferred stylesheet URLs after `DOMContentLoaded`;
//! 5. lazy media: elements marked [`LAZY_MARKER`] swap in their real source
//!    once near the viewport, see [`reveal`].
//!
//! Any scroll, mouse move or touch starts chains 2 to 4 early.

use serde::{Deserialize, Serialize};

use crate::scan::AttributeMap;

const RUNTIME: &str = include_str!("runtime.js");

/// `data-class` value of media waiting to be revealed.
pub const LAZY_MARKER: &str = "LazyLoad";

/// How far below the viewport, in pixels, media is already revealed.
pub const REVEAL_MARGIN: f64 = 200.0;

/// Milliseconds between periodic lazy-media checks.
pub const REVEAL_INTERVAL_MS: u64 = 3000;

/// Loader delays in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub fonts: u64,
    /// First internal script, on ordinary routes.
    pub internal_js: u64,
    /// First internal script, on fast routes.
    pub internal_js_fast: u64,
    /// After the internal chain, before inline scripts run.
    pub inline_js: u64,
    pub external_js: u64,
    /// After `DOMContentLoaded`, before deferred stylesheets load.
    pub stylesheets: u64,
    /// External scripts delay once the visitor interacts.
    pub interaction_js: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fonts: 200,
            internal_js: 5000,
            internal_js_fast: 100,
            inline_js: 100,
            external_js: 10000,
            stylesheets: 10000,
            interaction_js: 500,
        }
    }
}

impl Timings {
    /// Timings for `route`: fast routes start the internal chain early.
    pub fn for_route(&self, route: &str, fast_routes: &[String]) -> Timings {
        let mut timings = *self;
        if fast_routes.iter().any(|fast| fast == route) {
            timings.internal_js = self.internal_js_fast;
        }
        timings
    }
}

/// Browser-side view of [`Timings`] with the route already applied.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeTimings {
    fonts: u64,
    internal_js: u64,
    inline_js: u64,
    external_js: u64,
    stylesheets: u64,
    interaction_js: u64,
}

impl From<Timings> for RuntimeTimings {
    fn from(t: Timings) -> Self {
        Self {
            fonts: t.fonts,
            internal_js: t.internal_js,
            inline_js: t.inline_js,
            external_js: t.external_js,
            stylesheets: t.stylesheets,
            interaction_js: t.interaction_js,
        }
    }
}

/// Everything the loader needs to know about one page.
#[derive(Debug, Clone, Default)]
pub struct LoaderParameters {
    /// Merged bundle URLs, loaded after the inline script descriptors.
    pub bundle_urls: Vec<String>,
    /// Attribute sets of collected vendor scripts.
    pub inline_scripts: Vec<AttributeMap>,
    pub stylesheet_urls: Vec<String>,
    pub font_urls: Vec<String>,
    /// Timings with the route already applied.
    pub timings: Timings,
    pub menu_selector: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeConfig<'a> {
    bundle_urls: &'a [String],
    inline_scripts: &'a [AttributeMap],
    stylesheet_urls: &'a [String],
    font_urls: &'a [String],
    timings: RuntimeTimings,
    menu_selector: &'a str,
    lazy_marker: &'static str,
    reveal_margin: f64,
    reveal_interval: u64,
}

/// JSON for embedding in a `<script>` element.
///
/// `</` is escaped so no string value can close the element early.
fn script_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json.replace("</", "<\\/"),
        Err(e) => {
            tracing::warn!(error = %e, "could not serialize loader configuration");
            "null".to_string()
        }
    }
}

/// The loader script, without the surrounding `<script>` element.
pub fn generate(params: &LoaderParameters) -> String {
    let config = RuntimeConfig {
        bundle_urls: &params.bundle_urls,
        inline_scripts: &params.inline_scripts,
        stylesheet_urls: &params.stylesheet_urls,
        font_urls: &params.font_urls,
        timings: params.timings.into(),
        menu_selector: &params.menu_selector,
        lazy_marker: LAZY_MARKER,
        reveal_margin: REVEAL_MARGIN,
        reveal_interval: REVEAL_INTERVAL_MS,
    };
    format!("{}({});", RUNTIME.trim_end(), script_json(&config))
}

/// Inline script replaying a click on `selector` made before handlers
/// were attached.
pub fn menu_replay(selector: &str) -> String {
    let selector = script_json(&selector);
    format!(
        "document.addEventListener(\"deferpage:ready\",function(){{\
         if(!window.deferpageMenuClicked)return;window.deferpageMenuClicked=false;\
         setTimeout(function(){{var m=document.querySelector({selector});if(m)m.click();}},50);}});"
    )
}

/// Layout facts about one element, as the browser reports them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Distance of the element's top edge from the viewport top.
    pub top: f64,
    pub window_height: f64,
    pub opacity: f64,
}

/// Apply the lazy-media activation rule to a tag's attributes.
///
/// An element marked [`LAZY_MARKER`] is revealed when its top is non-zero
/// (zero means not laid out), less than [`REVEAL_MARGIN`] below the
/// viewport, and it is not fully transparent. Revealing copies `data-src`
/// and `data-srcset` back, drops the marker and sets `data-done="Loaded"`.
/// This is the rule `runtime.js` applies in the browser.
pub fn reveal(attrs: &mut AttributeMap, bounds: Bounds) -> bool {
    if attrs.get("data-class") != Some(LAZY_MARKER) {
        return false;
    }
    if bounds.top == 0.0
        || bounds.top - bounds.window_height >= REVEAL_MARGIN
        || bounds.opacity == 0.0
    {
        return false;
    }

    if let Some(src) = attrs.non_empty("data-src").map(str::to_string) {
        attrs.insert("src", src);
    }
    if let Some(srcset) = attrs.non_empty("data-srcset").map(str::to_string) {
        attrs.insert("srcset", srcset);
    }
    attrs.remove("data-class");
    attrs.insert("data-done", "Loaded");
    true
}

//! The page optimizer.
//!
//! [`Optimizer::optimize`] runs one document through the whole pipeline:
//!
//! 1. scan the tags of interest ([`scan_tags`]);
//! 2. classify scripts, media and stylesheet links, each classification
//!    registering a literal replacement and, where the resource moves to the
//!    loader, loader parameters;
//! 3. apply every replacement in one pass ([`Replacements::apply`]);
//! 4. inject the inlined stylesheets into the head and the loader before
//!    `</body>`.
//!
//! Nothing here fails the request: a resource that cannot be processed is
//! left as it was.

mod inject;
mod media;
mod scripts;
mod styles;

use std::collections::HashSet;
use std::path::PathBuf;

use url::Url;

pub use inject::{insert_before_body_end, insert_head_style};
pub use media::youtube_id;
pub use scripts::{is_javascript_type, should_defer_inline, unwrap_window_onload};

use crate::cache::CacheStore;
use crate::config::DeferConfig;
use crate::loader::{self, LoaderParameters};
use crate::replace::Replacements;
use crate::scan::{AttributeMap, TagKind, scan_tags};
use crate::stylesheet::FontRequests;
use crate::util::read_text;

/// Per-request inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    /// Host the request was made to, with port when non-default.
    pub host: String,
    /// Route identifier, e.g. `catalog_product_view`.
    pub route: String,
}

impl PageContext {
    pub fn new(host: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            route: route.into(),
        }
    }
}

/// What the optimizer did to one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub merged_scripts: usize,
    pub deferred_scripts: usize,
    pub deferred_inline_scripts: usize,
    pub vendor_scripts: usize,
    pub inlined_stylesheets: usize,
    pub deferred_stylesheets: usize,
    pub font_links: usize,
    pub lazy_media: usize,
    /// Resources skipped because of an exclusion list.
    pub excluded: usize,
}

/// An optimized document.
#[derive(Debug, Clone, Default)]
pub struct Optimized {
    pub html: String,
    /// Every font family requested by the page.
    pub fonts: FontRequests,
    pub stats: OptimizeStats,
}

impl Optimized {
    fn unchanged(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Default::default()
        }
    }
}

/// A stylesheet to be inlined into the head.
#[derive(Debug, Clone)]
struct InlineStyle {
    file: PathBuf,
    media: Option<String>,
}

/// State of one optimization pass.
struct Pass<'a> {
    config: &'a DeferConfig,
    page: &'a PageContext,
    base: Url,
    cache: CacheStore,
    replacements: Replacements,
    fonts: FontRequests,
    merge_paths: Vec<String>,
    inline_scripts: Vec<AttributeMap>,
    seen_vendor: HashSet<String>,
    stylesheet_urls: Vec<String>,
    inline_styles: Vec<InlineStyle>,
    stats: OptimizeStats,
}

impl Pass<'_> {
    /// Whether any of `patterns` occurs in `text`.
    fn matches_any(text: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|pattern| !pattern.is_empty() && text.contains(pattern.as_str()))
    }

    /// `<style>` contents for every inlined stylesheet, in link order.
    fn inline_css(&self) -> String {
        let mut css = String::new();
        for style in &self.inline_styles {
            let text = match read_text(&style.file) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(file = %style.file.display(), error = %e, "could not read cached stylesheet");
                    continue;
                }
            };
            match &style.media {
                Some(media) => {
                    css.push_str("@media ");
                    css.push_str(media);
                    css.push('{');
                    css.push_str(&text);
                    css.push('}');
                }
                None => css.push_str(&text),
            }
        }
        css
    }

    fn loader_parameters(&self, bundle: Option<String>) -> LoaderParameters {
        LoaderParameters {
            bundle_urls: bundle.map(|path| self.cache.url_for(&path)).into_iter().collect(),
            inline_scripts: self.inline_scripts.clone(),
            stylesheet_urls: self.stylesheet_urls.clone(),
            font_urls: self.fonts.consolidated_url().into_iter().collect(),
            timings: self
                .config
                .timings
                .for_route(&self.page.route, &self.config.fast_routes),
            menu_selector: self.config.menu_selector.clone(),
        }
    }
}

/// Rewrites pages of one site for deferred loading.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: DeferConfig,
}

impl Optimizer {
    pub fn new(config: DeferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeferConfig {
        &self.config
    }

    /// Rewrite `html` for deferred loading.
    ///
    /// Returns the document unchanged when the configured base URL or cache
    /// directory is unusable.
    pub fn optimize(&self, html: &str, page: &PageContext) -> Optimized {
        let cache = match CacheStore::new(&self.config, &page.host) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(error = %e, "optimizer disabled for this site");
                return Optimized::unchanged(html);
            }
        };
        let base = cache.base_url().clone();

        let mut pass = Pass {
            config: &self.config,
            page,
            base,
            cache,
            replacements: Replacements::new(),
            fonts: FontRequests::new(),
            merge_paths: Vec::new(),
            inline_scripts: Vec::new(),
            seen_vendor: HashSet::new(),
            stylesheet_urls: Vec::new(),
            inline_styles: Vec::new(),
            stats: OptimizeStats::default(),
        };

        let tags = scan_tags(html);
        scripts::classify(&mut pass, tags.of(TagKind::Script));
        let bundle = pass.cache.merge_js(&pass.merge_paths);
        media::classify_images(&mut pass, tags.of(TagKind::Img));
        media::classify_iframes(&mut pass, tags.of(TagKind::Iframe));
        media::classify_videos(&mut pass, tags.of(TagKind::Video));
        styles::classify(&mut pass, tags.of(TagKind::Link));

        let mut output = pass.replacements.apply(html);

        let css = pass.inline_css();
        if !css.is_empty() {
            output = insert_head_style(&output, &css);
        }

        let params = pass.loader_parameters(bundle);
        let snippet = format!(
            "<script>{}</script><script>{}</script>",
            loader::generate(&params),
            loader::menu_replay(&params.menu_selector)
        );
        output = insert_before_body_end(&output, &snippet);

        tracing::debug!(
            host = %page.host,
            route = %page.route,
            replacements = pass.replacements.len(),
            stats = ?pass.stats,
            "optimized page"
        );

        Optimized {
            html: output,
            fonts: pass.fonts,
            stats: pass.stats,
        }
    }
}

//! Seams to the web application hosting the optimizer.
//!
//! The host decides whether optimization is on, owns the response and knows
//! where the site lives. [`process_response`] ties those together.

use std::path::{Path, PathBuf};

use crate::config::DeferConfig;
use crate::optimize::{Optimizer, PageContext};

/// Whether optimization is enabled for the current request.
pub trait EnablementFlag {
    fn is_enabled(&self) -> bool;
}

impl EnablementFlag for bool {
    fn is_enabled(&self) -> bool {
        *self
    }
}

/// A response whose HTML body can be read and replaced.
pub trait ResponseBody {
    /// The body, or `None` when the response has none.
    fn body(&self) -> Option<String>;
    fn set_body(&mut self, body: String);
}

impl ResponseBody for String {
    fn body(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.clone())
    }

    fn set_body(&mut self, body: String) {
        *self = body;
    }
}

/// Where the site lives on the web and on disk.
pub trait SiteLocation {
    /// Absolute base URL, e.g. `https://shop.test/`.
    fn base_url(&self) -> &str;
    fn root_dir(&self) -> &Path;
    /// Media directory the cache is created in.
    fn media_dir(&self) -> &Path;
}

impl SiteLocation for DeferConfig {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}

impl DeferConfig {
    /// Default configuration for the site described by `site`.
    pub fn from_site<S: SiteLocation + ?Sized>(site: &S) -> Self {
        DeferConfig::new(
            site.base_url(),
            PathBuf::from(site.root_dir()),
            PathBuf::from(site.media_dir()),
        )
    }
}

/// Optimize `response` in place.
///
/// Does nothing when `flag` is off or the response has no body. An empty
/// result never replaces the body. Returns whether the body was replaced.
pub fn process_response<F, R>(flag: &F, optimizer: &Optimizer, page: &PageContext, response: &mut R) -> bool
where
    F: EnablementFlag + ?Sized,
    R: ResponseBody + ?Sized,
{
    if !flag.is_enabled() {
        return false;
    }
    let Some(body) = response.body() else {
        return false;
    };

    let optimized = optimizer.optimize(&body, page);
    if optimized.html.is_empty() {
        return false;
    }
    response.set_body(optimized.html);
    true
}

//! # deferpage
//!
//! Rewrites rendered HTML pages so that scripts, stylesheets, fonts and media
//! load late instead of blocking the first paint.
//!
//! ## Features
//!
//! - Local scripts merged into one cached bundle, loaded after a delay
//! - External scripts moved to `data-src` and loaded after the bundle
//! - jQuery-dependent inline scripts deferred until the bundle has run
//! - Local stylesheets absolutized, minified and inlined into the head
//! - Google Fonts requests consolidated into one late request
//! - Images, iframes and videos lazy-loaded near the viewport
//!
//! ## Quick Start
//!
//! ```no_run
//! use deferpage::{DeferConfig, Optimizer, PageContext};
//!
//! let config = DeferConfig::new("https://shop.test/", "/srv/shop", "/srv/shop/pub/media");
//! let optimizer = Optimizer::new(config);
//!
//! let page = PageContext::new("shop.test", "cms_index_index");
//! let optimized = optimizer.optimize("<html><head></head><body></body></html>", &page);
//! println!("{}", optimized.html);
//! ```
//!
//! Scanning is substring based and bounded, see [`scan`]; the document is
//! rewritten in a single pass at the end, see [`replace`].

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod optimize;
pub(crate) mod patterns;
pub mod replace;
pub mod scan;
pub mod stylesheet;
pub(crate) mod util;

pub use cache::{CachePolicy, CacheStore};
pub use config::DeferConfig;
pub use error::{Error, Result};
pub use host::{EnablementFlag, ResponseBody, SiteLocation, process_response};
pub use loader::{LoaderParameters, Timings};
pub use optimize::{OptimizeStats, Optimized, Optimizer, PageContext};
pub use replace::Replacements;
pub use scan::{AttributeMap, TagKind, TagOccurrence, scan_tags};
pub use stylesheet::{CssRewriter, FontRequests};

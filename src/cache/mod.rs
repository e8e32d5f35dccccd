//! Content-addressed cache of processed assets.
//!
//! Layout below `<media_dir>/cache/defer`:
//!
//! ```text
//! js/<sha1(path)>.js            fixed-up copy of one script
//! css/<sha1(path)>.css          absolutized, minified stylesheet
//! css/<sha1(path)>.fonts.json   font families the stylesheet imported
//! all-js/<sha1(paths)>js        concatenation of a page's scripts
//! ```
//!
//! Keys are the lowercase hex SHA-1 of the site-relative source path, or of
//! the concatenated paths for a bundle, so the same inputs always land on the
//! same file. Writes go through a temporary file in the target directory and
//! are renamed into place, so a reader never sees a half-written entry.

pub mod script;

use std::fs;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::NamedTempFile;
use url::Url;

use crate::config::DeferConfig;
use crate::error::{Error, Result};
use crate::stylesheet::{CssRewriter, FontRequests, minify};
use crate::util::{has_extension, read_text, root_relative, site_file};

/// When an existing cache entry may be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Rebuild when any source is newer than the entry.
    #[default]
    SourceModified,
    /// Serve any entry that exists; entries are never rebuilt.
    ExistenceOnly,
}

/// Lowercase hex SHA-1 of `input`.
pub fn cache_key(input: &str) -> String {
    sha1_smol::Sha1::from(input).digest().to_string()
}

/// Write `contents` to `target` atomically, creating parent directories.
fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| Error::OutsideRoot(target.display().to_string()))?;
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    // Entries are served by the web server, which may run as another user.
    #[cfg(unix)]
    temp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    temp.persist(target)?;
    Ok(())
}

/// Cache of processed scripts and stylesheets for one site.
///
/// A store is cheap to build and is created once per request, since CSS
/// rewriting needs the host the request came in on.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    dir: PathBuf,
    base: Url,
    host: String,
    policy: CachePolicy,
}

impl CacheStore {
    /// Build a store for `config`, serving requests made to `host`.
    ///
    /// Fails when the base URL does not parse or the cache directory is not
    /// below the site root, since cached files must be reachable by URL.
    pub fn new(config: &DeferConfig, host: &str) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        let dir = config.cache_dir();
        if root_relative(&config.root_dir, &dir).is_none() {
            return Err(Error::OutsideRoot(dir.display().to_string()));
        }

        Ok(Self {
            root: config.root_dir.clone(),
            dir,
            base,
            host: host.to_string(),
            policy: config.cache_policy,
        })
    }

    /// Directory all entries live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Cached copy of the source at site path `path`.
    ///
    /// Returns the site-relative path of the entry, or `None` when the path
    /// is neither a script nor a stylesheet, or the source cannot be read.
    /// Fonts found while rewriting a stylesheet (or recorded for a cached
    /// one) are merged into `fonts`.
    pub fn resolve(&self, path: &str, fonts: &mut FontRequests) -> Option<String> {
        let result = if has_extension(path, ".js") {
            self.cache_script(path)
        } else if has_extension(path, ".css") {
            self.cache_stylesheet(path, fonts)
        } else {
            return None;
        };

        match result {
            Ok(cached) => Some(cached),
            Err(Error::MissingSource(source)) => {
                tracing::trace!(path, source = %source, "no source to cache");
                None
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "could not cache asset");
                None
            }
        }
    }

    /// Concatenate the cached copies of `paths` into one bundle.
    ///
    /// Each part is followed by `;\n`. Parts whose source cannot be cached are
    /// left out. Returns the bundle's site-relative path, or `None` for an
    /// empty list.
    pub fn merge_js(&self, paths: &[String]) -> Option<String> {
        if paths.is_empty() {
            return None;
        }

        match self.write_bundle(paths) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(count = paths.len(), error = %e, "could not write script bundle");
                None
            }
        }
    }

    /// Absolute URL of a site-relative path.
    pub fn url_for(&self, path: &str) -> String {
        match self.base.join(path) {
            Ok(url) => url.to_string(),
            Err(_) => path.to_string(),
        }
    }

    /// Absolute URL of a file stored directly in the cache directory.
    pub fn asset_url(&self, name: &str) -> String {
        match self.relative(&self.dir.join(name)) {
            Ok(path) => self.url_for(&path),
            Err(_) => name.to_string(),
        }
    }

    /// URL of the placeholder `name` in the cache directory.
    ///
    /// The file is created from `contents` when it does not exist yet.
    pub fn placeholder_url(&self, name: &str, contents: &[u8]) -> String {
        let file = self.dir.join(name);
        if !file.exists()
            && let Err(e) = write_atomic(&file, contents)
        {
            tracing::warn!(file = %file.display(), error = %e, "could not write placeholder");
        }
        self.asset_url(name)
    }

    /// Filesystem location of a site-relative path.
    pub fn file_for(&self, path: &str) -> Result<PathBuf> {
        site_file(&self.root, path)
    }

    fn relative(&self, file: &Path) -> Result<String> {
        root_relative(&self.root, file).ok_or_else(|| Error::OutsideRoot(file.display().to_string()))
    }

    /// Whether `target` exists and may be served without rebuilding.
    ///
    /// A source that cannot be inspected never invalidates an entry.
    fn is_fresh(&self, target: &Path, sources: &[&Path]) -> bool {
        let Ok(meta) = fs::metadata(target) else {
            return false;
        };

        match self.policy {
            CachePolicy::ExistenceOnly => true,
            CachePolicy::SourceModified => {
                let Ok(cached_at) = meta.modified() else {
                    return true;
                };
                sources.iter().all(|source| {
                    fs::metadata(source)
                        .and_then(|m| m.modified())
                        .map(|modified| modified <= cached_at)
                        .unwrap_or(true)
                })
            }
        }
    }

    fn script_entry(&self, path: &str) -> PathBuf {
        self.dir.join("js").join(format!("{}.js", cache_key(path)))
    }

    fn cache_script(&self, path: &str) -> Result<String> {
        let source = site_file(&self.root, path)?;
        let target = self.script_entry(path);

        if !self.is_fresh(&target, &[source.as_path()]) {
            if !source.is_file() {
                return Err(Error::MissingSource(source.display().to_string()));
            }
            let text = read_text(&source)?;
            write_atomic(&target, script::apply_source_fixes(&text, path).as_bytes())?;
            tracing::debug!(path, entry = %target.display(), "cached script");
        }

        self.relative(&target)
    }

    fn cache_stylesheet(&self, path: &str, fonts: &mut FontRequests) -> Result<String> {
        let source = site_file(&self.root, path)?;
        let key = cache_key(path);
        let target = self.dir.join("css").join(format!("{key}.css"));
        let manifest = self.dir.join("css").join(format!("{key}.fonts.json"));

        if self.is_fresh(&target, &[source.as_path()]) {
            self.replay_fonts(&manifest, fonts);
            return self.relative(&target);
        }

        if !source.is_file() {
            return Err(Error::MissingSource(source.display().to_string()));
        }
        let text = read_text(&source)?;
        let stylesheet_url = self.base.join(path)?;

        let mut found = FontRequests::new();
        let rewriter = CssRewriter::new(&self.root, &self.host);
        let css = minify(&rewriter.absolutize(&stylesheet_url, &text, &mut found));
        write_atomic(&target, css.as_bytes())?;

        if found.is_empty() {
            match fs::remove_file(&manifest) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        } else {
            write_atomic(&manifest, &serde_json::to_vec(&found)?)?;
        }
        fonts.merge(&found);

        tracing::debug!(path, entry = %target.display(), fonts = found.len(), "cached stylesheet");
        self.relative(&target)
    }

    /// Merge the fonts recorded for a cached stylesheet into `fonts`.
    fn replay_fonts(&self, manifest: &Path, fonts: &mut FontRequests) {
        let Ok(bytes) = fs::read(manifest) else {
            return;
        };
        match serde_json::from_slice::<FontRequests>(&bytes) {
            Ok(recorded) => fonts.merge(&recorded),
            Err(e) => tracing::warn!(manifest = %manifest.display(), error = %e, "unreadable font manifest"),
        }
    }

    fn write_bundle(&self, paths: &[String]) -> Result<String> {
        let target = self
            .dir
            .join("all-js")
            .join(format!("{}js", cache_key(&paths.concat())));

        let sources: Vec<PathBuf> = paths
            .iter()
            .filter_map(|path| site_file(&self.root, path).ok())
            .collect();
        let source_refs: Vec<&Path> = sources.iter().map(PathBuf::as_path).collect();

        if !self.is_fresh(&target, &source_refs) {
            let mut bundle = String::new();
            for path in paths {
                match self.cache_script(path).and_then(|_| read_text(&self.script_entry(path))) {
                    Ok(text) => {
                        bundle.push_str(&text);
                        bundle.push_str(";\n");
                    }
                    Err(e) => tracing::warn!(path, error = %e, "left script out of bundle"),
                }
            }
            write_atomic(&target, bundle.as_bytes())?;
            tracing::debug!(parts = paths.len(), entry = %target.display(), "wrote script bundle");
        }

        self.relative(&target)
    }
}

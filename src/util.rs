//! Text decoding and URL/path helpers shared by the pipeline.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};

/// Decode source bytes to a string.
///
/// Tries UTF-8 first (a BOM is dropped by encoding_rs) and falls back to
/// Windows-1252, which is what hand-edited theme assets tend to be in.
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Read a source file as text.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text(&bytes).into_owned())
}

/// Drop every path segment containing `version`.
///
/// Static-asset deployments put a cache-busting segment such as
/// `version1583765443` into asset URLs; the file on disk lives without it.
pub fn strip_version_segments(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.contains("version"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Check whether `name` ends with `extension`, ignoring any query string.
pub fn has_extension(name: &str, extension: &str) -> bool {
    let without_query = name.split('?').next().unwrap_or_default();
    without_query.len() >= extension.len() && without_query.ends_with(extension)
}

/// Host (with port, when one is given) named explicitly by `href`.
///
/// Relative references and scheme-only URLs such as `data:` have none.
pub fn explicit_host(href: &str) -> Option<String> {
    let href = href.trim();
    let parsed = match href.strip_prefix("//") {
        Some(rest) => Url::parse(&format!("http://{rest}")),
        None => Url::parse(href),
    };
    let url = parsed.ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// A reference is external when it names a host other than the current one.
pub fn is_external(href: &str, current_host: &str) -> bool {
    explicit_host(href).is_some_and(|host| !host.eq_ignore_ascii_case(current_host))
}

/// Site-relative path (`/js/app.js`) of `href`, resolved against `base`.
pub fn site_path(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|url| url.path().to_string())
}

/// Map a site-relative path onto the filesystem below `root`.
///
/// The path is percent-decoded; parent-directory components are refused so a
/// crafted URL cannot read outside the site.
pub fn site_file(root: &Path, path: &str) -> Result<PathBuf> {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let relative = Path::new(decoded.trim_start_matches('/'));

    let mut file = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => file.push(part),
            Component::CurDir => {}
            _ => return Err(Error::OutsideRoot(path.to_string())),
        }
    }
    Ok(file)
}

/// Inverse of [`site_file`]: strip `root` and express the rest as `/a/b`.
pub fn root_relative(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(format!("/{}", parts.join("/")))
}

//! Stylesheet rewriting for inlining.
//!
//! A stylesheet moved into a `<style>` block (or into the cache directory)
//! no longer sits next to the files it references, so every relative `url()`
//! is made absolute against the stylesheet's own URL. Local `@import`s of
//! other stylesheets are inlined recursively and Google Fonts imports are
//! pulled out into [`FontRequests`].

pub mod fonts;

use std::ops::Range;
use std::path::Path;

use cssparser::{ParseError, Parser, ParserInput, Token};
use memchr::memmem;
use url::Url;

pub use fonts::{FontRequests, GOOGLE_FONTS_HOST, is_google_fonts};

use crate::scan::scan_spans;
use crate::util::{explicit_host, has_extension, is_external, read_text, site_file};

type CssParseError<'i> = ParseError<'i, ()>;

/// Nesting depth past which `@import`s are left as references.
pub const IMPORT_DEPTH_LIMIT: usize = 8;

/// Rewrites the references of stylesheets served by one site.
#[derive(Debug, Clone, Copy)]
pub struct CssRewriter<'a> {
    root: &'a Path,
    host: &'a str,
}

impl<'a> CssRewriter<'a> {
    /// `root` is where imported stylesheets are read from; `host` is the
    /// host of the current request.
    pub fn new(root: &'a Path, host: &'a str) -> Self {
        Self { root, host }
    }

    /// Make the references of `css`, found at `stylesheet_url`, absolute.
    ///
    /// - `data:` URIs and fragment-only references are left alone.
    /// - Google Fonts references are recorded in `fonts`; an `@import` of one
    ///   is removed from the output.
    /// - References to other hosts, and absolute ones, are left alone.
    /// - A local `@import` of a `.css` file is replaced by that file's
    ///   rewritten contents.
    /// - Everything else becomes `url(<absolute URL>)`.
    pub fn absolutize(&self, stylesheet_url: &Url, css: &str, fonts: &mut FontRequests) -> String {
        self.rewrite(stylesheet_url, css, fonts, 0)
    }

    fn rewrite(&self, stylesheet_url: &Url, css: &str, fonts: &mut FontRequests, depth: usize) -> String {
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        for span in scan_spans(css, "url(", ")") {
            let Some(reference) = url_reference(&css[span.clone()]) else {
                continue;
            };
            if reference.starts_with('#') || reference.starts_with("data:") {
                continue;
            }
            let import = import_statement(css, &span);

            if is_google_fonts(&reference) {
                if fonts.consolidate(&reference)
                    && let Some(statement) = import
                {
                    edits.push((statement, String::new()));
                }
                continue;
            }
            if is_external(&reference, self.host) {
                continue;
            }

            let Ok(target) = stylesheet_url.join(&reference) else {
                continue;
            };

            if let Some(statement) = import
                && has_extension(&reference, ".css")
            {
                match self.inline_import(&target, fonts, depth) {
                    Some(inlined) => {
                        edits.push((statement, inlined));
                        continue;
                    }
                    None => tracing::trace!(url = %target, depth, "left @import in place"),
                }
            }

            if reference.starts_with('/') || explicit_host(&reference).is_some() {
                continue;
            }
            edits.push((span, format!("url({target})")));
        }

        apply_edits(css, edits)
    }

    /// Rewritten contents of the stylesheet at `target`.
    fn inline_import(&self, target: &Url, fonts: &mut FontRequests, depth: usize) -> Option<String> {
        if depth >= IMPORT_DEPTH_LIMIT {
            tracing::warn!(url = %target, "@import nesting too deep");
            return None;
        }
        let file = site_file(self.root, target.path()).ok()?;
        let text = read_text(&file).ok()?;
        Some(self.rewrite(target, &text, fonts, depth + 1))
    }
}

/// The reference inside one `url(...)` token, quotes removed.
fn url_reference(token: &str) -> Option<String> {
    let mut input = ParserInput::new(token);
    let mut parser = Parser::new(&mut input);
    let mut found = None;

    match parser.next() {
        Ok(Token::UnquotedUrl(url)) => found = Some(url.to_string()),
        Ok(Token::Function(name)) if name.eq_ignore_ascii_case("url") => {
            let _ = parser.parse_nested_block(|p| {
                if let Ok(Token::QuotedString(url)) = p.next() {
                    found = Some(url.to_string());
                }
                Ok::<_, CssParseError>(())
            });
        }
        _ => {}
    }

    found
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

/// Range of the `@import ... ;` statement whose `url()` is `span`, if any.
fn import_statement(css: &str, span: &Range<usize>) -> Option<Range<usize>> {
    let before = css[..span.start].trim_end();
    if before.len() < 7 || !before.is_char_boundary(before.len() - 7) {
        return None;
    }
    let keyword_start = before.len() - 7;
    if !before[keyword_start..].eq_ignore_ascii_case("@import") {
        return None;
    }

    let end = match memchr::memchr(b';', &css.as_bytes()[span.end..]) {
        Some(offset) => span.end + offset + 1,
        None => span.end,
    };
    Some(keyword_start..end)
}

/// Apply non-overlapping positional edits; later overlapping ones are dropped.
fn apply_edits(css: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    if edits.is_empty() {
        return css.to_string();
    }
    edits.sort_by_key(|(range, _)| range.start);

    let mut output = String::with_capacity(css.len());
    let mut pos = 0;
    for (range, replacement) in edits {
        if range.start < pos {
            continue;
        }
        output.push_str(&css[pos..range.start]);
        output.push_str(&replacement);
        pos = range.end;
    }
    output.push_str(&css[pos..]);
    output
}

/// Drop `/* ... */` comments, collapse whitespace runs to one space and trim.
///
/// An unterminated comment is kept as text.
pub fn minify(css: &str) -> String {
    let bytes = css.as_bytes();
    let close = memmem::Finder::new(b"*/");
    let mut without_comments = String::with_capacity(css.len());
    let mut pos = 0;

    while let Some(open) = memmem::find(&bytes[pos..], b"/*").map(|p| p + pos) {
        let Some(end) = close.find(&bytes[open + 2..]).map(|p| p + open + 4) else {
            break;
        };
        without_comments.push_str(&css[pos..open]);
        pos = end;
    }
    without_comments.push_str(&css[pos..]);

    let mut output = String::with_capacity(without_comments.len());
    let mut in_space = false;
    for ch in without_comments.chars() {
        if matches!(ch, ' ' | '\t' | '\n' | '\r') {
            if !in_space {
                output.push(' ');
            }
            in_space = true;
        } else {
            output.push(ch);
            in_space = false;
        }
    }

    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn absolutize(css: &str) -> (String, FontRequests) {
        let mut fonts = FontRequests::new();
        let rewriter = CssRewriter::new(Path::new("/nonexistent"), "shop.test");
        let out = rewriter.absolutize(&url("https://shop.test/static/css/a.css"), css, &mut fonts);
        (out, fonts)
    }

    #[test]
    fn test_relative_urls_made_absolute() {
        let (css, _) = absolutize(".a{background:url(../img/x.png)} .b{background:url('y.png')}");
        assert_eq!(
            css,
            ".a{background:url(https://shop.test/static/img/x.png)} \
             .b{background:url(https://shop.test/static/css/y.png)}"
        );
    }

    #[test]
    fn test_absolute_external_and_data_untouched() {
        let input = ".a{background:url(/img/x.png)} .b{background:url(https://cdn.test/y.png)} \
                     .c{background:url(data:image/png;base64,AAAA)} .d{filter:url(#f)}";
        let (css, _) = absolutize(input);
        assert_eq!(css, input);
    }

    #[test]
    fn test_google_fonts_import_removed() {
        let (css, fonts) = absolutize(
            "@import url('https://fonts.googleapis.com/css?family=Roboto:400');body{margin:0}",
        );
        assert_eq!(css, "body{margin:0}");
        assert!(fonts.variants("Roboto").unwrap().contains("400"));
    }

    #[test]
    fn test_local_import_inlined() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("css/base")).unwrap();
        fs::write(temp.path().join("css/base/reset.css"), "p{background:url(p.png)}").unwrap();

        let mut fonts = FontRequests::new();
        let rewriter = CssRewriter::new(temp.path(), "shop.test");
        let css = rewriter.absolutize(
            &url("https://shop.test/css/main.css"),
            "@import url(base/reset.css);a{color:red}",
            &mut fonts,
        );
        assert_eq!(css, "p{background:url(https://shop.test/css/base/p.png)}a{color:red}");
    }

    #[test]
    fn test_missing_import_made_absolute() {
        let (css, _) = absolutize("@import url(missing.css);");
        assert_eq!(css, "@import url(https://shop.test/static/css/missing.css);");
    }

    #[test]
    fn test_self_import_stops_at_depth_limit() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("loop.css"), "@import url(loop.css);a{b:c}").unwrap();

        let mut fonts = FontRequests::new();
        let rewriter = CssRewriter::new(temp.path(), "shop.test");
        let css = rewriter.absolutize(
            &url("https://shop.test/loop.css"),
            "@import url(loop.css);a{b:c}",
            &mut fonts,
        );
        assert_eq!(css.matches("a{b:c}").count(), IMPORT_DEPTH_LIMIT + 1);
    }

    #[test]
    fn test_minify() {
        assert_eq!(
            minify("  /* header */\n.a {\r\n\tcolor:  red; /* inline */ }\n"),
            ".a { color: red; }"
        );
        assert_eq!(minify("a{} /* open"), "a{} /* open");
        assert_eq!(minify(""), "");
    }

    #[test]
    fn test_import_statement_bounds() {
        let css = "@import url(a.css) screen;b{}";
        let span = scan_spans(css, "url(", ")")[0].clone();
        assert_eq!(&css[import_statement(css, &span).unwrap()], "@import url(a.css) screen;");
        let css = "a{background:url(x.png)}";
        let span = scan_spans(css, "url(", ")")[0].clone();
        assert_eq!(import_statement(css, &span), None);
    }
}

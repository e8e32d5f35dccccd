//! Bounded substring scanning for the tags the optimizer cares about.
//!
//! This is deliberately not a parser. Each tag kind is described by an opening
//! and a closing delimiter; an occurrence is the exact text from the opening
//! delimiter through the first closing delimiter after it. Comments are cut
//! out of the scanned copy first so commented-out markup is never touched.
//!
//! Every scan is capped at [`SCAN_LIMIT`] occurrences, which keeps adversarial
//! or malformed input from turning one request into an unbounded loop.

pub mod attributes;

use std::ops::Range;

use memchr::memmem;

pub use attributes::{AttributeMap, inline_script_body, parse_attributes};

/// Maximum number of occurrences collected by one delimiter scan.
pub const SCAN_LIMIT: usize = 500;

/// The tag kinds extracted from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Script,
    Img,
    Link,
    Iframe,
    Video,
}

impl TagKind {
    /// All kinds, in scan order.
    pub const ALL: [TagKind; 5] = [
        TagKind::Script,
        TagKind::Img,
        TagKind::Link,
        TagKind::Iframe,
        TagKind::Video,
    ];

    /// Element name as it appears in markup.
    pub fn name(self) -> &'static str {
        match self {
            TagKind::Script => "script",
            TagKind::Img => "img",
            TagKind::Link => "link",
            TagKind::Iframe => "iframe",
            TagKind::Video => "video",
        }
    }

    /// Opening and closing delimiters of one occurrence.
    ///
    /// Scripts and videos run to their end tag so the body is captured;
    /// the other kinds stop at the end of the opening tag.
    pub fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            TagKind::Script => ("<script", "</script>"),
            TagKind::Img => ("<img", ">"),
            TagKind::Link => ("<link", ">"),
            TagKind::Iframe => ("<iframe", ">"),
            TagKind::Video => ("<video", "</video>"),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One captured tag: the exact substring between (and including) its delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOccurrence {
    pub kind: TagKind,
    pub raw: String,
}

/// Occurrences of every [`TagKind`], each list in document order.
#[derive(Debug, Clone, Default)]
pub struct ScannedTags {
    by_kind: [Vec<TagOccurrence>; 5],
}

impl ScannedTags {
    /// Occurrences of one kind.
    pub fn of(&self, kind: TagKind) -> &[TagOccurrence] {
        &self.by_kind[kind.index()]
    }

    /// Total number of occurrences across kinds.
    pub fn len(&self) -> usize {
        self.by_kind.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Byte ranges of up to [`SCAN_LIMIT`] `start ... end` occurrences.
///
/// The closing delimiter is the first one after the opening delimiter; the
/// cursor then resumes after it. An opening delimiter with no closing one
/// ends the scan, since no later opening could be closed either.
pub fn scan_spans(text: &str, start: &str, end: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if start.is_empty() || end.is_empty() {
        return spans;
    }

    let bytes = text.as_bytes();
    let start_finder = memmem::Finder::new(start.as_bytes());
    let end_finder = memmem::Finder::new(end.as_bytes());
    let mut cursor = 0;

    for _ in 0..SCAN_LIMIT {
        let Some(open) = start_finder.find(&bytes[cursor..]).map(|p| p + cursor) else {
            break;
        };
        let after_open = open + start.len();
        let Some(close) = end_finder.find(&bytes[after_open..]).map(|p| p + after_open) else {
            break;
        };
        let stop = close + end.len();
        spans.push(open..stop);
        cursor = stop;
    }

    spans
}

/// Substrings of up to [`SCAN_LIMIT`] `start ... end` occurrences.
pub fn scan_between<'a>(text: &'a str, start: &str, end: &str) -> Vec<&'a str> {
    scan_spans(text, start, end)
        .into_iter()
        .map(|span| &text[span])
        .collect()
}

/// Remove every `<!-- ... -->` block.
pub fn strip_comments(html: &str) -> String {
    let spans = scan_spans(html, "<!--", "-->");
    if spans.is_empty() {
        return html.to_string();
    }

    let mut output = String::with_capacity(html.len());
    let mut pos = 0;
    for span in spans {
        output.push_str(&html[pos..span.start]);
        pos = span.end;
    }
    output.push_str(&html[pos..]);
    output
}

/// Extract every tag of interest from `html`.
///
/// Pure: the document itself is not modified, scanning runs over a copy with
/// comments removed.
pub fn scan_tags(html: &str) -> ScannedTags {
    let text = strip_comments(html);
    let mut tags = ScannedTags::default();

    for kind in TagKind::ALL {
        let (start, end) = kind.delimiters();
        tags.by_kind[kind.index()] = scan_between(&text, start, end)
            .into_iter()
            .map(|raw| TagOccurrence {
                kind,
                raw: raw.to_string(),
            })
            .collect();
    }

    tracing::trace!(
        scripts = tags.of(TagKind::Script).len(),
        images = tags.of(TagKind::Img).len(),
        links = tags.of(TagKind::Link).len(),
        iframes = tags.of(TagKind::Iframe).len(),
        videos = tags.of(TagKind::Video).len(),
        "scanned document"
    );

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scan_in_document_order() {
        let html = r#"<img src="a.png"><p>x</p><img src="b.png" />"#;
        let tags = scan_tags(html);
        let imgs: Vec<_> = tags.of(TagKind::Img).iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(imgs, vec![r#"<img src="a.png">"#, r#"<img src="b.png" />"#]);
    }

    #[test]
    fn test_scan_script_includes_body() {
        let html = "<head><script>var a = 1;</script><script src=\"/x.js\"></script></head>";
        let tags = scan_tags(html);
        let scripts = tags.of(TagKind::Script);
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].raw, "<script>var a = 1;</script>");
        assert_eq!(scripts[1].kind, TagKind::Script);
    }

    #[test]
    fn test_scan_at_document_start() {
        let tags = scan_tags("<link rel=\"stylesheet\" href=\"/a.css\">");
        assert_eq!(tags.of(TagKind::Link).len(), 1);
    }

    #[test]
    fn test_comments_are_ignored() {
        let html = "<!-- <img src=\"hidden.png\"> --><img src=\"shown.png\">";
        let tags = scan_tags(html);
        let imgs = tags.of(TagKind::Img);
        assert_eq!(imgs.len(), 1);
        assert!(imgs[0].raw.contains("shown.png"));
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("a<!-- x -->b<!--y-->c"), "abc");
        assert_eq!(strip_comments("a<!-- unterminated"), "a<!-- unterminated");
    }

    #[test]
    fn test_video_runs_to_end_tag() {
        let html = r#"<video controls><source src="/v.mp4"></video>"#;
        let tags = scan_tags(html);
        assert_eq!(tags.of(TagKind::Video)[0].raw, html);
    }

    #[test]
    fn test_unterminated_openings_terminate() {
        let html = "<script ".repeat(1000);
        let tags = scan_tags(&html);
        assert!(tags.of(TagKind::Script).len() <= SCAN_LIMIT);
    }

    #[test]
    fn test_scan_stops_at_limit() {
        let html = "<script>1</script>".repeat(SCAN_LIMIT * 2);
        let tags = scan_tags(&html);
        assert_eq!(tags.of(TagKind::Script).len(), SCAN_LIMIT);
    }

    #[test]
    fn test_scan_between_css_urls() {
        let css = "a{background:url(a.png)} b{background:url('b.png')}";
        assert_eq!(scan_between(css, "url(", ")"), vec!["url(a.png)", "url('b.png')"]);
    }

    proptest! {
        #[test]
        fn prop_scan_is_bounded_and_exact(input in "(<img|>|<script|</script>|x| ){0,400}") {
            let tags = scan_tags(&input);
            for kind in TagKind::ALL {
                let found = tags.of(kind);
                prop_assert!(found.len() <= SCAN_LIMIT);
                let (start, end) = kind.delimiters();
                for tag in found {
                    prop_assert!(tag.raw.starts_with(start));
                    prop_assert!(tag.raw.ends_with(end));
                }
            }
        }
    }
}

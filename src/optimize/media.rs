//! Lazy loading of images, iframes and videos.
//!
//! The real source moves to `data-src` and a placeholder takes its place;
//! the loader swaps them back once the element nears the viewport.

use super::Pass;
use crate::loader::LAZY_MARKER;
use crate::patterns::YOUTUBE_ID_RE;
use crate::scan::{TagKind, TagOccurrence, parse_attributes};

const IMAGE_PLACEHOLDER: &str = "blank.png";
const VIDEO_PLACEHOLDER: &str = "blank.mp4";
const IFRAME_PLACEHOLDER: &str = "about:blank";

/// A 1x1 transparent PNG.
const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Video id of a YouTube URL.
pub fn youtube_id(url: &str) -> Option<&str> {
    YOUTUBE_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

fn is_excluded(pass: &mut Pass<'_>, raw: &str) -> bool {
    let excluded = Pass::matches_any(raw, &pass.config.lazy_exclusions);
    if excluded {
        pass.stats.excluded += 1;
    }
    excluded
}

pub(super) fn classify_images(pass: &mut Pass<'_>, images: &[TagOccurrence]) {
    if images.is_empty() {
        return;
    }
    let placeholder = pass.cache.placeholder_url(IMAGE_PLACEHOLDER, BLANK_PNG);
    for image in images {
        let raw = image.raw.as_str();
        if is_excluded(pass, raw) {
            continue;
        }
        let mut attrs = parse_attributes(TagKind::Img, raw);
        if attrs.get("data-class") == Some(LAZY_MARKER) {
            continue;
        }
        let Some(src) = attrs.non_empty("src").map(str::to_string) else {
            continue;
        };

        attrs.insert("src", placeholder.as_str());
        attrs.insert("data-src", src);
        attrs.insert("data-class", LAZY_MARKER);
        if let Some(srcset) = attrs.non_empty("srcset").map(str::to_string) {
            attrs.insert("srcset", format!("{placeholder} 500w, {placeholder} 1000w"));
            attrs.insert("data-srcset", srcset);
        }

        let mut tag = attrs.to_start_tag("img");
        if raw.trim_end_matches('>').trim_end().ends_with('/') {
            tag.insert_str(tag.len() - 1, " /");
        }
        pass.replacements.push(raw, tag);
        pass.stats.lazy_media += 1;
    }
}

pub(super) fn classify_iframes(pass: &mut Pass<'_>, iframes: &[TagOccurrence]) {
    for iframe in iframes {
        let raw = iframe.raw.as_str();
        if is_excluded(pass, raw) {
            continue;
        }
        let mut attrs = parse_attributes(TagKind::Iframe, raw);
        if attrs.get("data-class") == Some(LAZY_MARKER) {
            continue;
        }
        let Some(src) = attrs.non_empty("src").map(str::to_string) else {
            continue;
        };

        if src.contains("youtu")
            && let Some(id) = youtube_id(&src)
        {
            let mut style = attrs.get("style").unwrap_or_default().trim().to_string();
            if !style.is_empty() && !style.ends_with(';') {
                style.push(';');
            }
            style.push_str(&format!("background-image:url(https://i.ytimg.com/vi/{id}/maxresdefault.jpg)"));
            attrs.insert("style", style);
        }

        attrs.insert("src", IFRAME_PLACEHOLDER);
        attrs.insert("data-src", src);
        attrs.insert("data-class", LAZY_MARKER);
        pass.replacements.push(raw, attrs.to_start_tag("iframe"));
        pass.stats.lazy_media += 1;
    }
}

/// Rewrite each whitespace-preceded `src=` in `raw` to `replacement`.
fn rewrite_src_attributes(raw: &str, replacement: &str) -> String {
    let bytes = raw.as_bytes();
    let mut output = String::with_capacity(raw.len() + replacement.len());
    let mut pos = 0;

    for at in memchr::memmem::find_iter(bytes, b"src=") {
        if at == 0 || !bytes[at - 1].is_ascii_whitespace() {
            continue;
        }
        output.push_str(&raw[pos..at]);
        output.push_str(replacement);
        pos = at + "src=".len();
    }

    output.push_str(&raw[pos..]);
    output
}

/// Videos are rewritten textually, so `<source>` children are covered too.
pub(super) fn classify_videos(pass: &mut Pass<'_>, videos: &[TagOccurrence]) {
    if videos.is_empty() {
        return;
    }
    let placeholder = pass.cache.asset_url(VIDEO_PLACEHOLDER);
    let replacement = format!("data-class=\"{LAZY_MARKER}\" src=\"{placeholder}\" data-src=");

    for video in videos {
        let raw = video.raw.as_str();
        if is_excluded(pass, raw) || raw.contains(LAZY_MARKER) {
            continue;
        }
        let rewritten = rewrite_src_attributes(raw, &replacement);
        if rewritten != raw {
            pass.replacements.push(raw, rewritten);
            pass.stats.lazy_media += 1;
        }
    }
}

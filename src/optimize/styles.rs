//! Stylesheet link classification.
//!
//! Local stylesheets are cached, then inlined into the head (or, when the
//! cached copy is empty, handed to the loader). Google Fonts links are folded
//! into the page's font request. Other external stylesheets stay put.

use super::{InlineStyle, Pass};
use crate::scan::{TagKind, TagOccurrence, parse_attributes};
use crate::stylesheet::is_google_fonts;
use crate::util::{has_extension, is_external, read_text, site_path, strip_version_segments};

/// `media` values that apply everywhere the page is shown.
fn applies_everywhere(media: &str) -> bool {
    media.eq_ignore_ascii_case("all") || media.eq_ignore_ascii_case("screen")
}

pub(super) fn classify(pass: &mut Pass<'_>, links: &[TagOccurrence]) {
    for link in links {
        classify_link(pass, &link.raw);
    }
}

fn classify_link(pass: &mut Pass<'_>, raw: &str) {
    let attrs = parse_attributes(TagKind::Link, raw);
    let is_stylesheet = attrs
        .get("rel")
        .is_some_and(|rel| rel.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")));
    if !is_stylesheet {
        return;
    }
    let Some(href) = attrs.non_empty("href").map(strip_version_segments) else {
        return;
    };
    let media = attrs
        .non_empty("media")
        .map(str::trim)
        .filter(|media| !applies_everywhere(media))
        .map(str::to_string);

    if is_external(&href, &pass.page.host) {
        if is_google_fonts(&href) && pass.fonts.consolidate(&href) {
            pass.replacements.remove(raw);
            pass.stats.font_links += 1;
        }
        return;
    }

    let Some(path) = site_path(&pass.base, &href) else {
        return;
    };
    if !has_extension(&path, ".css") {
        return;
    }
    let Some(cached) = pass.cache.resolve(&path, &mut pass.fonts) else {
        tracing::trace!(href = %href, "stylesheet left in place");
        return;
    };

    let file = match pass.cache.file_for(&cached) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(href = %href, error = %e, "cached stylesheet unreachable");
            return;
        }
    };

    let has_content = read_text(&file).is_ok_and(|css| !css.trim().is_empty());
    if has_content {
        if !pass.inline_styles.iter().any(|style| style.file == file) {
            pass.inline_styles.push(InlineStyle { file, media });
            pass.stats.inlined_stylesheets += 1;
        }
    } else {
        let url = pass.cache.url_for(&cached);
        if !pass.stylesheet_urls.contains(&url) {
            pass.stylesheet_urls.push(url);
            pass.stats.deferred_stylesheets += 1;
        }
    }
    pass.replacements.remove(raw);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_everywhere() {
        assert!(applies_everywhere("all"));
        assert!(applies_everywhere("Screen"));
        assert!(!applies_everywhere("print"));
        assert!(!applies_everywhere("(max-width: 600px)"));
    }
}

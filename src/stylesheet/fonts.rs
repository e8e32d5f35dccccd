//! Consolidation of Google Fonts requests.
//!
//! Every `fonts.googleapis.com/css?family=...` reference on a page, in a link
//! tag or a stylesheet `@import`, is folded into one [`FontRequests`] value
//! and requested once, late, by the loader.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use url::Url;
use url::form_urlencoded;

pub const GOOGLE_FONTS_HOST: &str = "fonts.googleapis.com";

/// Font family name → requested variants, across all requests seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FontRequests {
    families: BTreeMap<String, BTreeSet<String>>,
}

/// Whether `url` points at the Google Fonts CSS host.
pub fn is_google_fonts(url: &str) -> bool {
    url.contains(GOOGLE_FONTS_HOST)
}

/// Parse `url`, accepting protocol-relative references.
fn parse_fonts_url(url: &str) -> Option<Url> {
    // WordPress-style double encoding leaves `#038;` where `&` belongs.
    let repaired = url.trim().replace("#038;", "&");
    match repaired.strip_prefix("//") {
        Some(rest) => Url::parse(&format!("https://{rest}")).ok(),
        None => Url::parse(&repaired).ok(),
    }
}

impl FontRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Number of distinct families.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn variants(&self, family: &str) -> Option<&BTreeSet<String>> {
        self.families.get(family)
    }

    pub fn families(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.families.iter().map(|(name, variants)| (name.as_str(), variants))
    }

    /// Record `family` with `variants`; variants are unioned per family.
    pub fn add<'a>(&mut self, family: &str, variants: impl IntoIterator<Item = &'a str>) {
        let entry = self.families.entry(family.to_string()).or_default();
        for variant in variants {
            let variant = variant.trim();
            if !variant.is_empty() {
                entry.insert(variant.to_string());
            }
        }
    }

    pub fn merge(&mut self, other: &FontRequests) {
        for (family, variants) in &other.families {
            self.add(family, variants.iter().map(String::as_str));
        }
    }

    /// Fold a Google Fonts stylesheet URL into the set.
    ///
    /// Understands `family=Name:v1,v2|Other` and repeated `family` parameters.
    /// Returns `false`, recording nothing, for anything else, including the
    /// `css2` API whose syntax differs.
    pub fn consolidate(&mut self, url: &str) -> bool {
        let Some(parsed) = parse_fonts_url(url) else {
            return false;
        };
        if parsed.host_str() != Some(GOOGLE_FONTS_HOST) || parsed.path() != "/css" {
            return false;
        }

        let mut recognized = false;
        for (key, value) in parsed.query_pairs() {
            if key != "family" {
                continue;
            }
            for entry in value.split('|') {
                let (name, variants) = match entry.split_once(':') {
                    Some((name, variants)) => (name.trim(), variants),
                    None => (entry.trim(), ""),
                };
                if name.is_empty() {
                    continue;
                }
                self.add(name, variants.split(','));
                recognized = true;
            }
        }

        if recognized {
            tracing::trace!(url, families = self.len(), "consolidated font request");
        }
        recognized
    }

    /// One stylesheet URL requesting every recorded family.
    ///
    /// `None` when nothing was recorded.
    pub fn consolidated_url(&self) -> Option<String> {
        if self.families.is_empty() {
            return None;
        }

        let family = self
            .families
            .iter()
            .map(|(name, variants)| {
                if variants.is_empty() {
                    name.clone()
                } else {
                    let list: Vec<&str> = variants.iter().map(String::as_str).collect();
                    format!("{name}:{}", list.join(","))
                }
            })
            .collect::<Vec<_>>()
            .join("|");

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("family", &family)
            .finish();
        Some(format!("https://{GOOGLE_FONTS_HOST}/css?{query}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consolidate_union_of_variants() {
        let mut fonts = FontRequests::new();
        assert!(fonts.consolidate("https://fonts.googleapis.com/css?family=Roboto:400,700"));
        assert!(fonts.consolidate("//fonts.googleapis.com/css?family=Roboto:300|Lato"));

        let roboto: Vec<_> = fonts.variants("Roboto").unwrap().iter().cloned().collect();
        assert_eq!(roboto, vec!["300", "400", "700"]);
        assert!(fonts.variants("Lato").unwrap().is_empty());
        assert_eq!(fonts.len(), 2);
    }

    #[test]
    fn test_consolidate_plus_as_space() {
        let mut fonts = FontRequests::new();
        assert!(fonts.consolidate("https://fonts.googleapis.com/css?family=Open+Sans:400"));
        assert!(fonts.variants("Open Sans").is_some());
    }

    #[test]
    fn test_consolidate_repairs_encoded_ampersand() {
        let mut fonts = FontRequests::new();
        assert!(fonts.consolidate(
            "https://fonts.googleapis.com/css?subset=latin#038;family=Lato:400"
        ));
        assert!(fonts.variants("Lato").is_some());
    }

    #[test]
    fn test_consolidate_rejects_other_urls() {
        let mut fonts = FontRequests::new();
        assert!(!fonts.consolidate("https://cdn.test/css?family=Roboto"));
        assert!(!fonts.consolidate("https://fonts.googleapis.com/css2?family=Roboto:wght@400"));
        assert!(!fonts.consolidate("https://fonts.googleapis.com/css?subset=latin"));
        assert!(fonts.is_empty());
    }

    #[test]
    fn test_consolidated_url() {
        let mut fonts = FontRequests::new();
        assert_eq!(fonts.consolidated_url(), None);
        fonts.add("Roboto", ["700", "400"]);
        fonts.add("Open Sans", std::iter::empty::<&str>());
        assert_eq!(
            fonts.consolidated_url().as_deref(),
            Some("https://fonts.googleapis.com/css?family=Open+Sans%7CRoboto%3A400%2C700")
        );
    }

    #[test]
    fn test_merge() {
        let mut a = FontRequests::new();
        a.add("Roboto", ["400"]);
        let mut b = FontRequests::new();
        b.add("Roboto", ["700"]);
        b.add("Lato", ["300"]);
        a.merge(&b);
        assert_eq!(a.variants("Roboto").unwrap().len(), 2);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_manifest_round_trip() {
        let mut fonts = FontRequests::new();
        fonts.add("Roboto", ["400"]);
        let json = serde_json::to_string(&fonts).unwrap();
        assert_eq!(json, r#"{"Roboto":["400"]}"#);
        assert_eq!(serde_json::from_str::<FontRequests>(&json).unwrap(), fonts);
    }
}

//! Bulk literal replacement of captured tags.
//!
//! Classification only records `(needle, replacement)` pairs; the document is
//! rewritten once, at the end, by [`Replacements::apply`]. Every occurrence of
//! a needle is replaced, not just the first, so needles are always the exact
//! captured tag text.

use memchr::memmem;

/// Ordered list of literal substitutions.
#[derive(Debug, Clone, Default)]
pub struct Replacements {
    pairs: Vec<(String, String)>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every occurrence of `needle` with `replacement`.
    ///
    /// Empty needles are ignored.
    pub fn push(&mut self, needle: impl Into<String>, replacement: impl Into<String>) {
        let needle = needle.into();
        if needle.is_empty() {
            return;
        }
        self.pairs.push((needle, replacement.into()));
    }

    /// Claim `needle` and leave it byte-identical.
    ///
    /// A claimed span is never rewritten by another pair that would match
    /// inside it.
    pub fn keep(&mut self, needle: &str) {
        self.push(needle, needle);
    }

    /// Delete every occurrence of `needle`.
    pub fn remove(&mut self, needle: &str) {
        self.push(needle, "");
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, r)| (n.as_str(), r.as_str()))
    }

    /// Apply all pairs in a single left-to-right pass.
    ///
    /// At each position the earliest-starting needle wins; on a tie the
    /// first registered pair wins. Replacement text is never rescanned.
    pub fn apply(&self, document: &str) -> String {
        if self.pairs.is_empty() {
            return document.to_string();
        }

        let haystack = document.as_bytes();
        let finders: Vec<_> = self
            .pairs
            .iter()
            .map(|(needle, _)| memmem::Finder::new(needle.as_bytes()))
            .collect();
        let mut next: Vec<Option<usize>> = finders.iter().map(|f| f.find(haystack)).collect();

        let mut output = String::with_capacity(document.len());
        let mut pos = 0;

        loop {
            // Refresh needles whose cached match was consumed by an earlier one.
            for (slot, finder) in next.iter_mut().zip(&finders) {
                if let Some(at) = *slot
                    && at < pos
                {
                    *slot = finder.find(&haystack[pos..]).map(|p| p + pos);
                }
            }

            let winner = next
                .iter()
                .enumerate()
                .filter_map(|(index, at)| at.map(|at| (at, index)))
                .min();
            let Some((at, index)) = winner else {
                break;
            };

            let (needle, replacement) = &self.pairs[index];
            output.push_str(&document[pos..at]);
            output.push_str(replacement);
            pos = at + needle.len();
        }

        output.push_str(&document[pos..]);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replaces_every_occurrence() {
        let mut replacements = Replacements::new();
        replacements.push("<b>", "<strong>");
        assert_eq!(replacements.apply("<b>a<b>b"), "<strong>a<strong>b");
    }

    #[test]
    fn test_remove_and_keep() {
        let mut replacements = Replacements::new();
        replacements.keep(r#"<script src="/w.js"></script>"#);
        replacements.remove(r#"<script src="/a.js"></script>"#);
        let html = r#"<script src="/w.js"></script><script src="/a.js"></script>"#;
        assert_eq!(replacements.apply(html), r#"<script src="/w.js"></script>"#);
    }

    #[test]
    fn test_kept_span_shields_inner_matches() {
        let mut replacements = Replacements::new();
        replacements.keep("<video><img src=x></video>");
        replacements.push("<img src=x>", "<img data-src=x>");
        assert_eq!(
            replacements.apply("<video><img src=x></video><img src=x>"),
            "<video><img src=x></video><img data-src=x>"
        );
    }

    #[test]
    fn test_replacement_not_rescanned() {
        let mut replacements = Replacements::new();
        replacements.push("a", "ab");
        replacements.push("b", "c");
        assert_eq!(replacements.apply("ab"), "abc");
    }

    #[test]
    fn test_first_registered_wins_ties() {
        let mut replacements = Replacements::new();
        replacements.push("x", "1");
        replacements.push("x", "2");
        assert_eq!(replacements.apply("xx"), "11");
    }

    #[test]
    fn test_empty_needle_ignored() {
        let mut replacements = Replacements::new();
        replacements.push("", "boom");
        assert!(replacements.is_empty());
        assert_eq!(replacements.apply("abc"), "abc");
    }

    proptest! {
        #[test]
        fn prop_identity_pairs_preserve_document(doc in "[a-c<>/ ]{0,64}", needle in "[a-c<>]{1,3}") {
            let mut replacements = Replacements::new();
            replacements.keep(&needle);
            prop_assert_eq!(replacements.apply(&doc), doc);
        }

        #[test]
        fn prop_removed_needle_absent_when_unambiguous(doc in "[ab ]{0,64}") {
            let mut replacements = Replacements::new();
            replacements.remove("ab");
            prop_assert!(!replacements.apply(&doc).contains("ab") || doc.contains("aab"));
        }
    }
}

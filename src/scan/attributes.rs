//! Attribute parsing for a single captured tag.
//!
//! Attributes are read with html5ever's tokenizer, so quoting styles,
//! character references, boolean attributes and self-closing syntax behave
//! the way a browser reads them. Anything unparseable yields an empty map.

use std::cell::RefCell;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{
    BufferQueue, TagKind as HtmlTagKind, Token, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::TagKind;

/// Ordered attribute name → value mapping of one tag.
///
/// Keeps source order so that serializing a rewritten tag is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: Vec<(String, String)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Non-empty value of `name`.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    /// Set `name`, replacing in place if present, appending otherwise.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Serialize as ` name="value"` pairs, one leading space each.
    ///
    /// Empty values serialize as bare boolean attributes.
    pub fn write_attributes(&self, output: &mut String) {
        for (name, value) in &self.entries {
            output.push(' ');
            output.push_str(name);
            if !value.is_empty() {
                output.push_str("=\"");
                output.push_str(&escape_attribute(value));
                output.push('"');
            }
        }
    }

    /// Serialize as an opening tag: `<name a="b">`.
    pub fn to_start_tag(&self, name: &str) -> String {
        let mut output = String::with_capacity(16 + self.entries.len() * 24);
        output.push('<');
        output.push_str(name);
        self.write_attributes(&mut output);
        output.push('>');
        output
    }

    /// Serialize as a complete element: `<name a="b">body</name>`.
    pub fn to_element(&self, name: &str, body: &str) -> String {
        let mut output = self.to_start_tag(name);
        output.push_str(body);
        output.push_str("</");
        output.push_str(name);
        output.push('>');
        output
    }
}

impl FromIterator<(String, String)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = AttributeMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Serializes as a JSON object in attribute order.
impl Serialize for AttributeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Escape a value for a double-quoted attribute.
fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Token sink that keeps the attributes of the first start tag named `name`.
struct FirstStartTag<'a> {
    name: &'static str,
    found: &'a RefCell<Option<AttributeMap>>,
}

impl TokenSink for FirstStartTag<'_> {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if let Token::TagToken(tag) = token
            && tag.kind == HtmlTagKind::StartTag
            && &*tag.name == self.name
            && self.found.borrow().is_none()
        {
            let attrs = tag
                .attrs
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            *self.found.borrow_mut() = Some(attrs);
        }
        TokenSinkResult::Continue
    }
}

/// Parse the opening tag of `raw` into an [`AttributeMap`].
///
/// Returns an empty map when no `kind` start tag can be recovered; callers
/// treat that like a tag without interesting attributes.
pub fn parse_attributes(kind: TagKind, raw: &str) -> AttributeMap {
    let found = RefCell::new(None);
    let sink = FirstStartTag {
        name: kind.name(),
        found: &found,
    };
    let tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
    let input = BufferQueue::default();
    input.push_back(StrTendril::from(raw));
    let _ = tokenizer.feed(&input);
    tokenizer.end();

    found.into_inner().unwrap_or_default()
}

/// Text between the first `>` and the following `</script>`.
///
/// Empty when the tag has no body.
pub fn inline_script_body(raw: &str) -> &str {
    let Some(open_end) = raw.find('>') else {
        return "";
    };
    let body_start = open_end + 1;
    match raw[body_start..].find("</script>") {
        Some(len) => &raw[body_start..body_start + len],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_attributes() {
        let attrs = parse_attributes(
            TagKind::Script,
            r#"<script type="text/javascript" src='/js/a.js'></script>"#,
        );
        assert_eq!(attrs.get("type"), Some("text/javascript"));
        assert_eq!(attrs.get("src"), Some("/js/a.js"));
        let names: Vec<_> = attrs.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["type", "src"]);
    }

    #[test]
    fn test_parse_boolean_and_unquoted() {
        let attrs = parse_attributes(TagKind::Script, "<script async src=/js/a.js defer></script>");
        assert_eq!(attrs.get("async"), Some(""));
        assert_eq!(attrs.get("src"), Some("/js/a.js"));
        assert!(attrs.contains("defer"));
    }

    #[test]
    fn test_parse_self_closing_and_entities() {
        let attrs = parse_attributes(TagKind::Img, r#"<img src="/a.png?x=1&amp;y=2" alt="A" />"#);
        assert_eq!(attrs.get("src"), Some("/a.png?x=1&y=2"));
        assert_eq!(attrs.get("alt"), Some("A"));
    }

    #[test]
    fn test_parse_lowercases_names() {
        let attrs = parse_attributes(TagKind::Link, r#"<link REL="stylesheet" HREF="/a.css">"#);
        assert_eq!(attrs.get("rel"), Some("stylesheet"));
        assert_eq!(attrs.get("href"), Some("/a.css"));
    }

    #[test]
    fn test_parse_wrong_kind_is_empty() {
        assert!(parse_attributes(TagKind::Img, r#"<script src="a.js"></script>"#).is_empty());
        assert!(parse_attributes(TagKind::Link, "not markup at all").is_empty());
    }

    #[test]
    fn test_inline_script_body() {
        assert_eq!(inline_script_body("<script>var a = 1;</script>"), "var a = 1;");
        assert_eq!(inline_script_body("<script src=\"a.js\"></script>"), "");
        assert_eq!(inline_script_body("<script"), "");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut attrs = AttributeMap::new();
        attrs.insert("src", "a");
        attrs.insert("alt", "b");
        attrs.insert("src", "c");
        assert_eq!(attrs.to_start_tag("img"), r#"<img src="c" alt="b">"#);
        assert_eq!(attrs.remove("src").as_deref(), Some("c"));
        assert_eq!(attrs.to_start_tag("img"), r#"<img alt="b">"#);
    }

    #[test]
    fn test_serialize_json_in_order() {
        let attrs = parse_attributes(TagKind::Script, r#"<script src="/w.js" async id="w"></script>"#);
        assert_eq!(
            serde_json::to_string(&attrs).unwrap(),
            r#"{"src":"/w.js","async":"","id":"w"}"#
        );
    }

    #[test]
    fn test_serialize_escapes_and_booleans() {
        let attrs: AttributeMap = [
            ("data-x".to_string(), "say \"hi\" & bye".to_string()),
            ("async".to_string(), String::new()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            attrs.to_element("script", ""),
            r#"<script data-x="say &quot;hi&quot; &amp; bye" async></script>"#
        );
    }
}

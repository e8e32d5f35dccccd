//! Insertion of the inlined styles and the loader into the document.

/// End of the head region: the opening `<body`, else `</head`, else the end.
fn head_end(html: &str) -> usize {
    html.find("<body")
        .or_else(|| html.find("</head"))
        .unwrap_or(html.len())
}

/// Insert `<style>css</style>` ahead of the head's first stylesheet.
///
/// The block goes before the first `<style`, else the first `<link`, else the
/// first `<script` of the head, else before `</head`; a document with none of
/// these gets it prepended. Empty `css` leaves the document as it is.
pub fn insert_head_style(html: &str, css: &str) -> String {
    if css.is_empty() {
        return html.to_string();
    }

    let head = &html[..head_end(html)];
    let at = head
        .find("<style")
        .or_else(|| head.find("<link"))
        .or_else(|| head.find("<script"))
        .or_else(|| html.find("</head"))
        .unwrap_or(0);

    let mut output = String::with_capacity(html.len() + css.len() + 15);
    output.push_str(&html[..at]);
    output.push_str("<style>");
    output.push_str(css);
    output.push_str("</style>");
    output.push_str(&html[at..]);
    output
}

/// Insert `snippet` before the last `</body>`, or append it.
pub fn insert_before_body_end(html: &str, snippet: &str) -> String {
    let at = html.rfind("</body>").unwrap_or(html.len());
    let mut output = String::with_capacity(html.len() + snippet.len());
    output.push_str(&html[..at]);
    output.push_str(snippet);
    output.push_str(&html[at..]);
    output
}

//! Markdown rendering for rich replies.

use pulldown_cmark::{Event, Options, Parser, html};

/// Render Markdown into HTML suitable for `formatted_body`.
///
/// Raw HTML in the source is emitted as escaped text: issue titles come
/// from third parties and must not inject markup into the room.
///
/// A body that is a single paragraph is unwrapped, the way Matrix
/// clients expect short inline replies.
pub fn render(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);

    let trimmed = out.trim_end();
    if let Some(inner) = trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
        .filter(|inner| !inner.contains("<p>"))
    {
        return inner.to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_single_link_inline() {
        assert_eq!(
            render("[Example](https://x/1234) by @alice"),
            r#"<a href="https://x/1234">Example</a> by @alice"#
        );
    }

    #[test]
    fn keeps_paragraphs_for_multiple_entries() {
        let html = render("MSC1: [A](https://x/1) by @a\n\nMSC2: [B](https://x/2) by @b");
        assert_eq!(
            html,
            "<p>MSC1: <a href=\"https://x/1\">A</a> by @a</p>\n\
             <p>MSC2: <a href=\"https://x/2\">B</a> by @b</p>"
        );
    }

    #[test]
    fn escapes_special_characters_in_titles() {
        let html = render("[a < b & c](https://x/1) by @a");
        assert!(html.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn raw_html_in_titles_is_escaped() {
        let html = render("[Fix <img src=x onerror=alert(1)> things](https://x/1) by @a");
        assert!(!html.contains("<img"));
        assert!(html.contains("Fix &lt;img src=x onerror=alert(1)&gt; things"));
        assert!(html.starts_with(r#"<a href="https://x/1">"#));
    }

    #[test]
    fn block_html_is_escaped() {
        let html = render("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}

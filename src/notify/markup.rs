use pulldown_cmark::{html, Options, Parser};

/// Render CommonMark text as HTML, with smart punctuation.
pub fn render_html(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_SMART_PUNCTUATION);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_markdown() {
        assert_eq!(
            render_html("Hello **voter**\n\n- one\n- two"),
            "<p>Hello <strong>voter</strong></p>\n<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n"
        );
    }

    #[test]
    fn smart_quotes() {
        assert_eq!(render_html("\"quoted\""), "<p>\u{201c}quoted\u{201d}</p>\n");
    }
}

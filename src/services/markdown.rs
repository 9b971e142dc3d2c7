//! Markdown to HTML for news and blog articles
//!
//! ```
//! use moi_goroda::services::markdown::render_markdown;
//!
//! let html = render_markdown("# Тверь\n\n**Волга**");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>"));
//! ```

use pulldown_cmark::{html, Event, Options, Parser};

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options
}

/// Render Markdown; raw HTML in the source is escaped, not passed through
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// First `max_chars` characters of the text content, for list previews
pub fn plain_excerpt(source: &str, max_chars: usize) -> String {
    let text: String = Parser::new_ext(source, options())
        .filter_map(|event| match event {
            Event::Text(t) | Event::Code(t) => Some(t.to_string()),
            Event::SoftBreak | Event::HardBreak => Some(" ".to_string()),
            _ => None,
        })
        .collect();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        text
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_markdown() {
        let html = render_markdown("## Маршрут\n\n- Тверь\n- Торжок\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<h2>Маршрут</h2>"));
        assert!(html.contains("<li>Тверь</li>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render_markdown("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_plain_excerpt() {
        assert_eq!(plain_excerpt("**Привет**, мир", 100), "Привет, мир");
        assert_eq!(plain_excerpt("один два три", 7), "один дв…");
    }
}

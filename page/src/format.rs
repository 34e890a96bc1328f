//! Markdown rendering for modal result bodies.
//!
//! Provider output is treated as markdown. The [`Formatter`] contract is
//! opaque to the rest of the agent: it gets raw text in and trusts the HTML
//! coming out. Only when a formatter fails does the agent fall back to a
//! plain escaped-paragraph rendering, so a result is always displayable.

use pulldown_cmark::{Event, Options, Parser, TagEnd, html};

/// Renders markdown to HTML. Implementations may fail; callers route
/// failures through [`render_or_fallback`].
pub trait Formatter {
    fn render(&self, markdown: &str) -> anyhow::Result<String>;
}

/// The production formatter, backed by pulldown-cmark.
#[derive(Debug, Default, Clone, Copy)]
pub struct CmarkFormatter;

impl Formatter for CmarkFormatter {
    fn render(&self, markdown: &str) -> anyhow::Result<String> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        let parser = Parser::new_ext(markdown, options);
        let mut out = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

/// Render through `formatter`, falling back to escaped paragraphs when it
/// fails. This never errors: a modal in its result state always has a body.
#[must_use]
pub fn render_or_fallback(formatter: &dyn Formatter, markdown: &str) -> String {
    match formatter.render(markdown) {
        Ok(html) => html,
        Err(err) => {
            tracing::warn!("Formatter failed, using plain rendering: {err}");
            escaped_paragraphs(markdown)
        }
    }
}

/// Minimal rendering: HTML-escape the text and wrap blank-line-separated
/// blocks in `<p>` tags.
#[must_use]
pub fn escaped_paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{}</p>", escape_html(block)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Strip markup from markdown, keeping readable text. Used for the clipboard
/// path, which must never carry tags or markdown syntax.
#[must_use]
pub fn plain_text(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut out = String::with_capacity(markdown.len());

    for event in parser {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                out.push('\n');
            }
            Event::End(TagEnd::CodeBlock) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    out.trim().to_string()
}

//! Renders markdown [`Event`]s into HTML. We use our own renderer rather than
//! [`pulldown_cmark::html::push_html`] because a document's footnote links
//! need to be anchored to its canonical alias (the same page is served under
//! several URLs, and a bare `#1` would break under a `<base>` tag in the theme)
//! and because image alt text should be kept.

use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::io;

enum TableState {
    Head,
    Body,
}

/// Modeled after [`pulldown_cmark`]'s private `HtmlWriter`.
pub struct HtmlRenderer {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// Nesting depth of images whose alt text we are currently writing.
    /// While non-zero, markup is dropped and only text is emitted.
    image_depth: usize,

    /// The prefix to prepend onto footnote links.
    footnote_prefix: String,
}

impl HtmlRenderer {
    pub fn with_footnote_prefix(footnote_prefix: &str) -> Self {
        HtmlRenderer {
            table_alignments: Vec::new(),
            table_state: TableState::Head,
            table_cell_index: 0,
            image_depth: 0,
            footnote_prefix: footnote_prefix.to_owned(),
        }
    }

    pub fn on_event<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        if self.image_depth > 0 {
            return self.on_alt_text_event(w, event);
        }
        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Text(text) => escape_html(&mut *w, &text),
            Event::Code(code) => {
                w.write_str("<code>")?;
                escape_html(&mut *w, &code)?;
                w.write_str("</code>")
            }
            Event::Html(html) => w.write_str(&html),
            Event::FootnoteReference(name) => {
                w.write_str(r#"<sup class="footnote-reference"><a href=""#)?;
                escape_href(&mut *w, &self.footnote_prefix)?;
                w.write_str("#")?;
                escape_href(&mut *w, &name)?;
                w.write_str(r#"">"#)?;
                escape_html(&mut *w, &name)?;
                w.write_str("</a></sup>")
            }
            Event::SoftBreak => w.write_str("\n"),
            Event::HardBreak => w.write_str("<br />"),
            Event::Rule => w.write_str("<hr />"),
            Event::TaskListMarker(checked) => write!(
                w,
                r#"<input disabled="" type="checkbox" {}/>"#,
                match checked {
                    true => r#"checked="" "#,
                    false => "",
                }
            ),
        }
    }

    fn on_alt_text_event<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        match event {
            Event::Start(Tag::Image(..)) => {
                self.image_depth += 1;
                Ok(())
            }
            Event::End(Tag::Image(_, _, title)) => {
                self.image_depth -= 1;
                if self.image_depth > 0 {
                    return Ok(());
                }
                w.write_str("\"")?;
                if !title.is_empty() {
                    w.write_str(r#" title=""#)?;
                    escape_html(&mut *w, &title)?;
                    w.write_str("\"")?;
                }
                w.write_str(" />")
            }
            Event::Text(text) | Event::Code(text) => escape_html(&mut *w, &text),
            Event::SoftBreak | Event::HardBreak => w.write_str(" "),
            _ => Ok(()),
        }
    }

    fn on_start<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'a>,
    ) -> io::Result<()> {
        match tag {
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Heading(level) => write!(w, "<h{}>", level),
            Tag::BlockQuote => w.write_str("<blockquote>"),
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                match info.split(' ').next().unwrap_or("") {
                    "" => w.write_str("<pre><code>"),
                    lang => {
                        w.write_str(r#"<pre><code class="language-"#)?;
                        escape_html(&mut *w, lang)?;
                        w.write_str(r#"">"#)
                    }
                }
            }
            Tag::CodeBlock(CodeBlockKind::Indented) => {
                w.write_str("<pre><code>")
            }
            Tag::List(None) => w.write_str("<ul>"),
            Tag::List(Some(1)) => w.write_str("<ol>"),
            Tag::List(Some(start)) => write!(w, r#"<ol start="{}">"#, start),
            Tag::Item => w.write_str("<li>"),
            Tag::FootnoteDefinition(name) => {
                w.write_str(r#"<div class="footnote-definition" id=""#)?;
                escape_html(&mut *w, &name)?;
                w.write_str(r#""><sup class="footnote-definition-label">"#)?;
                escape_html(&mut *w, &name)?;
                w.write_str("</sup>")
            }
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => write!(
                w,
                "<{}{}>",
                self.cell_element(),
                match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => r#" align="left""#,
                    Some(Alignment::Right) => r#" align="right""#,
                    Some(Alignment::Center) => r#" align="center""#,
                    _ => "",
                }
            ),
            Tag::Emphasis => w.write_str("<em>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Link(LinkType::Email, dest, title) => {
                w.write_str(r#"<a href="mailto:"#)?;
                self.write_link_rest(w, dest, title)
            }
            Tag::Link(_, dest, title) => {
                w.write_str(r#"<a href=""#)?;
                self.write_link_rest(w, dest, title)
            }
            Tag::Image(_, dest, _) => {
                self.image_depth = 1;
                w.write_str(r#"<img src=""#)?;
                escape_href(&mut *w, &dest)?;
                w.write_str(r#"" alt=""#)
            }
        }
    }

    fn write_link_rest<W: StrWrite>(
        &self,
        w: &mut W,
        dest: CowStr,
        title: CowStr,
    ) -> io::Result<()> {
        escape_href(&mut *w, &dest)?;
        if !title.is_empty() {
            w.write_str(r#"" title=""#)?;
            escape_html(&mut *w, &title)?;
        }
        w.write_str(r#"">"#)
    }

    fn on_end<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'a>,
    ) -> io::Result<()> {
        match tag {
            Tag::Paragraph => w.write_str("</p>\n"),
            Tag::Heading(level) => write!(w, "</h{}>\n", level),
            Tag::BlockQuote => w.write_str("</blockquote>\n"),
            Tag::CodeBlock(_) => w.write_str("</code></pre>\n"),
            Tag::List(Some(_)) => w.write_str("</ol>\n"),
            Tag::List(None) => w.write_str("</ul>\n"),
            Tag::Item => w.write_str("</li>\n"),
            Tag::FootnoteDefinition(_) => w.write_str("</div>\n"),
            Tag::Table(_) => w.write_str("</tbody></table>\n"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                w.write_str("</tr></thead><tbody>")
            }
            Tag::TableRow => w.write_str("</tr>"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                write!(w, "</{}>", self.cell_element())
            }
            Tag::Emphasis => w.write_str("</em>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Link(..) => w.write_str("</a>"),
            // closed in `on_alt_text_event`
            Tag::Image(..) => Ok(()),
        }
    }

    fn cell_element(&self) -> &'static str {
        match self.table_state {
            TableState::Head => "th",
            TableState::Body => "td",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pulldown_cmark::{Options, Parser};

    fn render(markdown: &str, prefix: &str) -> io::Result<String> {
        let mut out = String::new();
        let mut renderer = HtmlRenderer::with_footnote_prefix(prefix);
        for ev in Parser::new_ext(markdown, Options::ENABLE_FOOTNOTES) {
            renderer.on_event(&mut out, ev)?;
        }
        Ok(out)
    }

    #[test]
    fn test_image_alt_text() -> io::Result<()> {
        assert_eq!(
            "<p><img src=\"cat.jpg\" alt=\"a cat\" title=\"Tom\" /></p>\n",
            render("![a *cat*](cat.jpg \"Tom\")", "")?,
        );
        Ok(())
    }

    #[test]
    fn test_footnote_reference_is_prefixed() -> io::Result<()> {
        let html = render("Hi[^1]\n\n[^1]: there", "/posts/hello")?;
        assert!(html.contains(r##"<a href="/posts/hello#1">1</a>"##));
        assert!(html.contains(r#"<div class="footnote-definition" id="1">"#));
        Ok(())
    }

    #[test]
    fn test_text_is_escaped() -> io::Result<()> {
        assert_eq!("<p>a &lt; b &amp; <code>&lt;c&gt;</code></p>\n", render("a < b & `<c>`", "")?);
        Ok(())
    }
}

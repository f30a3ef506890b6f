use crate::htmlrenderer::HtmlRenderer;
use pulldown_cmark::*;
use std::io;

/// The deepest heading level HTML has.
const MAX_HEADING: u32 = 6;

/// Converts a document's markdown body to HTML. Footnote links are prefixed
/// with `footnote_prefix`, which should be the document's canonical alias so
/// that they resolve no matter which alias the page was requested under.
pub fn to_html(markdown: &str, footnote_prefix: &str) -> io::Result<String> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    let mut renderer = HtmlRenderer::with_footnote_prefix(footnote_prefix);
    for ev in Parser::new_ext(markdown, options).map(convert) {
        renderer.on_event(&mut html, ev)?;
    }
    Ok(html)
}

fn convert(ev: Event) -> Event {
    match ev {
        Event::Start(tag) => Event::Start(convert_tag(tag)),
        Event::End(tag) => Event::End(convert_tag(tag)),
        _ => ev,
    }
}

fn convert_tag(tag: Tag) -> Tag {
    match tag {
        // The headings in the document need to be demoted twice to be
        // subordinate to both the site title (h1) and the document title (h2).
        // So `#` becomes h3 instead of h1.
        Tag::Heading(level) => Tag::Heading((level + 2).min(MAX_HEADING)),
        _ => tag,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_headings_are_demoted() -> io::Result<()> {
        assert_eq!(
            "<h3>One</h3>\n<h5>Three</h5>\n<h6>Five</h6>\n",
            to_html("# One\n### Three\n##### Five", "")?,
        );
        Ok(())
    }

    #[test]
    fn test_smart_punctuation_and_tables() -> io::Result<()> {
        let html = to_html("\"Hi\"\n\n| a | b |\n|---|--:|\n| 1 | 2 |", "")?;
        assert!(html.starts_with("<p>\u{201c}Hi\u{201d}</p>\n"), "{}", html);
        assert!(html.contains(r#"<td align="right">2</td>"#), "{}", html);
        Ok(())
    }
}

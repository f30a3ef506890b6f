//! Assembles servable HTML pages. Every page is the theme's head snippet (with
//! `$TITLE` replaced by the page title), some content, and the theme's footer
//! snippet. The content is produced by applying one of the templates below to
//! a [`Value`] built from typed fields, so assembly never touches the
//! filesystem and is a pure function of its inputs.

use crate::document::{Comment, Document};
use crate::util::escape;
use chrono::NaiveDate;
use gtmpl::Value;
use std::collections::HashMap;
use std::fmt;

/// Placeholder in the head snippet that is replaced by the page title.
pub const TITLE_PLACEHOLDER: &str = "$TITLE";

const DOCUMENT_TEMPLATE: &str = r#"<article><h2>{{.title}}</h2><time datetime="{{.machine_date}}">{{.human_date}}</time>
{{.body}}</article>
<h2>Comments</h2>
<div id="comments">{{range .comments}}<div class="comment"><p><strong>#{{.number}} {{.author}}</strong> <time datetime="{{.machine_date}}">{{.human_date}}</time></p><p>{{.body}}</p></div>{{end}}</div>
<form action="{{.action}}" method="post">
<input type="text" name="name" placeholder="Name" required minlength="1" maxlength="64"><br>
<textarea name="body" placeholder="Comment" rows="8" cols="40" required minlength="1" maxlength="1024"></textarea><br>
<input type="submit" value="Comment">
</form>"#;

const INDEX_TEMPLATE: &str = r#"<ul class="posts">{{range .documents}}
<li>
<time datetime="{{.machine_date}}">{{.human_date}}</time>
<a href="{{.href}}">{{.title}}</a>
</li>{{end}}
</ul>"#;

const STANDALONE_TEMPLATE: &str = r#"<article><h2>{{.title}}</h2>{{.body}}</article>"#;

/// The head and footer snippets shared by every page. Both are opaque HTML;
/// the only thing we look for is [`TITLE_PLACEHOLDER`] in the head.
#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub head: String,
    pub footer: String,
}

/// Assembles pages from [`Document`]s and other content.
pub struct Renderer {
    theme: Theme,
}

impl Renderer {
    pub fn new(theme: Theme) -> Renderer {
        Renderer { theme }
    }

    /// Assembles a document's page: the article, its comments, and the form
    /// for submitting a new comment. Uses the document's current
    /// `rendered_body` and `comments`; calling this twice on the same state
    /// yields byte-identical output.
    pub fn document_page(&self, document: &Document) -> Result<String> {
        let value = object(vec![
            ("title", Value::String(escape(&document.title))),
            ("machine_date", Value::String(machine_date(document.date))),
            ("human_date", Value::String(human_date(document.date))),
            ("body", Value::String(document.rendered_body.clone())),
            (
                "comments",
                Value::Array(
                    document
                        .comments
                        .iter()
                        .enumerate()
                        .map(|(i, c)| comment_value(i + 1, c))
                        .collect(),
                ),
            ),
            (
                "action",
                Value::String(escape(&format!(
                    "{}/comment",
                    document.aliases.canonical()
                ))),
            ),
        ]);
        self.page(&document.title, DOCUMENT_TEMPLATE, value)
    }

    /// Assembles the index page: one dated link per document, in the order
    /// given.
    pub fn index_page<'a>(
        &self,
        site_title: &str,
        documents: impl Iterator<Item = &'a Document>,
    ) -> Result<String> {
        let documents = documents
            .map(|d| {
                object(vec![
                    ("title", Value::String(escape(&d.title))),
                    ("href", Value::String(escape(d.aliases.canonical()))),
                    ("machine_date", Value::String(machine_date(d.date))),
                    ("human_date", Value::String(human_date(d.date))),
                ])
            })
            .collect();
        let value = object(vec![("documents", Value::Array(documents))]);
        self.page(site_title, INDEX_TEMPLATE, value)
    }

    /// Assembles a standalone page (one with no date and no comments) from
    /// its title and already-rendered body.
    pub fn standalone_page(&self, title: &str, body: &str) -> Result<String> {
        let value = object(vec![
            ("title", Value::String(escape(title))),
            ("body", Value::String(body.to_owned())),
        ]);
        self.page(title, STANDALONE_TEMPLATE, value)
    }

    fn page(&self, title: &str, template: &str, value: Value) -> Result<String> {
        let content = gtmpl::template(template, value).map_err(Error)?;
        let head = self.theme.head.replacen(TITLE_PLACEHOLDER, &escape(title), 1);
        let mut page = String::with_capacity(
            head.len() + content.len() + self.theme.footer.len(),
        );
        page.push_str(&head);
        page.push_str(&content);
        page.push_str(&self.theme.footer);
        Ok(page)
    }
}

fn comment_value(number: usize, comment: &Comment) -> Value {
    let date = comment.submitted_at.date_naive();
    object(vec![
        ("number", Value::String(number.to_string())),
        ("author", Value::String(comment.author.clone())),
        ("machine_date", Value::String(machine_date(date))),
        ("human_date", Value::String(human_date(date))),
        (
            "body",
            Value::String(comment.body.trim().replace('\n', "<br>")),
        ),
    ])
}

fn object(fields: Vec<(&str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect::<HashMap<String, Value>>(),
    )
}

/// Formats a date for `datetime` attributes, e.g. `2021-04-16`.
pub fn machine_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Formats a date for display, e.g. `April 16, 2021`.
pub fn human_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned when a page template fails to execute. The templates are fixed,
/// so this indicates a bug rather than bad input.
#[derive(Debug)]
pub struct Error(pub String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "executing page template: {}", self.0)
    }
}

impl std::error::Error for Error {}

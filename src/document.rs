//! Defines the [`Document`], [`Comment`], and [`Aliases`] types: the records
//! the site is built from. Documents are parsed from disk once at startup
//! ([`crate::parser`]) and afterwards only ever gain comments
//! ([`crate::catalog::Catalog::submit_comment`]).

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;

/// A reader comment attached to a [`Document`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    /// The comment's position within its document, starting at 1. It is only
    /// unique within the parent document and doubles as the comment's file
    /// name in the [`crate::comments::CommentStore`].
    pub id: usize,

    /// The commenter's display name. Trimmed, HTML-escaped, and guaranteed to
    /// fit on a single line.
    pub author: String,

    /// The comment text. Trimmed, HTML-escaped, and free of `\r`.
    pub body: String,

    /// When the server received the comment, truncated to whole seconds (the
    /// precision of the on-disk format).
    pub submitted_at: DateTime<FixedOffset>,
}

/// The URL paths under which a [`Document`] is served. There is always at
/// least one; the first is the canonical path, used for redirects and feed
/// links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aliases(Vec<String>);

impl Aliases {
    /// Returns `None` if `aliases` is empty.
    pub fn new(aliases: Vec<String>) -> Option<Aliases> {
        match aliases.is_empty() {
            true => None,
            false => Some(Aliases(aliases)),
        }
    }

    /// The canonical alias (`aliases[0]`).
    pub fn canonical(&self) -> &str {
        // non-empty by construction
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// An authored document (a blog post).
#[derive(Clone, Debug)]
pub struct Document {
    /// Unique numeric identifier from the frontmatter. Keys the document's
    /// comment directory.
    pub id: u64,

    /// The source file this document was parsed from.
    pub source_path: PathBuf,

    pub title: String,

    /// Publication date; determines ordering and is displayed on the page.
    pub date: NaiveDate,

    /// The markdown body, as authored.
    pub raw_body: String,

    /// `raw_body` converted to HTML, without any page furniture.
    pub rendered_body: String,

    /// The complete, servable page including head, footer, and comments.
    /// Empty until the [`crate::catalog::Catalog`] assembles it.
    pub page: Arc<str>,

    pub aliases: Aliases,

    /// Comments in submission order.
    pub comments: Vec<Comment>,
}

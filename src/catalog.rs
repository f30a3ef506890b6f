//! Defines the [`Catalog`]: the in-memory collection of [`Document`]s, indexed
//! by every alias, and the only place documents are mutated after startup.
//!
//! Each document sits behind its own [`Mutex`]. [`Catalog::submit_comment`]
//! holds that lock from the moment it numbers the new comment until the
//! comment is on disk and the page has been re-assembled, so concurrent
//! submissions to one document are serialized and always receive consecutive
//! ids. Submissions to different documents don't contend.

use crate::comments::{self, CommentStore, Persisted};
use crate::document::{Comment, Document};
use crate::feed::{self, FeedConfig};
use crate::render::{self, Renderer};
use crate::util::escape;
use chrono::{DateTime, FixedOffset, SubsecRound, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The longest accepted author name, in characters, after trimming.
pub const MAX_AUTHOR_LEN: usize = 64;

/// The longest accepted comment body, in characters, after trimming.
pub const MAX_BODY_LEN: usize = 1024;

pub struct Catalog {
    /// Newest first, as loaded.
    documents: Vec<Mutex<Document>>,

    /// Maps every alias of every document to its position in `documents`.
    aliases: HashMap<String, usize>,

    renderer: Renderer,
    store: CommentStore,
}

impl Catalog {
    /// Indexes `documents` (which should already be in display order) and
    /// assembles each document's page. Fails if two documents share an id or
    /// an alias.
    pub fn new(
        documents: Vec<Document>,
        renderer: Renderer,
        store: CommentStore,
    ) -> Result<Catalog> {
        let mut ids: HashMap<u64, &PathBuf> = HashMap::new();
        let mut aliases: HashMap<String, usize> = HashMap::new();
        for (i, document) in documents.iter().enumerate() {
            if let Some(first) = ids.insert(document.id, &document.source_path)
            {
                return Err(Error::DuplicateId {
                    id: document.id,
                    first: first.clone(),
                    second: document.source_path.clone(),
                });
            }
            for alias in document.aliases.iter() {
                if let Some(first) = aliases.insert(alias.to_owned(), i) {
                    return Err(Error::DuplicateAlias {
                        alias: alias.to_owned(),
                        first: documents[first].source_path.clone(),
                        second: document.source_path.clone(),
                    });
                }
            }
        }

        let documents = documents
            .into_iter()
            .map(|mut document| {
                document.page = Arc::from(renderer.document_page(&document)?);
                Ok(Mutex::new(document))
            })
            .collect::<Result<Vec<Mutex<Document>>>>()?;

        Ok(Catalog {
            documents,
            aliases,
            renderer,
            store,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The total number of comments across all documents.
    pub fn comment_count(&self) -> usize {
        self.documents.iter().map(|d| lock(d).comments.len()).sum()
    }

    /// Reports whether any document has the given alias.
    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Returns the current page for the document with the given alias.
    pub fn lookup(&self, alias: &str) -> Option<Arc<str>> {
        self.aliases
            .get(alias)
            .map(|&i| lock(&self.documents[i]).page.clone())
    }

    /// Returns a snapshot of the comments of the document with the given
    /// alias.
    pub fn comments(&self, alias: &str) -> Option<Vec<Comment>> {
        self.aliases
            .get(alias)
            .map(|&i| lock(&self.documents[i]).comments.clone())
    }

    /// Validates and sanitizes a comment, appends it to the document with
    /// the given alias, re-assembles that document's page, and persists the
    /// comment. Returns the document's canonical alias, to which the
    /// submitter should be redirected.
    ///
    /// On any error the document is left exactly as it was and nothing is
    /// written (persisting is the last step, and the only one that touches
    /// the disk).
    pub fn submit_comment(
        &self,
        alias: &str,
        author: &str,
        body: &str,
    ) -> std::result::Result<String, SubmitError> {
        let (author, body) = sanitize(author, body)?;
        let &i = self.aliases.get(alias).ok_or(SubmitError::NotFound)?;

        let mut document = lock(&self.documents[i]);
        let comment = Comment {
            id: document.comments.len() + 1,
            author,
            body,
            submitted_at: now(),
        };
        let comment_id = comment.id;

        document.comments.push(comment.clone());
        let page = match self.renderer.document_page(&document) {
            Ok(page) => page,
            Err(err) => {
                document.comments.pop();
                return Err(SubmitError::Render(err));
            }
        };

        let result = match self.store.persist(document.id, &comment) {
            Ok(Persisted::Written) => Ok(()),
            // The file for a comment that isn't in memory; someone else wrote
            // it. Refuse rather than claim a comment we didn't record.
            Ok(Persisted::AlreadyPresent) => Err(comments::Error::Occupied {
                path: self.store.path(document.id, comment_id),
            }),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            document.comments.pop();
            tracing::error!(
                document_id = document.id,
                comment_id,
                error = %err,
                "failed to persist comment"
            );
            return Err(SubmitError::Persist(err));
        }

        document.page = Arc::from(page);
        tracing::info!(document_id = document.id, comment_id, "accepted comment");
        Ok(document.aliases.canonical().to_owned())
    }

    /// Assembles the index page, listing every document newest first.
    pub fn index_page(&self, site_title: &str) -> render::Result<String> {
        let guards = self.lock_all();
        self.renderer
            .index_page(site_title, guards.iter().map(|g| &**g))
    }

    /// Generates the Atom feed over every document, newest first. Fails if the
    /// catalog is empty.
    pub fn feed(&self, config: &FeedConfig) -> feed::Result<String> {
        let guards = self.lock_all();
        let documents: Vec<&Document> = guards.iter().map(|g| &**g).collect();
        feed::to_string(config, &documents)
    }

    /// Locks every document, in order. Only used while building the
    /// startup-time pages, and `submit_comment` never holds more than one
    /// lock, so this can't deadlock.
    fn lock_all(&self) -> Vec<MutexGuard<'_, Document>> {
        self.documents.iter().map(lock).collect()
    }
}

fn lock(document: &Mutex<Document>) -> MutexGuard<'_, Document> {
    // A panic mid-submission leaves the document consistent enough to keep
    // serving; don't take the whole site down with it.
    document.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().trunc_subsecs(0).fixed_offset()
}

/// Trims and validates a submission, then HTML-escapes both fields, strips
/// carriage returns from the body, and folds the author onto a single line.
fn sanitize(
    author: &str,
    body: &str,
) -> std::result::Result<(String, String), Invalid> {
    let author = author.trim();
    let body = body.trim();
    if author.is_empty() || body.is_empty() {
        return Err(Invalid::Missing);
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(Invalid::BodyTooLong);
    }
    if author.chars().count() > MAX_AUTHOR_LEN {
        return Err(Invalid::AuthorTooLong);
    }

    let author = author
        .split(|c| c == '\r' || c == '\n')
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Ok((escape(&author), escape(body).replace('\r', "")))
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem building a [`Catalog`].
#[derive(Debug)]
pub enum Error {
    /// Returned when two documents declare the same id.
    DuplicateId {
        id: u64,
        first: PathBuf,
        second: PathBuf,
    },

    /// Returned when two documents claim the same alias.
    DuplicateAlias {
        alias: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Returned when a document's page can't be assembled.
    Render(render::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateId { id, first, second } => write!(
                f,
                "documents `{}` and `{}` both have id {}",
                first.display(),
                second.display(),
                id
            ),
            Error::DuplicateAlias {
                alias,
                first,
                second,
            } => write!(
                f,
                "documents `{}` and `{}` both claim alias `{}`",
                first.display(),
                second.display(),
                alias
            ),
            Error::Render(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DuplicateId { .. } => None,
            Error::DuplicateAlias { .. } => None,
            Error::Render(err) => Some(err),
        }
    }
}

impl From<render::Error> for Error {
    fn from(err: render::Error) -> Error {
        Error::Render(err)
    }
}

/// A comment submission the reader needs to fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invalid {
    /// The name or body is empty (or only whitespace).
    Missing,

    /// The body is longer than [`MAX_BODY_LEN`].
    BodyTooLong,

    /// The name is longer than [`MAX_AUTHOR_LEN`].
    AuthorTooLong,
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Invalid::Missing => "Missing name or body",
            Invalid::BodyTooLong => "Body is too long",
            Invalid::AuthorTooLong => "Name is too long",
        })
    }
}

/// Represents a failed [`Catalog::submit_comment`].
#[derive(Debug)]
pub enum SubmitError {
    /// No document has the alias.
    NotFound,

    /// The submission was rejected; nothing changed.
    Invalid(Invalid),

    /// The page couldn't be re-assembled; nothing changed.
    Render(render::Error),

    /// The comment couldn't be written to disk; nothing changed in memory.
    Persist(comments::Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubmitError::NotFound => f.write_str("Not found"),
            SubmitError::Invalid(err) => err.fmt(f),
            SubmitError::Render(err) => err.fmt(f),
            SubmitError::Persist(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::NotFound => None,
            SubmitError::Invalid(_) => None,
            SubmitError::Render(err) => Some(err),
            SubmitError::Persist(err) => Some(err),
        }
    }
}

impl From<Invalid> for SubmitError {
    fn from(err: Invalid) -> SubmitError {
        SubmitError::Invalid(err)
    }
}

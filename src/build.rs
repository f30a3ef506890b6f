//! Exports the [`build_site`] function which stitches together the startup
//! steps: reading the theme snippets, parsing the documents and their comments
//! ([`crate::parser`]), indexing them ([`crate::catalog`]), and rendering the
//! pages that never change afterwards (the index, the standalone pages, and
//! the Atom feed). Any failure here is fatal: the site is never served
//! partially loaded.

use crate::catalog::{Catalog, Error as CatalogError};
use crate::comments::CommentStore;
use crate::config::Config;
use crate::feed::{self, Error as FeedError, FeedConfig};
use crate::markdown;
use crate::parser::{Error as ParseError, Parser};
use crate::render::{Error as RenderError, Renderer, Theme};
use crate::util::{read_file, ReadError};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where the feed is served, relative to the site URL.
pub const FEED_PATH: &str = "feed.xml";

/// Everything the server needs to answer requests.
pub struct Site {
    /// The documents, addressable by alias.
    pub catalog: Catalog,

    /// The index page.
    pub index: Arc<str>,

    /// The Atom feed. Reflects the documents as loaded; comments don't
    /// affect it.
    pub feed: Arc<str>,

    /// Standalone pages by path (without trailing slash).
    pub pages: HashMap<String, Arc<str>>,

    /// Served for anything else.
    pub static_directory: PathBuf,
}

/// Builds the [`Site`] from a [`Config`] object.
pub fn build_site(config: &Config) -> Result<Site> {
    let theme = Theme {
        head: read_file(&config.head_file, "head snippet")?,
        footer: read_file(&config.footer_file, "footer snippet")?,
    };
    let renderer = Renderer::new(theme);

    let store = CommentStore::new(&config.comments_directory);
    let documents = Parser::new(&store).parse_documents(&config.posts_directory)?;

    let mut pages = HashMap::with_capacity(config.pages.len());
    for page in &config.pages {
        let source = read_file(&page.source, "page")?;
        let body = markdown::to_html(&source, &page.path).map_err(|err| {
            Error::RenderPage {
                path: page.source.clone(),
                err,
            }
        })?;
        let html = renderer.standalone_page(&page.title, &body)?;
        pages.insert(page.path.clone(), Arc::from(html));
    }

    let catalog = Catalog::new(documents, renderer, store)?;
    let index = catalog.index_page(&config.title)?;
    let feed = catalog.feed(&FeedConfig {
        title: config.title.clone(),
        author: config.author.clone(),
        site_url: config.site_url.clone(),
        feed_url: feed::site_base(&config.site_url).join(FEED_PATH)?,
    })?;

    tracing::info!(
        documents = catalog.len(),
        comments = catalog.comment_count(),
        pages = pages.len(),
        "loaded site"
    );
    Ok(Site {
        catalog,
        index: Arc::from(index),
        feed: Arc::from(feed),
        pages,
        static_directory: config.static_directory.clone(),
    })
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can come from reading the
/// theme and pages, parsing documents, indexing them, and rendering.
#[derive(Debug)]
pub enum Error {
    /// Returned when a theme snippet or page source can't be read.
    Read(ReadError),

    /// Returned for errors parsing documents.
    Parse(ParseError),

    /// Returned for errors indexing documents.
    Catalog(CatalogError),

    /// Returned when a standalone page's markdown can't be rendered.
    RenderPage { path: PathBuf, err: std::io::Error },

    /// Returned when a page template fails.
    Render(RenderError),

    /// Returned for errors generating the feed.
    Feed(FeedError),

    /// Returned when the feed URL can't be derived from the site URL.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Read(err) => err.fmt(f),
            Error::Parse(err) => err.fmt(f),
            Error::Catalog(err) => err.fmt(f),
            Error::RenderPage { path, err } => {
                write!(f, "rendering page '{}': {}", path.display(), err)
            }
            Error::Render(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::UrlParse(err) => write!(f, "building feed URL: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Read(err) => Some(err),
            Error::Parse(err) => Some(err),
            Error::Catalog(err) => Some(err),
            Error::RenderPage { path: _, err } => Some(err),
            Error::Render(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Error {
        Error::Read(err)
    }
}

impl From<ParseError> for Error {
    /// Converts [`ParseError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Error {
        Error::Catalog(err)
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Error {
        Error::Render(err)
    }
}

impl From<FeedError> for Error {
    /// Converts [`FeedError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

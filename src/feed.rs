//! Support for creating Atom feeds from a list of documents.

use crate::document::Document;
use atom_syndication::{Entry, Error as AtomError, Feed, Link, Person, Text};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use std::fmt;
use std::string::FromUtf8Error;
use url::Url;

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,
    pub author: Option<String>,

    /// The site's home page. Used as the feed id and as the base for entry
    /// links.
    pub site_url: Url,

    /// Where the feed itself is served.
    pub feed_url: Url,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// [`Document`]s and serializes it. Entries appear in the order given; the
/// feed's `updated` is the newest document's date. Fails with
/// [`Error::EmptyCatalog`] if there are no documents to take that date from.
pub fn to_string(config: &FeedConfig, documents: &[&Document]) -> Result<String> {
    let xml = feed(config, documents)?.write_to(Vec::new())?;
    Ok(String::from_utf8(xml)?)
}

fn feed(config: &FeedConfig, documents: &[&Document]) -> Result<Feed> {
    let newest = documents
        .iter()
        .map(|d| d.date)
        .max()
        .ok_or(Error::EmptyCatalog)?;

    let mut feed = Feed::default();
    feed.set_title(config.title.clone());
    feed.set_id(config.site_url.to_string());
    feed.set_updated(midnight_utc(newest));
    feed.set_authors(author_to_people(config.author.as_deref()));
    feed.set_links(vec![
        link(config.feed_url.to_string(), "self"),
        link(config.site_url.to_string(), "alternate"),
    ]);
    feed.set_entries(
        documents
            .iter()
            .map(|d| feed_entry(config, d))
            .collect::<Result<Vec<Entry>>>()?,
    );
    Ok(feed)
}

fn feed_entry(config: &FeedConfig, document: &Document) -> Result<Entry> {
    let date = midnight_utc(document.date);
    let url = site_base(&config.site_url)
        .join(document.aliases.canonical().trim_start_matches('/'))?;

    let mut entry = Entry::default();
    entry.set_id(document.id.to_string());
    entry.set_title(document.title.clone());
    entry.set_updated(date);
    entry.set_published(Some(date));
    entry.set_links(vec![link(url.to_string(), "alternate")]);
    // Written as `type="html"`; the Atom writer escapes the markup.
    entry.set_summary(Some(Text::html(document.rendered_body.clone())));
    Ok(entry)
}

/// Aliases are relative to the site URL's path, so it must end in `/` for
/// joining to keep it.
pub fn site_base(site_url: &Url) -> Url {
    let mut base = site_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn link(href: String, rel: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel(rel);
    link
}

fn author_to_people(author: Option<&str>) -> Vec<Person> {
    match author {
        Some(name) => {
            let mut person = Person::default();
            person.set_name(name);
            vec![person]
        }
        None => Vec::new(),
    }
}

/// Documents only have dates, so their timestamps are midnight UTC.
fn midnight_utc(date: NaiveDate) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .fixed_offset()
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when there are no documents; the feed's `updated` timestamp
    /// comes from the newest one.
    EmptyCatalog,

    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when an entry link can't be built from the site URL and an
    /// alias.
    UrlParse(url::ParseError),

    /// Returned when the serialized feed isn't UTF-8.
    Utf8(FromUtf8Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::EmptyCatalog => {
                write!(f, "can't generate a feed without any documents")
            }
            Error::Atom(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::Utf8(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::EmptyCatalog => None,
            Error::Atom(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::Utf8(err) => Some(err),
        }
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::Utf8(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::Aliases;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn config() -> FeedConfig {
        FeedConfig {
            title: String::from("Caio Alonso"),
            author: Some(String::from("Caio Alonso")),
            site_url: Url::parse("https://example.com/").unwrap(),
            feed_url: Url::parse("https://example.com/feed.xml").unwrap(),
        }
    }

    fn document(id: u64, alias: &str, date: NaiveDate) -> Document {
        Document {
            id,
            source_path: PathBuf::new(),
            title: format!("Document {}", id),
            date,
            raw_body: String::new(),
            rendered_body: String::from("<p>Body & more</p>"),
            page: Arc::from(""),
            aliases: Aliases::new(vec![alias.to_owned()]).unwrap(),
            comments: Vec::new(),
        }
    }

    #[test]
    fn test_updated_is_newest_document() -> Result<()> {
        let newer = document(2, "/posts/b", NaiveDate::from_ymd_opt(2022, 6, 15).unwrap());
        let older = document(1, "/posts/a", NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let xml = to_string(&config(), &[&newer, &older])?;

        let feed: Feed = xml.parse()?;
        assert_eq!(
            &DateTime::parse_from_rfc3339("2022-06-15T00:00:00Z").unwrap(),
            feed.updated()
        );
        let ids: Vec<&str> = feed.entries().iter().map(|e| e.id()).collect();
        assert_eq!(vec!["2", "1"], ids);
        assert_eq!("https://example.com/posts/b", feed.entries()[0].links()[0].href());
        assert_eq!(2, xml.matches("<entry>").count());
        Ok(())
    }

    #[test]
    fn test_summary_is_escaped() -> Result<()> {
        let d = document(1, "/posts/a", NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let xml = to_string(&config(), &[&d])?;
        assert!(xml.contains("&lt;p&gt;Body &amp; more&lt;/p&gt;"), "{}", xml);
        Ok(())
    }

    #[test]
    fn test_entry_links_keep_site_path() -> Result<()> {
        let d = document(1, "/posts/a", NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        for site_url in &["https://example.com/blog/", "https://example.com/blog"] {
            let config = FeedConfig {
                site_url: Url::parse(site_url).unwrap(),
                ..config()
            };
            let feed: Feed = to_string(&config, &[&d])?.parse()?;
            assert_eq!(
                "https://example.com/blog/posts/a",
                feed.entries()[0].links()[0].href()
            );
        }
        Ok(())
    }

    #[test]
    fn test_empty_catalog() {
        assert!(matches!(to_string(&config(), &[]), Err(Error::EmptyCatalog)));
    }
}

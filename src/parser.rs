//! Defines the [`Parser`] and [`Error`] types, and the logic for loading
//! [`Document`]s from the file system into memory. Every regular file under
//! the source directory is a document; each document's historical comments
//! are loaded from the [`CommentStore`] as it is parsed.

use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use crate::{
    comments::{self, CommentStore},
    document::{Aliases, Document},
    markdown,
};

/// The prefix for default aliases, given to documents whose frontmatter
/// declares none.
const DEFAULT_ALIAS_PREFIX: &str = "/posts/";

/// Parses [`Document`] objects from source files.
pub struct Parser<'a> {
    /// Supplies each document's historical comments.
    comments: &'a CommentStore,
}

impl<'a> Parser<'a> {
    pub fn new(comments: &'a CommentStore) -> Parser<'a> {
        Parser { comments }
    }

    /// Recursively walks `source_directory` and parses every regular,
    /// non-hidden file as a [`Document`]. Returns the documents sorted by date
    /// (most recent first; same-day documents by descending id). Each file
    /// must be structured as follows:
    ///
    /// 1. Initial frontmatter fence (`---`) on its own line
    /// 2. YAML frontmatter with fields `id`, `title`, `date`, and optionally
    ///    `aliases` (a single path or a list of paths)
    /// 3. Terminal frontmatter fence (`---`) on its own line
    /// 4. Markdown body
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// id: 3
    /// title: Hello, world!
    /// date: 2021-04-16
    /// aliases: [/posts/hello, /2021/04/16/hello]
    /// ---
    /// # Hello
    ///
    /// World
    /// ```
    ///
    /// Any malformed document fails the whole parse.
    pub fn parse_documents(
        &self,
        source_directory: &Path,
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for result in WalkDir::new(source_directory)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = result?;
            if entry.file_type().is_file() {
                documents.push(self.parse_document(entry.path())?);
            }
        }

        documents.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(documents)
    }

    /// Parses a single [`Document`] from the file at `path`, annotating any
    /// error with the path.
    fn parse_document(&self, path: &Path) -> Result<Document> {
        use std::io::Read;

        let parse = || -> Result<Document> {
            let mut contents = String::new();
            File::open(path)?.read_to_string(&mut contents)?;
            self.parse_source(path, &contents)
        };
        parse().map_err(|e| {
            Error::Annotated(
                format!("parsing document `{}`", path.display()),
                Box::new(e),
            )
        })
    }

    fn parse_source(&self, path: &Path, input: &str) -> Result<Document> {
        let (yaml, body) = split_frontmatter(input)?;
        let frontmatter: Frontmatter = serde_yaml::from_str(yaml)?;
        let date = NaiveDate::parse_from_str(&frontmatter.date, "%Y-%m-%d")
            .map_err(|err| Error::Date {
                date: frontmatter.date.clone(),
                err,
            })?;

        let mut aliases = frontmatter
            .aliases
            .into_vec()
            .into_iter()
            .map(normalize_alias)
            .collect::<Result<Vec<String>>>()?;
        if aliases.is_empty() {
            aliases.push(default_alias(path)?);
        }
        let aliases = Aliases::new(aliases)
            .ok_or_else(|| Error::InvalidFileName(path.to_owned()))?;

        let rendered_body = markdown::to_html(body, aliases.canonical())?;
        let comments = self.comments.load(frontmatter.id)?;
        Ok(Document {
            id: frontmatter.id,
            source_path: path.to_owned(),
            title: frontmatter.title,
            date,
            raw_body: body.to_owned(),
            rendered_body,
            page: Arc::from(""),
            aliases,
            comments,
        })
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Splits `input` into its YAML frontmatter and its body. The fences must
/// each be on their own line.
fn split_frontmatter(input: &str) -> Result<(&str, &str)> {
    const FENCE: &str = "---";
    let rest = input
        .strip_prefix(FENCE)
        .and_then(|rest| {
            rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
        })
        .ok_or(Error::FrontmatterMissingStartFence)?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return Ok((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(Error::FrontmatterMissingEndFence)
}

/// Aliases are absolute URL paths without a trailing slash (the router strips
/// trailing slashes before lookup).
fn normalize_alias(alias: String) -> Result<String> {
    let trimmed = alias.trim();
    if !trimmed.starts_with('/') || trimmed.contains(char::is_whitespace) {
        return Err(Error::InvalidAlias(alias));
    }
    match trimmed.trim_end_matches('/') {
        "" => Err(Error::InvalidAlias(alias)),
        path => Ok(path.to_owned()),
    }
}

fn default_alias(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidFileName(path.to_owned()))?;
    match slug::slugify(stem).as_str() {
        "" => Err(Error::InvalidFileName(path.to_owned())),
        slug => Ok(format!("{}{}", DEFAULT_ALIAS_PREFIX, slug)),
    }
}

#[derive(Deserialize)]
struct Frontmatter {
    /// The document's unique numeric id.
    id: u64,

    title: String,

    /// The publication date, `YYYY-MM-DD`.
    date: String,

    /// The URL paths the document is served under.
    #[serde(default)]
    aliases: OneOrMany,
}

/// Lets `aliases` be written as a bare string when there's only one.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Represents the result of a [`Document`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Document`] object.
#[derive(Debug)]
pub enum Error {
    /// Returned when a source file is missing its starting frontmatter fence
    /// (`---`).
    FrontmatterMissingStartFence,

    /// Returned when a source file is missing its terminal frontmatter fence
    /// (`---` i.e., the starting fence was found but the ending one was
    /// missing).
    FrontmatterMissingEndFence,

    /// Returned when the frontmatter isn't valid YAML or is missing a field
    /// or has a field of the wrong type.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when the `date` field isn't a `YYYY-MM-DD` date.
    Date {
        date: String,
        err: chrono::ParseError,
    },

    /// Returned when an alias isn't an absolute URL path.
    InvalidAlias(String),

    /// Returned when a default alias can't be derived from the file name.
    InvalidFileName(PathBuf),

    /// Returned when the document's historical comments can't be loaded.
    Comments(comments::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterMissingStartFence => {
                write!(f, "Document must begin with `---`")
            }
            Error::FrontmatterMissingEndFence => {
                write!(f, "Missing closing `---`")
            }
            Error::DeserializeYaml(err) => {
                write!(f, "invalid frontmatter: {}", err)
            }
            Error::Date { date, err } => {
                write!(f, "invalid date `{}` (want YYYY-MM-DD): {}", date, err)
            }
            Error::InvalidAlias(alias) => write!(
                f,
                "invalid alias `{}`: aliases must be absolute paths",
                alias
            ),
            Error::InvalidFileName(path) => {
                write!(f, "can't derive an alias from file name {:?}", path)
            }
            Error::Comments(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterMissingStartFence => None,
            Error::FrontmatterMissingEndFence => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Date { err, .. } => Some(err),
            Error::InvalidAlias(_) => None,
            Error::InvalidFileName(_) => None,
            Error::Comments(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<comments::Error> for Error {
    fn from(err: comments::Error) -> Error {
        Error::Comments(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for directory traversal.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

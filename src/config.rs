//! Loads the site configuration from a `site.yaml` project file. All paths in
//! the file are relative to the directory that contains it.
//!
//! ```yaml
//! title: Caio Alonso
//! author: Caio Alonso
//! site_url: https://caioalonso.com/
//! listen: 0.0.0.0:8000
//! pages:
//!   /learning: { title: Learning, source: learning.md }
//! ```

use crate::util::{read_file, ReadError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file.
pub const PROJECT_FILE: &str = "site.yaml";

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_posts() -> PathBuf {
    PathBuf::from("posts")
}

fn default_comments() -> PathBuf {
    PathBuf::from("comments")
}

fn default_static() -> PathBuf {
    PathBuf::from("public_html")
}

fn default_head() -> PathBuf {
    PathBuf::from("head.html")
}

fn default_footer() -> PathBuf {
    PathBuf::from("footer.html")
}

#[derive(Deserialize)]
struct Project {
    title: String,

    #[serde(default)]
    author: Option<String>,

    site_url: Url,

    #[serde(default = "default_listen")]
    listen: SocketAddr,

    #[serde(default = "default_posts")]
    posts: PathBuf,

    #[serde(default = "default_comments")]
    comments: PathBuf,

    #[serde(default = "default_static", rename = "static")]
    static_files: PathBuf,

    #[serde(default = "default_head")]
    head: PathBuf,

    #[serde(default = "default_footer")]
    footer: PathBuf,

    #[serde(default)]
    pages: BTreeMap<String, ProjectPage>,
}

#[derive(Deserialize)]
struct ProjectPage {
    title: String,
    source: PathBuf,
}

/// A standalone markdown page, served at `path` (with or without a trailing
/// slash).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    pub path: String,
    pub title: String,
    pub source: PathBuf,
}

/// The resolved site configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The site title, used for the index page and the feed.
    pub title: String,
    pub author: Option<String>,

    /// The public URL of the site's home page.
    pub site_url: Url,

    /// The address to serve on.
    pub listen: SocketAddr,

    /// Where the document source files live.
    pub posts_directory: PathBuf,

    /// Where comment files are written; see [`crate::comments`].
    pub comments_directory: PathBuf,

    /// Served for any path that isn't a document, page, or feed.
    pub static_directory: PathBuf,

    /// The head snippet. `$TITLE` is replaced with the page title.
    pub head_file: PathBuf,
    pub footer_file: PathBuf,

    pub pages: Vec<Page>,
}

impl Config {
    /// Searches `dir` and then each of its ancestors for [`PROJECT_FILE`]
    /// and loads the first one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        for ancestor in dir.ancestors() {
            let path = ancestor.join(PROJECT_FILE);
            if path.is_file() {
                return Config::from_project_file(&path);
            }
        }
        Err(Error::NotFound(dir.to_owned()))
    }

    pub fn from_project_file(path: &Path) -> Result<Config> {
        let contents = read_file(path, "project file")?;
        let project: Project = serde_yaml::from_str(&contents).map_err(|err| {
            Error::DeserializeYaml {
                path: path.to_owned(),
                err,
            }
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));

        let pages = project
            .pages
            .into_iter()
            .map(|(path, page)| {
                Ok(Page {
                    path: normalize_page_path(&path)?,
                    title: page.title,
                    source: root.join(page.source),
                })
            })
            .collect::<Result<Vec<Page>>>()?;

        Ok(Config {
            title: project.title,
            author: project.author,
            site_url: project.site_url,
            listen: project.listen,
            posts_directory: root.join(project.posts),
            comments_directory: root.join(project.comments),
            static_directory: root.join(project.static_files),
            head_file: root.join(project.head),
            footer_file: root.join(project.footer),
            pages,
        })
    }
}

fn normalize_page_path(path: &str) -> Result<String> {
    match path.trim_end_matches('/') {
        p if p.starts_with('/') && !p.starts_with("/.") => Ok(p.to_owned()),
        _ => Err(Error::InvalidPagePath(path.to_owned())),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading the configuration.
#[derive(Debug)]
pub enum Error {
    /// Returned when no project file exists in the directory or any
    /// ancestor.
    NotFound(PathBuf),

    /// Returned when the project file can't be read.
    Read(ReadError),

    /// Returned when the project file isn't valid.
    DeserializeYaml { path: PathBuf, err: serde_yaml::Error },

    /// Returned when a page path isn't an absolute URL path (or is the
    /// index page).
    InvalidPagePath(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(dir) => write!(
                f,
                "could not find `{}` in `{}` or any parent directory",
                PROJECT_FILE,
                dir.display()
            ),
            Error::Read(err) => err.fmt(f),
            Error::DeserializeYaml { path, err } => {
                write!(f, "loading `{}`: {}", path.display(), err)
            }
            Error::InvalidPagePath(path) => {
                write!(f, "invalid page path `{}`", path)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Read(err) => Some(err),
            Error::DeserializeYaml { err, .. } => Some(err),
            Error::InvalidPagePath(_) => None,
        }
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Error {
        Error::Read(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_from_directory_searches_ancestors() -> Result<()> {
        let config = Config::from_directory(Path::new("./testdata/posts/archive"))?;
        assert_eq!("Test Site", config.title);
        assert_eq!(Path::new("./testdata/posts"), config.posts_directory);
        assert_eq!(Path::new("./testdata/comments"), config.comments_directory);
        assert_eq!(
            vec![Page {
                path: String::from("/learning"),
                title: String::from("Learning"),
                source: PathBuf::from("./testdata/learning.md"),
            }],
            config.pages
        );
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, "title: T\nsite_url: https://example.com/\n").unwrap();
        let config = Config::from_project_file(&path)?;
        assert_eq!(None, config.author);
        assert_eq!(default_listen(), config.listen);
        assert_eq!(dir.path().join("posts"), config.posts_directory);
        assert_eq!(dir.path().join("public_html"), config.static_directory);
        assert_eq!(dir.path().join("head.html"), config.head_file);
        assert!(config.pages.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_page_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE);
        fs::write(
            &path,
            "title: T\nsite_url: https://example.com/\npages:\n  /: {title: Home, source: home.md}\n",
        )
        .unwrap();
        assert!(matches!(
            Config::from_project_file(&path),
            Err(Error::InvalidPagePath(_))
        ));
    }

    #[test]
    fn test_missing_site_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, "title: T\n").unwrap();
        assert!(matches!(
            Config::from_project_file(&path),
            Err(Error::DeserializeYaml { .. })
        ));
    }
}

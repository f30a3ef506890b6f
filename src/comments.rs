//! Flat-file persistence for [`Comment`]s. Each comment lives in its own file,
//! `{root}/{document_id}/{comment_id}.txt`, laid out as:
//!
//! 1. An RFC-3339 timestamp line
//! 2. The author line
//! 3. The body, verbatim, through the end of the file
//!
//! For example:
//!
//! ```text
//! 2022-06-15T10:30:00Z
//! Al
//! Hi!
//! ```
//!
//! Files are written once and never modified. The store has no in-memory
//! state; [`CommentStore::load`] is how comments are recovered on restart.

use crate::document::Comment;
use chrono::{DateTime, SecondsFormat};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const EXTENSION: &str = ".txt";

/// Reads and writes comment files under a root directory.
#[derive(Clone, Debug)]
pub struct CommentStore {
    root: PathBuf,
}

/// The outcome of a successful [`CommentStore::persist`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persisted {
    /// The comment file was created and synced to disk.
    Written,

    /// A file for this comment id already existed, so nothing was written.
    AlreadyPresent,
}

impl CommentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> CommentStore {
        CommentStore { root: root.into() }
    }

    /// The directory holding a document's comments.
    pub fn directory(&self, document_id: u64) -> PathBuf {
        self.root.join(document_id.to_string())
    }

    /// The file holding a single comment.
    pub fn path(&self, document_id: u64, comment_id: usize) -> PathBuf {
        self.directory(document_id)
            .join(format!("{}{}", comment_id, EXTENSION))
    }

    /// Writes `comment` to its own file, creating the document's directory if
    /// needed. Never overwrites: if the comment's file already exists this is
    /// a no-op that returns [`Persisted::AlreadyPresent`]. Returns only after
    /// the file has been synced.
    pub fn persist(
        &self,
        document_id: u64,
        comment: &Comment,
    ) -> Result<Persisted> {
        let dir = self.directory(document_id);
        fs::create_dir_all(&dir).map_err(|err| Error::Write {
            path: dir.clone(),
            err,
        })?;

        let path = self.path(document_id, comment.id);
        let mut file =
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Ok(Persisted::AlreadyPresent)
                }
                Err(err) => return Err(Error::Write { path, err }),
            };

        let contents = format!(
            "{}\n{}\n{}",
            comment
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            comment.author,
            comment.body,
        );
        let written = file
            .write_all(contents.as_bytes())
            .and_then(|_| file.sync_all());
        drop(file);
        if let Err(err) = written {
            // Don't leave a truncated file behind to be replayed on restart.
            let _ = fs::remove_file(&path);
            return Err(Error::Write { path, err });
        }
        Ok(Persisted::Written)
    }

    /// Loads a document's comments ordered by id. A missing directory means
    /// the document has no comments. Ids must run 1..N without gaps, since
    /// new comments are numbered `N + 1`.
    pub fn load(&self, document_id: u64) -> Result<Vec<Comment>> {
        let dir = self.directory(document_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(err) => return Err(Error::Read { path: dir, err }),
        };

        let mut comments = Vec::new();
        for result in entries {
            let entry = result.map_err(|err| Error::Read {
                path: dir.clone(),
                err,
            })?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|err| Error::Read {
                    path: path.clone(),
                    err,
                })?;
            let os_file_name = entry.file_name();
            let file_name = os_file_name.to_string_lossy();
            if !file_type.is_file()
                || file_name.starts_with('.')
                || !file_name.ends_with(EXTENSION)
            {
                tracing::debug!(path = %path.display(), "skipping non-comment file");
                continue;
            }
            let stem = &file_name[..file_name.len() - EXTENSION.len()];
            // `01` or `+1` would parse as 1 but collide with `1.txt`
            let id = stem
                .parse::<usize>()
                .ok()
                .filter(|id| id.to_string() == stem)
                .ok_or_else(|| Error::malformed(&path, "file name is not a comment id"))?;
            let contents =
                fs::read_to_string(&path).map_err(|err| Error::Read {
                    path: path.clone(),
                    err,
                })?;
            comments.push(parse_comment(&path, id, &contents)?);
        }

        comments.sort_by_key(|c| c.id);
        for (i, comment) in comments.iter().enumerate() {
            if comment.id != i + 1 {
                return Err(Error::malformed(
                    &self.path(document_id, i + 1),
                    "missing; comment ids must run from 1 without gaps",
                ));
            }
        }
        Ok(comments)
    }
}

fn parse_comment(path: &Path, id: usize, contents: &str) -> Result<Comment> {
    let mut lines = contents.splitn(3, '\n');
    let timestamp = lines.next().unwrap_or_default();
    let submitted_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| Error::malformed(path, &format!("bad timestamp: {}", e)))?;
    let author = lines
        .next()
        .ok_or_else(|| Error::malformed(path, "missing author line"))?;
    Ok(Comment {
        id,
        author: author.to_owned(),
        body: lines.next().unwrap_or_default().to_owned(),
        submitted_at,
    })
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading or writing comment files.
#[derive(Debug)]
pub enum Error {
    /// Returned when a comment file or directory can't be created or written.
    Write { path: PathBuf, err: io::Error },

    /// Returned when a comment file or directory can't be read.
    Read { path: PathBuf, err: io::Error },

    /// Returned when a comment file exists but can't be parsed.
    Malformed { path: PathBuf, reason: String },

    /// Returned when a new comment's file is unexpectedly already taken, i.e.,
    /// [`CommentStore::persist`] reported [`Persisted::AlreadyPresent`] for a
    /// comment that isn't in memory.
    Occupied { path: PathBuf },
}

impl Error {
    fn malformed(path: &Path, reason: &str) -> Error {
        Error::Malformed {
            path: path.to_owned(),
            reason: reason.to_owned(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Write { path, err } => {
                write!(f, "writing comment `{}`: {}", path.display(), err)
            }
            Error::Read { path, err } => {
                write!(f, "reading comments `{}`: {}", path.display(), err)
            }
            Error::Malformed { path, reason } => {
                write!(f, "malformed comment `{}`: {}", path.display(), reason)
            }
            Error::Occupied { path } => write!(
                f,
                "comment file `{}` already exists for a new comment",
                path.display()
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Write { err, .. } => Some(err),
            Error::Read { err, .. } => Some(err),
            Error::Malformed { .. } => None,
            Error::Occupied { .. } => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::FixedOffset;

    fn comment(id: usize, author: &str, body: &str) -> Comment {
        Comment {
            id,
            author: author.to_owned(),
            body: body.to_owned(),
            submitted_at: DateTime::<FixedOffset>::parse_from_rfc3339(
                "2022-06-15T10:30:00Z",
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_persist_writes_three_fields() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        assert_eq!(Persisted::Written, store.persist(3, &comment(1, "Al", "Hi!"))?);
        assert_eq!(
            "2022-06-15T10:30:00Z\nAl\nHi!",
            fs::read_to_string(dir.path().join("3").join("1.txt")).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_persist_does_not_overwrite() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        store.persist(3, &comment(1, "Al", "first"))?;
        assert_eq!(
            Persisted::AlreadyPresent,
            store.persist(3, &comment(1, "Bo", "second"))?
        );
        assert_eq!("first", store.load(3)?[0].body);
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        let wanted = vec![
            comment(1, "Al", "Hi!"),
            comment(2, "Bo", "two\nlines &amp; an escape\n"),
        ];
        for c in &wanted {
            store.persist(7, c)?;
        }
        assert_eq!(wanted, store.load(7)?);
        Ok(())
    }

    #[test]
    fn test_load_orders_numerically() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        for id in (1..=11).rev() {
            store.persist(1, &comment(id, "Al", &id.to_string()))?;
        }
        let ids: Vec<usize> = store.load(1)?.iter().map(|c| c.id).collect();
        assert_eq!((1..=11).collect::<Vec<_>>(), ids);
        Ok(())
    }

    #[test]
    fn test_load_missing_directory_is_empty() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        assert!(CommentStore::new(dir.path()).load(42)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_rejects_bad_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1")).unwrap();
        fs::write(dir.path().join("1").join("1.txt"), "yesterday\nAl\nHi").unwrap();
        match CommentStore::new(dir.path()).load(1) {
            Err(Error::Malformed { .. }) => {}
            other => panic!("wanted Malformed; found {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_gaps() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        store.persist(1, &comment(1, "Al", "one"))?;
        store.persist(1, &comment(3, "Al", "three"))?;
        match store.load(1) {
            Err(Error::Malformed { path, .. }) => {
                assert_eq!(store.path(1, 2), path)
            }
            other => panic!("wanted Malformed; found {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_load_rejects_non_canonical_ids() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        store.persist(1, &comment(1, "Al", "one"))?;
        for name in &["01.txt", "+2.txt"] {
            let stray = store.directory(1).join(name);
            fs::write(&stray, "2022-06-15T10:30:00Z\nBo\nHi").unwrap();
            match store.load(1) {
                Err(Error::Malformed { path, reason }) => {
                    assert_eq!(stray, path);
                    assert_eq!("file name is not a comment id", reason);
                }
                other => panic!("wanted Malformed; found {:?}", other),
            }
            fs::remove_file(&stray).unwrap();
        }
        Ok(())
    }

    #[test]
    fn test_load_skips_hidden_files() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(dir.path());
        store.persist(1, &comment(1, "Al", "one"))?;
        fs::write(store.directory(1).join(".1.txt.swp"), "junk").unwrap();
        assert_eq!(1, store.load(1)?.len());
        Ok(())
    }
}

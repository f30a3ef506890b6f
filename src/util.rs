use pulldown_cmark::escape::escape_html;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Reads a whole file, annotating any failure with the file's `kind` (e.g.,
/// "head snippet") and path.
pub fn read_file(path: &Path, kind: &str) -> Result<String, ReadError> {
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .map_err(|err| ReadError {
            kind: kind.to_owned(),
            path: path.to_owned(),
            err,
        })?;
    Ok(contents)
}

/// Returned by [`read_file`].
#[derive(Debug)]
pub struct ReadError {
    pub kind: String,
    pub path: PathBuf,
    pub err: io::Error,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "reading {} `{}`: {}", self.kind, self.path.display(), self.err)
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}

/// HTML-escapes `s` (`&`, `<`, `>`, and `"`).
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    // writing into a `String` can't fail
    let _ = escape_html(&mut out, s);
    out
}

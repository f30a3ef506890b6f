//! The library code for the `ogham` web server. The architecture can be
//! generally broken down into two distinct phases:
//!
//! 1. Loading the site at startup ([`crate::build`]): parsing documents and
//!    their historical comments from disk ([`crate::parser`],
//!    [`crate::comments`]), assembling every page ([`crate::render`]), and
//!    indexing the documents by alias ([`crate::catalog`]).
//! 2. Serving it ([`crate::server`]): documents, the index, and the feed are
//!    answered from memory, and new comments are appended to their document,
//!    written to disk, and the document's page re-assembled.
//!
//! Everything that can go wrong with the content happens in the first phase,
//! which fails as a whole: a site with a malformed document or comment file is
//! never served.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod catalog;
pub mod comments;
pub mod config;
pub mod document;
pub mod feed;
mod htmlrenderer;
pub mod markdown;
pub mod parser;
pub mod render;
pub mod server;
pub mod util;

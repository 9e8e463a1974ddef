use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("heading `{heading}` has no id to link the table of contents to")]
    MissingHeadingIdentifier { heading: String },

    #[error("not published: {0}")]
    NotPublished(String),

    #[error("filename already belongs to another published file: {0}")]
    DuplicateFilename(String),

    #[error("source file missing: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("{0} is an attachment and cannot own attachments")]
    NestedAttachment(String),

    #[error("not a bare filename: {0}")]
    InvalidFilename(String),

    #[error("not a markdown file: {0}")]
    BadExtension(String),

    #[error("malformed html: {0}")]
    Markup(#[from] quick_xml::Error),

    #[error("store: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type PublishResult<T> = Result<T, PublishError>;

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::util::now_utc_string;

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Anything that is published under an id and served from a source file.
pub trait ServedFile {
    fn id(&self) -> &str;

    fn filename(&self) -> &str;

    /// Path under which the file is served, always starting with `/`.
    fn served_path(&self) -> String;

    fn source_path(&self, base_path: &Path) -> PathBuf {
        base_path.join(self.filename())
    }

    fn is_missing(&self, base_path: &Path) -> bool {
        !self.source_path(base_path).is_file()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootDocument {
    pub id: String,
    pub filename: String,
    pub published_at: String,
}

impl RootDocument {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            filename: filename.into(),
            published_at: now_utc_string(),
        }
    }
}

impl ServedFile for RootDocument {
    fn id(&self) -> &str {
        &self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn served_path(&self) -> String {
        format!("/{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub parent_id: String,
    pub published_at: String,
}

impl Attachment {
    /// Attachments can only be derived from a root, never from another attachment.
    pub fn derived_from(root: &RootDocument, filename: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            filename: filename.into(),
            parent_id: root.id.clone(),
            published_at: now_utc_string(),
        }
    }
}

impl ServedFile for Attachment {
    fn id(&self) -> &str {
        &self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn served_path(&self) -> String {
        attachment_path(&self.parent_id, &self.filename)
    }
}

pub fn attachment_path(root_id: &str, filename: &str) -> String {
    format!("/{root_id}/{filename}")
}

/// A stored row, decoded by whether it has a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishedFile {
    Root(RootDocument),
    Attachment(Attachment),
}

impl PublishedFile {
    pub fn from_row(
        id: String,
        filename: String,
        parent_id: Option<String>,
        published_at: String,
    ) -> Self {
        match parent_id {
            None => Self::Root(RootDocument {
                id,
                filename,
                published_at,
            }),
            Some(parent_id) => Self::Attachment(Attachment {
                id,
                filename,
                parent_id,
                published_at,
            }),
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Root(_) => None,
            Self::Attachment(attachment) => Some(&attachment.parent_id),
        }
    }

    pub fn into_root(self) -> Option<RootDocument> {
        match self {
            Self::Root(root) => Some(root),
            Self::Attachment(_) => None,
        }
    }
}

impl ServedFile for PublishedFile {
    fn id(&self) -> &str {
        match self {
            Self::Root(root) => root.id(),
            Self::Attachment(attachment) => attachment.id(),
        }
    }

    fn filename(&self) -> &str {
        match self {
            Self::Root(root) => root.filename(),
            Self::Attachment(attachment) => attachment.filename(),
        }
    }

    fn served_path(&self) -> String {
        match self {
            Self::Root(root) => root.served_path(),
            Self::Attachment(attachment) => attachment.served_path(),
        }
    }
}

/// Outcome of rendering one root document.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub root: RootDocument,
    pub html: String,
    pub attachments: Vec<Attachment>,
    pub tables_of_contents: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryEntry {
    #[serde(flatten)]
    pub root: RootDocument,
    pub served_path: String,
    pub missing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnpublishReport {
    pub root: RootDocument,
    pub attachments_removed: usize,
}

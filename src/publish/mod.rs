//! Publication lifecycle: publish, render, unpublish and the lookups that
//! serve published files.

mod attachments;
#[cfg(test)]
mod tests;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{PublishError, PublishResult};
use crate::html::{Document, synthesize_tocs};
use crate::markup::{has_markdown_extension, render_markdown};
use crate::model::{
    Attachment, DirectoryEntry, PublishedFile, RenderedDocument, RootDocument, ServedFile,
    UnpublishReport,
};
use crate::store::Store;

pub use attachments::{SyncStrategy, synchronize};

/// Publishes `filename` (relative to `base_path`), or returns the existing
/// record when it is already published.
pub fn publish(store: &mut Store, base_path: &Path, filename: &str) -> PublishResult<RootDocument> {
    if !is_bare_filename(filename) {
        return Err(PublishError::InvalidFilename(filename.to_string()));
    }
    if !has_markdown_extension(filename) {
        return Err(PublishError::BadExtension(filename.to_string()));
    }

    let source_path = base_path.join(filename);
    if !source_path.is_file() {
        return Err(PublishError::SourceMissing(source_path));
    }

    let tx = store.begin()?;
    if let Some(existing) = tx.find_by_filename(filename)? {
        return existing_root(existing, filename);
    }

    let root = RootDocument::new(filename);
    match tx.insert_root(&root) {
        Ok(()) => {}
        Err(PublishError::DuplicateFilename(_)) => {
            warn!(filename, "publish raced with another writer");
            let existing = tx
                .find_by_filename(filename)?
                .ok_or_else(|| PublishError::DuplicateFilename(filename.to_string()))?;
            return existing_root(existing, filename);
        }
        Err(err) => return Err(err),
    }
    tx.commit()?;

    info!(id = %root.id, filename, "published");
    Ok(root)
}

// Published names are served as one path segment and resolved inside the base directory.
fn is_bare_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains(['/', '\\', ':'])
        && !filename.chars().all(|ch| ch == '.')
}

fn existing_root(record: PublishedFile, filename: &str) -> PublishResult<RootDocument> {
    match record {
        PublishedFile::Root(root) => {
            info!(id = %root.id, filename, "already published");
            Ok(root)
        }
        PublishedFile::Attachment(_) => Err(PublishError::DuplicateFilename(filename.to_string())),
    }
}

/// Renders a root's source to its final HTML.
///
/// Attachment synchronization and table-of-contents synthesis mutate one
/// shared tree inside one transaction; if either fails, nothing is stored.
pub fn render(
    store: &mut Store,
    base_path: &Path,
    root: &RootDocument,
    strategy: SyncStrategy,
) -> PublishResult<RenderedDocument> {
    let source = read_source(&root.source_path(base_path))?;
    let mut document = Document::parse(&render_markdown(&source))?;

    let tx = store.begin()?;
    let attachments = synchronize(&tx, root, &mut document, strategy)?;
    let tables_of_contents = synthesize_tocs(&mut document)?;
    tx.commit()?;

    info!(
        id = %root.id,
        filename = %root.filename,
        attachments = attachments.len(),
        tables_of_contents,
        "rendered"
    );

    Ok(RenderedDocument {
        root: root.clone(),
        html: document.to_html(),
        attachments,
        tables_of_contents,
    })
}

/// Looks a root up by id and renders it; attachment ids are rejected.
pub fn render_by_id(
    store: &mut Store,
    base_path: &Path,
    id: &str,
    strategy: SyncStrategy,
) -> PublishResult<RenderedDocument> {
    let file = store
        .find_by_id(id)?
        .ok_or_else(|| PublishError::NotPublished(id.to_string()))?;
    if let Some(parent_id) = file.parent_id() {
        warn!(id, parent_id, "attachments are rendered through their root document");
        return Err(PublishError::NestedAttachment(file.filename().to_string()));
    }
    let root = file
        .into_root()
        .ok_or_else(|| PublishError::NestedAttachment(id.to_string()))?;
    render(store, base_path, &root, strategy)
}

fn read_source(path: &Path) -> PublishResult<String> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => PublishError::SourceMissing(path.to_path_buf()),
        _ => PublishError::Io(err),
    })
}

/// Removes a root and, first, every attachment it owns.
pub fn unpublish(store: &mut Store, filename: &str) -> PublishResult<UnpublishReport> {
    let tx = store.begin()?;
    let root = tx
        .find_by_filename(filename)?
        .and_then(PublishedFile::into_root)
        .ok_or_else(|| PublishError::NotPublished(filename.to_string()))?;

    let attachments = tx.find_children(&root.id)?;
    for attachment in &attachments {
        tx.delete(attachment)?;
    }
    tx.delete(&root)?;
    tx.commit()?;

    info!(
        id = %root.id,
        filename,
        attachments_removed = attachments.len(),
        "unpublished"
    );

    Ok(UnpublishReport {
        root,
        attachments_removed: attachments.len(),
    })
}

pub fn resolve_attachment(
    store: &Store,
    root_id: &str,
    filename: &str,
) -> PublishResult<Attachment> {
    store
        .find_attachment(root_id, filename)?
        .ok_or_else(|| PublishError::NotPublished(format!("{root_id}/{filename}")))
}

pub fn directory(store: &Store, base_path: &Path) -> PublishResult<Vec<DirectoryEntry>> {
    let entries = store
        .list_roots()?
        .into_iter()
        .map(|root| DirectoryEntry {
            served_path: root.served_path(),
            missing: root.is_missing(base_path),
            root,
        })
        .collect();
    Ok(entries)
}

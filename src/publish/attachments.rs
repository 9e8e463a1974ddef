use std::collections::HashMap;

use clap::ValueEnum;
use tracing::{debug, info};

use crate::error::{PublishError, PublishResult};
use crate::html::{Document, extract_references};
use crate::model::{Attachment, PublishedFile, RootDocument, attachment_path};
use crate::store::StoreTx;

/// How existing attachments of a root are reconciled with a fresh render.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum SyncStrategy {
    /// Drop every attachment and derive new ones; ids change on every render.
    #[default]
    Replace,
    /// Keep attachments whose filename is still referenced, so their ids survive.
    Stable,
}

impl SyncStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Stable => "stable",
        }
    }
}

/// Points every local reference in `document` at its attachment under `root`
/// and brings the stored attachments in line with those references.
///
/// Nothing is committed here; the caller owns `tx`.
pub fn synchronize(
    tx: &StoreTx<'_>,
    root: &RootDocument,
    document: &mut Document,
    strategy: SyncStrategy,
) -> PublishResult<Vec<Attachment>> {
    match tx.find_by_id(&root.id)? {
        Some(PublishedFile::Root(_)) => {}
        Some(PublishedFile::Attachment(_)) => {
            return Err(PublishError::NestedAttachment(root.filename.clone()));
        }
        None => return Err(PublishError::NotPublished(root.filename.clone())),
    }

    let mut existing: HashMap<String, Attachment> = HashMap::new();
    let mut removed = 0_usize;
    for attachment in tx.find_children(&root.id)? {
        if strategy == SyncStrategy::Stable {
            existing.insert(attachment.filename.clone(), attachment);
        } else {
            tx.delete(&attachment)?;
            removed += 1;
        }
    }

    let references = extract_references(document);
    let mut attachments: Vec<Attachment> = Vec::new();
    let mut created = 0_usize;

    for reference in &references {
        let filename = reference.value.as_str();
        let already_linked = attachments
            .iter()
            .any(|attachment| attachment.filename == filename);

        if !already_linked {
            let attachment = match existing.remove(filename) {
                Some(kept) => kept,
                None => {
                    let attachment = Attachment::derived_from(root, filename);
                    tx.insert_attachment(&attachment)?;
                    created += 1;
                    attachment
                }
            };
            attachments.push(attachment);
        }

        document.set_attr(
            reference.node,
            reference.attribute,
            attachment_path(&root.id, filename),
        );
    }

    for stale in existing.into_values() {
        tx.delete(&stale)?;
        removed += 1;
    }

    debug!(references = references.len(), "rewrote local references");
    info!(
        root_id = %root.id,
        filename = %root.filename,
        strategy = strategy.as_str(),
        attachments = attachments.len(),
        created,
        removed,
        "synchronized attachments"
    );

    Ok(attachments)
}

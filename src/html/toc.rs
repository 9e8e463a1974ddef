use tracing::debug;

use super::scan::{Block, scan_blocks};
use super::tree::{Document, NodeId};
use crate::error::{PublishError, PublishResult};

pub const TOC_MARKER: &str = "#toc";
pub const TOC_LIST_CLASS: &str = "table-of-contents";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocHeading {
    pub node: NodeId,
    pub level: u8,
    pub identifier: Option<String>,
    pub text: String,
}

/// Headings claimed by one `#toc` marker paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocScope {
    pub marker: NodeId,
    pub ceiling_level: u8,
    pub captured: Vec<TocHeading>,
    closed: bool,
}

impl TocScope {
    fn open(marker: NodeId, ceiling_level: u8) -> Self {
        Self {
            marker,
            ceiling_level,
            captured: Vec::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn offer(&mut self, heading: &TocHeading) {
        if self.closed {
            return;
        }
        if heading.level > self.ceiling_level {
            self.captured.push(heading.clone());
        } else {
            self.closed = true;
        }
    }
}

pub fn is_toc_marker(text: &str) -> bool {
    text.chars()
        .filter(|ch| !ch.is_whitespace())
        .eq(TOC_MARKER.chars())
}

/// Single forward pass computing every marker's scope, in marker order.
pub fn collect_scopes(blocks: impl IntoIterator<Item = Block>) -> Vec<TocScope> {
    let mut previous_heading_level = 0;
    let mut scopes: Vec<TocScope> = Vec::new();

    for block in blocks {
        match block {
            Block::Paragraph { node, text } => {
                if is_toc_marker(&text) {
                    scopes.push(TocScope::open(node, previous_heading_level));
                }
            }
            Block::Heading {
                node,
                level,
                identifier,
                text,
            } => {
                let heading = TocHeading {
                    node,
                    level,
                    identifier,
                    text,
                };
                for scope in &mut scopes {
                    scope.offer(&heading);
                }
                previous_heading_level = level;
            }
        }
    }

    scopes
}

struct TocEntry<'a> {
    level: u8,
    href: String,
    text: &'a str,
}

/// Replaces every `#toc` paragraph in `document` with a navigation list.
///
/// Returns the number of markers replaced. Either every marker is replaced or,
/// on error, the tree is left exactly as it was.
pub fn synthesize_tocs(document: &mut Document) -> PublishResult<usize> {
    let scopes = collect_scopes(scan_blocks(document));
    if scopes.is_empty() {
        return Ok(0);
    }

    let mut planned = Vec::with_capacity(scopes.len());
    for scope in &scopes {
        debug!(
            ceiling = scope.ceiling_level,
            captured = scope.captured.len(),
            closed = scope.is_closed(),
            "table of contents scope"
        );
        let mut entries = Vec::with_capacity(scope.captured.len());
        for heading in &scope.captured {
            let Some(identifier) = heading.identifier.as_deref() else {
                return Err(PublishError::MissingHeadingIdentifier {
                    heading: heading.text.clone(),
                });
            };
            entries.push(TocEntry {
                level: heading.level,
                href: format!("#{identifier}"),
                text: &heading.text,
            });
        }
        planned.push((scope.marker, entries));
    }

    for (marker, entries) in &planned {
        let list = build_list(document, entries);
        document.replace_node(*marker, list);
        debug!(entries = entries.len(), "inserted table of contents");
    }

    Ok(planned.len())
}

fn build_list(document: &mut Document, entries: &[TocEntry<'_>]) -> NodeId {
    let list = document.create_element("ul", &[("class", TOC_LIST_CLASS)]);
    for entry in entries {
        let class = format!("toc-h{}", entry.level);
        let item = document.create_element("li", &[("class", class.as_str())]);
        let link = document.create_element("a", &[("href", entry.href.as_str())]);
        let text = document.create_text(entry.text);
        document.append_child(link, text);
        document.append_child(item, link);
        document.append_child(list, item);
    }
    list
}

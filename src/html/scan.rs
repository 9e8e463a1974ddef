use super::tree::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        node: NodeId,
        level: u8,
        identifier: Option<String>,
        text: String,
    },
    Paragraph {
        node: NodeId,
        text: String,
    },
}

/// Headings and paragraphs of `document` in source order.
///
/// Everything else is skipped here but stays in the tree. The sequence is
/// computed lazily from an immutable borrow, so it cannot observe edits.
pub fn scan_blocks(document: &Document) -> impl Iterator<Item = Block> + '_ {
    document.descendants().filter_map(move |node| {
        let element = document.element(node)?;
        if let Some(level) = element.heading_level() {
            return Some(Block::Heading {
                node,
                level,
                identifier: element
                    .attr("id")
                    .filter(|id| !id.is_empty())
                    .map(ToOwned::to_owned),
                text: document.text_content(node),
            });
        }
        if element.name == "p" {
            return Some(Block::Paragraph {
                node,
                text: document.text_content(node),
            });
        }
        None
    })
}

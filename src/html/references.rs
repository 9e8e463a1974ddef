use super::tree::{Document, NodeId};

/// A bare-filename reference found in an `img` or `a` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub node: NodeId,
    pub attribute: &'static str,
    pub value: String,
}

fn reference_attribute(tag: &str) -> Option<&'static str> {
    match tag {
        "img" => Some("src"),
        "a" => Some("href"),
        _ => None,
    }
}

/// True when `value` names a file next to the document rather than a path,
/// an external URL or an in-page anchor.
pub fn is_local_reference(value: &str) -> bool {
    if value.is_empty() || value.starts_with('#') {
        return false;
    }
    if value.contains(['/', '\\']) {
        return false;
    }
    !has_scheme(value)
}

// `mailto:x@y.z` and friends carry no slash but are not files.
fn has_scheme(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

pub fn extract_references(document: &Document) -> Vec<Reference> {
    document
        .descendants()
        .filter_map(|node| {
            let attribute = reference_attribute(document.tag_name(node)?)?;
            let value = document.attr(node, attribute)?;
            is_local_reference(value).then(|| Reference {
                node,
                attribute,
                value: value.to_string(),
            })
        })
        .collect()
}

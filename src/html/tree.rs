use std::borrow::Cow;
use std::fmt::{self, Write as _};

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape, resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};

use crate::error::PublishResult;

/// Elements whose body is text up to the matching end tag, never markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Elements that never have children, whether or not the markup self-closes them.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Heading level for `h1`..`h6`, `None` for every other element.
    pub fn heading_level(&self) -> Option<u8> {
        match self.name.as_str() {
            "h1" => Some(1),
            "h2" => Some(2),
            "h3" => Some(3),
            "h4" => Some(4),
            "h5" => Some(5),
            "h6" => Some(6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Fragment,
    Element(Element),
    /// Text exactly as it appeared in the markup, entities still escaped.
    Text(String),
    Comment(String),
    /// CDATA sections, doctypes and processing instructions, passed through untouched.
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Owned, mutable HTML fragment.
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Detached nodes stay
/// allocated but are no longer reachable from the fragment root, so ids handed
/// out by a scan remain valid while the tree is edited.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Fragment,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parses rendered HTML leniently: unmatched end tags are dropped, void
    /// elements never open a scope, and unclosed elements end with their parent.
    ///
    /// The bodies of raw-text elements (`script`, `style`, ...) are kept
    /// verbatim, and a `<` that cannot start a tag is read as text.
    pub fn parse(html: &str) -> PublishResult<Self> {
        let mut document = Self::new();
        let mut open: Vec<NodeId> = vec![Self::ROOT];

        let mut base = 0;
        let mut reader = lenient_reader(html);

        loop {
            let parent = *open.last().unwrap_or(&Self::ROOT);
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(quick_xml::Error::Syntax(_)) => {
                    // Markup left open at end of input: its `<` becomes text.
                    let at = base + reader.error_position() as usize;
                    if !html[at..].starts_with('<') {
                        document.push(NodeData::Text(escape_lt(&html[at..])), parent);
                        break;
                    }
                    document.push(NodeData::Text("&lt;".to_string()), parent);
                    base = at + 1;
                    reader = lenient_reader(&html[base..]);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let consumed = base + reader.buffer_position() as usize;

            match event {
                Event::Start(start) => {
                    let Some(element) = element_from_start(&start)? else {
                        document.push(NodeData::Text("&lt;".to_string()), parent);
                        base = consumed - start.len() - 1;
                        reader = lenient_reader(&html[base..]);
                        continue;
                    };
                    let name = element.name.clone();
                    let id = document.push(NodeData::Element(element), parent);
                    if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                        let (body, resume) = raw_text_body(html, consumed, &name);
                        if !body.is_empty() {
                            document.push(NodeData::Raw(body.to_string()), id);
                        }
                        base = resume;
                        reader = lenient_reader(&html[base..]);
                    } else if !VOID_ELEMENTS.contains(&name.as_str()) {
                        open.push(id);
                    }
                }
                Event::Empty(start) => {
                    let Some(element) = element_from_start(&start)? else {
                        document.push(NodeData::Text("&lt;".to_string()), parent);
                        base = consumed - start.len() - 2;
                        reader = lenient_reader(&html[base..]);
                        continue;
                    };
                    document.push(NodeData::Element(element), parent);
                }
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    let matching = open
                        .iter()
                        .rposition(|id| document.tag_name(*id) == Some(name.as_str()));
                    if let Some(position) = matching {
                        open.truncate(position.max(1));
                    }
                }
                Event::Text(text) => {
                    document.push(NodeData::Text(String::from_utf8_lossy(&text).into_owned()), parent);
                }
                Event::CData(data) => {
                    let raw = format!("<![CDATA[{}]]>", String::from_utf8_lossy(&data));
                    document.push(NodeData::Raw(raw), parent);
                }
                Event::Comment(comment) => {
                    let body = String::from_utf8_lossy(&comment).into_owned();
                    document.push(NodeData::Comment(body), parent);
                }
                Event::DocType(doctype) => {
                    let raw = format!("<!DOCTYPE {}>", String::from_utf8_lossy(&doctype));
                    document.push(NodeData::Raw(raw), parent);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(document)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.name.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let NodeData::Element(element) = &mut self.nodes[id.0].data else {
            return;
        };
        let value = value.into();
        match element.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => element.attrs.push((name.to_string(), value)),
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Pre-order walk over every node attached below the fragment root.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            document: self,
            stack: self.children(Self::ROOT).iter().rev().copied().collect(),
        }
    }

    /// Concatenated, entity-decoded text below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].data {
            NodeData::Text(raw) => out.push_str(&decode_entities(raw)),
            NodeData::Element(_) | NodeData::Fragment => {
                for child in &self.nodes[id.0].children {
                    self.collect_text(*child, out);
                }
            }
            NodeData::Comment(_) | NodeData::Raw(_) => {}
        }
    }

    /// Allocates a detached element.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let element = Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        };
        self.alloc(NodeData::Element(element))
    }

    /// Allocates a detached text node holding `text` verbatim (escaped on the way in).
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(partial_escape(text).into_owned()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Puts `replacement` where `target` was; `target` ends up detached.
    pub fn replace_node(&mut self, target: NodeId, replacement: NodeId) {
        let Some(parent) = self.nodes[target.0].parent else {
            return;
        };
        self.detach(replacement);
        let siblings = &mut self.nodes[parent.0].children;
        if let Some(position) = siblings.iter().position(|id| *id == target) {
            siblings[position] = replacement;
            self.nodes[replacement.0].parent = Some(parent);
            self.nodes[target.0].parent = None;
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(Self::ROOT) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.data {
            NodeData::Fragment => {}
            NodeData::Text(raw) | NodeData::Raw(raw) => out.push_str(raw),
            NodeData::Comment(body) => {
                let _ = write!(out, "<!--{body}-->");
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for (key, value) in &element.attrs {
                    let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
                }
                if VOID_ELEMENTS.contains(&element.name.as_str()) {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                let _ = write!(out, "</{}>", element.name);
            }
        }
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn push(&mut self, data: NodeData, parent: NodeId) -> NodeId {
        let id = self.alloc(data);
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.document.children(id).iter().rev().copied());
        Some(id)
    }
}

fn lenient_reader(input: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(input);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.expand_empty_elements = false;
    reader
}

/// `[A-Za-z][A-Za-z0-9-]*`
fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

/// Splits the body of a raw-text element opened at `body_start` from the
/// rest of the input. Returns the body and the offset just past its end tag.
fn raw_text_body<'a>(html: &'a str, body_start: usize, name: &str) -> (&'a str, usize) {
    let rest = &html[body_start..];
    let lowered = rest.to_ascii_lowercase();
    let close = format!("</{name}");

    let end = lowered.match_indices(&close).map(|(at, _)| at).find(|at| {
        lowered[at + close.len()..]
            .chars()
            .next()
            .is_none_or(|ch| ch == '>' || ch == '/' || ch.is_ascii_whitespace())
    });
    let Some(end) = end else {
        return (rest, html.len());
    };

    let after = body_start + end + close.len();
    let resume = html[after..]
        .find('>')
        .map_or(html.len(), |gt| after + gt + 1);
    (&rest[..end], resume)
}

fn escape_lt(raw: &str) -> String {
    raw.replace('<', "&lt;")
}

/// `None` when the tag name is not a valid HTML name, so the `<` is text.
fn element_from_start(start: &BytesStart<'_>) -> PublishResult<Option<Element>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    if !is_tag_name(&name) {
        return Ok(None);
    }

    let mut attributes = start.html_attributes();
    attributes.with_checks(false);

    let mut attrs = Vec::new();
    for attribute in attributes {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).to_ascii_lowercase();
        let raw = String::from_utf8_lossy(&attribute.value);
        attrs.push((key, decode_entities(&raw).into_owned()));
    }

    Ok(Some(Element { name, attrs }))
}

/// Resolves named and numeric character references; malformed input is kept as-is.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    unescape_with(raw, resolve_html5_entity).unwrap_or(Cow::Borrowed(raw))
}

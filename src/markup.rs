use std::collections::HashSet;
use std::sync::LazyLock;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use regex::Regex;

static SLUG_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid slug strip pattern"));
static SLUG_JOIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid slug join pattern"));

pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkdn", "mkd"];

pub fn has_markdown_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && MARKDOWN_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Renders Markdown to HTML in which every heading carries a unique `id`.
///
/// Explicit `{#id}` heading attributes are kept; other headings get a slug of
/// their text, suffixed `-2`, `-3`, ... when the slug is already taken.
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let mut events: Vec<Event<'_>> = Parser::new_ext(source, options).collect();
    assign_heading_ids(&mut events);

    let mut html_output = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut html_output, events.into_iter());
    html_output
}

fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut taken: HashSet<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
            _ => None,
        })
        .collect();

    for index in 0..events.len() {
        let needs_id = matches!(&events[index], Event::Start(Tag::Heading { id: None, .. }));
        if !needs_id {
            continue;
        }

        let text = heading_text(&events[index + 1..]);
        let slug = unique_slug(&slugify(&text), &mut taken);
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[index] {
            *id = Some(CowStr::from(slug));
        }
    }
}

fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(value) | Event::Code(value) => text.push_str(value),
            _ => {}
        }
    }
    text
}

pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(&lowered, "");
    let slug = SLUG_JOIN_RE.replace_all(stripped.trim(), "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug.to_string()
    }
}

fn unique_slug(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

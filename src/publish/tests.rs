use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;

use super::*;

fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("write source");
    }
    dir
}

fn attachment_ids(rendered: &RenderedDocument) -> HashSet<String> {
    rendered
        .attachments
        .iter()
        .map(|attachment| attachment.id.clone())
        .collect()
}

const GUIDE: &str = "# Guide\n\n![diagram](diagram.png)\n\n[notes](notes.md) and [site](https://example.com)\n";

#[test]
fn publish_twice_returns_same_identity() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");

    let first = publish(&mut store, dir.path(), "guide.md").expect("publish");
    let second = publish(&mut store, dir.path(), "guide.md").expect("republish");

    assert_eq!(first, second);
    assert_eq!(store.counts().expect("counts").roots, 1);
}

#[test]
fn publish_validates_extension_and_source() {
    let dir = workspace(&[("notes.txt", "plain")]);
    let mut store = Store::open_in_memory().expect("store");

    assert!(matches!(
        publish(&mut store, dir.path(), "notes.txt"),
        Err(PublishError::BadExtension(_))
    ));
    assert!(matches!(
        publish(&mut store, dir.path(), "absent.md"),
        Err(PublishError::SourceMissing(_))
    ));
    assert_eq!(store.counts().expect("counts").roots, 0);
}

#[test]
fn publish_rejects_paths_outside_base_directory() {
    let dir = workspace(&[("outside.md", "# Outside\n")]);
    let base = dir.path().join("site");
    fs::create_dir(&base).expect("base dir");
    fs::write(base.join("guide.md"), GUIDE).expect("write source");
    let mut store = Store::open_in_memory().expect("store");

    for filename in ["../outside.md", "site/../outside.md", "..\\outside.md", "C:outside.md", ".."] {
        assert!(
            matches!(
                publish(&mut store, &base, filename),
                Err(PublishError::InvalidFilename(name)) if name == filename
            ),
            "{filename} must be rejected"
        );
    }
    assert_eq!(store.counts().expect("counts").roots, 0);
    publish(&mut store, &base, "guide.md").expect("bare filename publishes");
}

#[test]
fn render_derives_attachments_and_rewrites_local_references() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let rendered = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");

    let filenames: Vec<&str> = rendered
        .attachments
        .iter()
        .map(|attachment| attachment.filename.as_str())
        .collect();
    assert_eq!(filenames, vec!["diagram.png", "notes.md"]);
    assert!(
        rendered
            .attachments
            .iter()
            .all(|attachment| attachment.parent_id == root.id)
    );

    assert!(
        rendered
            .html
            .contains(&format!(r#"src="/{}/diagram.png""#, root.id))
    );
    assert!(
        rendered
            .html
            .contains(&format!(r#"href="/{}/notes.md""#, root.id))
    );
    assert!(rendered.html.contains(r#"href="https://example.com""#));

    assert_eq!(store.find_children(&root.id).expect("children").len(), 2);
}

#[test]
fn rerender_keeps_html_but_churns_attachment_ids() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let first = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");
    let second = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("rerender");

    assert_eq!(first.html, second.html);
    assert!(attachment_ids(&first).is_disjoint(&attachment_ids(&second)));
    assert_eq!(store.counts().expect("counts").attachments, 2);
}

#[test]
fn stable_strategy_keeps_ids_of_unchanged_references() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let first = render(&mut store, dir.path(), &root, SyncStrategy::Stable).expect("render");
    let second = render(&mut store, dir.path(), &root, SyncStrategy::Stable).expect("rerender");
    assert_eq!(attachment_ids(&first), attachment_ids(&second));

    fs::write(
        dir.path().join("guide.md"),
        "![diagram](diagram.png)\n\n![chart](chart.png)\n",
    )
    .expect("rewrite source");
    let third = render(&mut store, dir.path(), &root, SyncStrategy::Stable).expect("render");

    let kept = first
        .attachments
        .iter()
        .find(|attachment| attachment.filename == "diagram.png")
        .expect("diagram attachment");
    assert!(third.attachments.iter().any(|attachment| attachment.id == kept.id));

    let stored: Vec<String> = store
        .find_children(&root.id)
        .expect("children")
        .into_iter()
        .map(|attachment| attachment.filename)
        .collect();
    assert_eq!(stored, vec!["diagram.png", "chart.png"]);
}

#[test]
fn repeated_reference_creates_one_attachment() {
    let dir = workspace(&[(
        "guide.md",
        "![diagram](diagram.png)\n\n[full size](diagram.png)\n",
    )]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let rendered = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");

    assert_eq!(rendered.attachments.len(), 1);
    let rewritten = format!("/{}/diagram.png", root.id);
    assert_eq!(rendered.html.matches(&rewritten).count(), 2);
}

#[test]
fn render_synthesizes_table_of_contents_after_rewriting() {
    let dir = workspace(&[(
        "guide.md",
        "# Intro\n\n#toc\n\n## Background\n\nSee [notes](notes.md).\n\n### Details\n\n# Next\n\n## Other\n",
    )]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let rendered = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");

    assert_eq!(rendered.tables_of_contents, 1);
    assert!(rendered.html.contains(concat!(
        r#"<ul class="table-of-contents">"#,
        r##"<li class="toc-h2"><a href="#background">Background</a></li>"##,
        r##"<li class="toc-h3"><a href="#details">Details</a></li>"##,
        "</ul>"
    )));
    assert!(!rendered.html.contains("#toc"));
    assert!(!rendered.html.contains(r##"href="#other""##));
    assert!(rendered.html.contains(&format!(r#"href="/{}/notes.md""#, root.id)));
}

#[test]
fn failed_toc_synthesis_stores_nothing() {
    let dir = workspace(&[(
        "guide.md",
        "![diagram](diagram.png)\n\n#toc\n\n<h2>Raw heading</h2>\n",
    )]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let err = render(&mut store, dir.path(), &root, SyncStrategy::Replace)
        .expect_err("heading without id must fail");

    assert!(matches!(err, PublishError::MissingHeadingIdentifier { .. }));
    assert!(store.find_children(&root.id).expect("children").is_empty());
}

#[test]
fn render_reports_missing_source() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");
    fs::remove_file(dir.path().join("guide.md")).expect("remove source");

    assert!(matches!(
        render(&mut store, dir.path(), &root, SyncStrategy::Replace),
        Err(PublishError::SourceMissing(_))
    ));
    assert!(directory(&store, dir.path()).expect("directory")[0].missing);
}

#[test]
fn unpublish_removes_root_and_attachments() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");
    render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");

    let report = unpublish(&mut store, "guide.md").expect("unpublish");

    assert_eq!(report.root, root);
    assert_eq!(report.attachments_removed, 2);
    assert_eq!(store.counts().expect("counts"), crate::store::RecordCounts::default());
    assert!(matches!(
        unpublish(&mut store, "guide.md"),
        Err(PublishError::NotPublished(_))
    ));
}

#[test]
fn render_after_unpublish_leaves_no_orphans() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");
    unpublish(&mut store, "guide.md").expect("unpublish");

    assert!(matches!(
        render(&mut store, dir.path(), &root, SyncStrategy::Replace),
        Err(PublishError::NotPublished(_))
    ));
    assert_eq!(store.counts().expect("counts").attachments, 0);
}

#[test]
fn attachments_are_not_roots() {
    let dir = workspace(&[("guide.md", GUIDE), ("notes.md", "# Notes\n")]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");
    let rendered = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");
    let notes = rendered
        .attachments
        .iter()
        .find(|attachment| attachment.filename == "notes.md")
        .expect("notes attachment");

    assert!(matches!(
        render_by_id(&mut store, dir.path(), &notes.id, SyncStrategy::Replace),
        Err(PublishError::NestedAttachment(_))
    ));
    assert!(matches!(
        render_by_id(&mut store, dir.path(), "no-such-id", SyncStrategy::Replace),
        Err(PublishError::NotPublished(_))
    ));
    assert!(matches!(
        publish(&mut store, dir.path(), "notes.md"),
        Err(PublishError::DuplicateFilename(_))
    ));
    assert!(matches!(
        unpublish(&mut store, "notes.md"),
        Err(PublishError::NotPublished(_))
    ));
}

#[test]
fn reference_owned_by_another_root_rolls_back() {
    let dir = workspace(&[
        ("guide.md", "![diagram](diagram.png)\n\n[other](other.md)\n"),
        ("other.md", "# Other\n"),
    ]);
    let mut store = Store::open_in_memory().expect("store");
    publish(&mut store, dir.path(), "other.md").expect("publish other");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish guide");

    assert!(matches!(
        render(&mut store, dir.path(), &root, SyncStrategy::Replace),
        Err(PublishError::DuplicateFilename(name)) if name == "other.md"
    ));
    assert!(store.find_children(&root.id).expect("children").is_empty());
}

#[test]
fn resolve_attachment_finds_only_children_of_root() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");
    render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");

    let attachment = resolve_attachment(&store, &root.id, "diagram.png").expect("resolve");
    assert_eq!(attachment.parent_id, root.id);
    assert_eq!(attachment.served_path(), format!("/{}/diagram.png", root.id));

    assert!(matches!(
        resolve_attachment(&store, &root.id, "missing.png"),
        Err(PublishError::NotPublished(_))
    ));
    assert!(matches!(
        resolve_attachment(&store, "other-root", "diagram.png"),
        Err(PublishError::NotPublished(_))
    ));
}

#[test]
fn directory_lists_roots_by_filename() {
    let dir = workspace(&[("b.md", "# B\n"), ("a.md", "![x](x.png)\n")]);
    let mut store = Store::open_in_memory().expect("store");
    publish(&mut store, dir.path(), "b.md").expect("publish b");
    let a = publish(&mut store, dir.path(), "a.md").expect("publish a");
    render(&mut store, dir.path(), &a, SyncStrategy::Replace).expect("render");

    let entries = directory(&store, dir.path()).expect("directory");

    let names: Vec<&str> = entries
        .iter()
        .map(|entry| entry.root.filename.as_str())
        .collect();
    assert_eq!(names, vec!["a.md", "b.md"]);
    assert_eq!(entries[0].served_path, format!("/{}", a.id));
    assert!(entries.iter().all(|entry| !entry.missing));
}

#[test]
fn concurrent_publishers_agree_on_one_record() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let db_path = dir.path().join("records.sqlite");
    Store::open(&db_path).expect("initialize store");

    let writers = 6;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            let base_path = dir.path().to_path_buf();
            thread::spawn(move || {
                let mut store = Store::open(&db_path).expect("open store");
                barrier.wait();
                publish(&mut store, &base_path, "guide.md").expect("publish")
            })
        })
        .collect();

    let ids: HashSet<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread").id)
        .collect();

    assert_eq!(ids.len(), 1);
    let store = Store::open(&db_path).expect("reopen store");
    assert_eq!(store.counts().expect("counts").roots, 1);
}

#[test]
fn raw_script_block_survives_render() {
    let dir = workspace(&[(
        "guide.md",
        "#toc\n\n## A\n\n<script>\nif (a<b) { go(); }\n</script>\n\n![d](diagram.png)\n\n## B\n",
    )]);
    let mut store = Store::open_in_memory().expect("store");
    let root = publish(&mut store, dir.path(), "guide.md").expect("publish");

    let rendered = render(&mut store, dir.path(), &root, SyncStrategy::Replace).expect("render");

    assert!(rendered.html.contains("<script>\nif (a<b) { go(); }\n</script>"));
    let script_end = rendered.html.find("</script>").expect("script end");
    let image = rendered
        .html
        .find(&format!(r#"<img src="/{}/diagram.png""#, root.id))
        .expect("rewritten image");
    assert!(script_end < image);
    assert!(rendered.html.contains(concat!(
        r#"<ul class="table-of-contents">"#,
        r##"<li class="toc-h2"><a href="#a">A</a></li>"##,
        r##"<li class="toc-h2"><a href="#b">B</a></li>"##,
        "</ul>"
    )));
    assert_eq!(rendered.attachments.len(), 1);
}

#[test]
fn concurrent_renders_leave_exactly_current_attachments() {
    let dir = workspace(&[(
        "guide.md",
        "![diagram](diagram.png)\n\n[notes](notes.md)\n\n![again](diagram.png)\n",
    )]);
    let db_path = dir.path().join("records.sqlite");
    let root = {
        let mut store = Store::open(&db_path).expect("initialize store");
        publish(&mut store, dir.path(), "guide.md").expect("publish")
    };

    let writers = 6;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|writer| {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            let base_path = dir.path().to_path_buf();
            let root = root.clone();
            let strategy = if writer % 2 == 0 {
                SyncStrategy::Replace
            } else {
                SyncStrategy::Stable
            };
            thread::spawn(move || {
                let mut store = Store::open(&db_path).expect("open store");
                barrier.wait();
                render(&mut store, &base_path, &root, strategy).expect("render")
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("render thread");
    }

    let store = Store::open(&db_path).expect("reopen store");
    let mut filenames: Vec<String> = store
        .find_children(&root.id)
        .expect("children")
        .into_iter()
        .map(|attachment| attachment.filename)
        .collect();
    filenames.sort();
    assert_eq!(filenames, vec!["diagram.png", "notes.md"]);
    assert_eq!(store.counts().expect("counts").attachments, 2);
}

#[test]
fn render_racing_unpublish_leaves_no_orphans() {
    let dir = workspace(&[("guide.md", GUIDE)]);
    let db_path = dir.path().join("records.sqlite");
    Store::open(&db_path).expect("initialize store");

    for _ in 0..5 {
        let root = {
            let mut store = Store::open(&db_path).expect("open store");
            publish(&mut store, dir.path(), "guide.md").expect("publish")
        };
        let barrier = Arc::new(Barrier::new(2));

        let renderer = {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            let base_path = dir.path().to_path_buf();
            let root = root.clone();
            thread::spawn(move || {
                let mut store = Store::open(&db_path).expect("open store");
                barrier.wait();
                render(&mut store, &base_path, &root, SyncStrategy::Replace).map(|_| ())
            })
        };
        let unpublisher = {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            thread::spawn(move || {
                let mut store = Store::open(&db_path).expect("open store");
                barrier.wait();
                unpublish(&mut store, "guide.md")
            })
        };

        let rendered = renderer.join().expect("render thread");
        let unpublished = unpublisher.join().expect("unpublish thread");

        assert!(matches!(rendered, Ok(()) | Err(PublishError::NotPublished(_))));
        unpublished.expect("unpublish");
        let store = Store::open(&db_path).expect("reopen store");
        assert_eq!(store.counts().expect("counts"), crate::store::RecordCounts::default());
    }
}

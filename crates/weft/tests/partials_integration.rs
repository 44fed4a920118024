//! Integration tests for file-backed templates: lookup, include, render,
//! layout inheritance and the partial name grammar.

use std::sync::Arc;

use weft::{ContextValue, Engine, EngineOptions, MemoryFileSystem, Scope, WeftError};

fn scope(pairs: &[(&str, ContextValue)]) -> ContextValue {
    ContextValue::Object(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    )
}

fn engine_with<'a>(
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
    configure: impl FnOnce(&mut EngineOptions),
) -> Engine {
    let mut options = EngineOptions {
        root: vec!["/t".to_string()],
        extname: ".html".to_string(),
        fs: Arc::new(MemoryFileSystem::with_files(files)),
        ..EngineOptions::default()
    };
    configure(&mut options);
    Engine::with_options(options).unwrap()
}

#[test]
fn test_include_shares_caller_scope() {
    let engine = engine_with(
        [("/t/part.html", "Hi {{ who }}{{ extra }}")],
        |_| {},
    );
    let out = engine
        .parse_and_render_sync(
            "{% assign who = \"W\" %}{% include \"part\" extra: \"!\" %}",
            scope(&[]),
        )
        .unwrap();
    assert_eq!(out, "Hi W!");
}

#[test]
fn test_include_with_value_binds_under_partial_name() {
    let engine = engine_with([("/t/card.html", "<{{ card }}>")], |_| {});
    let out = engine
        .parse_and_render_sync(
            "{% include \"card\" with item %}",
            scope(&[("item", ContextValue::from("x"))]),
        )
        .unwrap();
    assert_eq!(out, "<x>");
}

#[test]
fn test_render_isolates_the_partial() {
    let engine = engine_with([("/t/iso.html", "[{{ who }}{{ x }}]")], |_| {});
    let out = engine
        .parse_and_render_sync(
            "{% assign who = \"W\" %}{% render \"iso\", x: 1 %}",
            scope(&[]),
        )
        .unwrap();
    // the caller's assignment is invisible, the hash argument is not
    assert_eq!(out, "[1]");
}

#[test]
fn test_render_sees_engine_globals() {
    let engine = engine_with([("/t/g.html", "{{ site }}")], |options| {
        options.globals = Scope::from([("site".to_string(), ContextValue::from("weft"))]);
    });
    let out = engine
        .parse_and_render_sync("{% render \"g\" %}", scope(&[]))
        .unwrap();
    assert_eq!(out, "weft");
}

#[test]
fn test_render_for_loops_the_partial() {
    let engine = engine_with([("/t/item.html", "({{ thing }})")], |_| {});
    let out = engine
        .parse_and_render_sync(
            "{% render \"item\" for items as thing %}",
            scope(&[("items", ContextValue::from(vec![1, 2]))]),
        )
        .unwrap();
    assert_eq!(out, "(1)(2)");
}

#[test]
fn test_layout_named_and_anonymous_blocks() {
    let engine = engine_with(
        [(
            "/t/base.html",
            "<h1>{% block title %}T{% endblock %}</h1>{% block %}{% endblock %}",
        )],
        |_| {},
    );
    let out = engine
        .parse_and_render_sync(
            "{% layout \"base\" %}{% block title %}Home{% endblock %}body",
            scope(&[]),
        )
        .unwrap();
    assert_eq!(out, "<h1>Home</h1>body");
}

#[test]
fn test_layout_block_falls_back_to_layout_body() {
    let engine = engine_with(
        [("/t/base.html", "<{% block title %}default{% endblock %}>")],
        |_| {},
    );
    let out = engine
        .parse_and_render_sync("{% layout \"base\" %}", scope(&[]))
        .unwrap();
    assert_eq!(out, "<default>");
}

#[test]
fn test_layout_none_renders_in_place() {
    let engine = engine_with([], |_| {});
    let out = engine
        .parse_and_render_sync("{% layout none %}content", scope(&[]))
        .unwrap();
    assert_eq!(out, "content");
}

#[test]
fn test_layout_hash_arguments_are_visible() {
    let engine = engine_with([("/t/base.html", "{{ lang }}:{% block %}{% endblock %}")], |_| {});
    let out = engine
        .parse_and_render_sync("{% layout \"base\" lang: \"en\" %}x", scope(&[]))
        .unwrap();
    assert_eq!(out, "en:x");
}

#[test]
fn test_include_restores_block_state() {
    let engine = engine_with(
        [
            ("/t/base.html", "[{% block %}{% endblock %}]"),
            ("/t/note.html", "{% layout \"base\" %}inner"),
        ],
        |_| {},
    );
    let out = engine
        .parse_and_render_sync(
            "{% layout \"base\" %}{% include \"note\" %}outer",
            scope(&[]),
        )
        .unwrap();
    assert_eq!(out, "[[inner]outer]");
}

#[test]
fn test_relative_include_resolves_against_current_file() {
    let engine = engine_with(
        [
            ("/t/sub/page.html", "{% include \"./part\" %}"),
            ("/t/sub/part.html", "near"),
            ("/t/part.html", "far"),
        ],
        |_| {},
    );
    let out = engine.render_file_sync("sub/page", scope(&[])).unwrap();
    assert_eq!(out, "near");
}

#[test]
fn test_relative_escape_is_rejected() {
    let engine = engine_with([("/t/page.html", "{% include \"../../etc/passwd\" %}")], |_| {});
    let err = engine.render_file_sync("page", scope(&[])).unwrap_err();
    assert!(matches!(err, WeftError::FileNotFound { .. }));
}

#[test]
fn test_dynamic_partial_from_variable() {
    let engine = engine_with([("/t/part.html", "dyn")], |_| {});
    let out = engine
        .parse_and_render_sync(
            "{% include tpl %}",
            scope(&[("tpl", ContextValue::from("part"))]),
        )
        .unwrap();
    assert_eq!(out, "dyn");
}

#[test]
fn test_dynamic_partial_from_quoted_template() {
    let engine = engine_with([("/t/parts/a.html", "A!")], |_| {});
    let out = engine
        .parse_and_render_sync(
            "{% include \"parts/{{ name }}\" %}",
            scope(&[("name", ContextValue::from("a"))]),
        )
        .unwrap();
    assert_eq!(out, "A!");
}

#[test]
fn test_jekyll_include_wraps_hash_under_include() {
    let engine = engine_with([("/t/greet.html", "Hi {{ include.name }}")], |options| {
        options.jekyll_include = true;
    });
    let out = engine
        .parse_and_render_sync("{% include greet.html name=\"W\" %}", scope(&[]))
        .unwrap();
    assert_eq!(out, "Hi W");
}

#[test]
fn test_partials_directory_is_separate_from_root() {
    let engine = engine_with([("/p/side.html", "side")], |options| {
        options.partials = Some(vec!["/p".to_string()]);
    });
    let out = engine
        .parse_and_render_sync("{% include \"side\" %}", scope(&[]))
        .unwrap();
    assert_eq!(out, "side");
    // the include directory does not leak into top-level lookup
    assert!(matches!(
        engine.render_file_sync("side", scope(&[])).unwrap_err(),
        WeftError::FileNotFound { .. }
    ));
}

#[test]
fn test_missing_partial_reports_attempted_paths() {
    let engine = engine_with([], |_| {});
    let err = engine
        .parse_and_render_sync("{% include \"nope\" %}", scope(&[]))
        .unwrap_err();
    match err {
        WeftError::FileNotFound { name, attempted } => {
            assert_eq!(name, "nope");
            assert_eq!(attempted, vec!["/t/nope.html".to_string()]);
        }
        other => panic!("expected file-not-found, got {other:?}"),
    }
}

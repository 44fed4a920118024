//! Integration tests for the core template language: interpolation,
//! control flow, loops, whitespace control and strictness modes.

use std::collections::HashMap;

use weft::{ContextValue, Engine, EngineOptions, OutputEscape, Scope, WeftError};

fn scope(pairs: &[(&str, ContextValue)]) -> ContextValue {
    ContextValue::Object(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    )
}

fn render(text: &str, pairs: &[(&str, ContextValue)]) -> Result<String, WeftError> {
    Engine::new().parse_and_render_sync(text, scope(pairs))
}

#[test]
fn test_interpolation_and_filters() {
    let out = render(
        "{{ greeting | append: \", \" | append: name | upcase }}",
        &[
            ("greeting", ContextValue::from("hello")),
            ("name", ContextValue::from("weft")),
        ],
    )
    .unwrap();
    assert_eq!(out, "HELLO, WEFT");
}

#[test]
fn test_raw_reproduces_directives_verbatim() {
    let out = render("{% raw %}{{ x }} and {% if y %}{% endraw %}", &[]).unwrap();
    assert_eq!(out, "{{ x }} and {% if y %}");
}

#[test]
fn test_render_is_idempotent() {
    let engine = Engine::new();
    let templates = engine.parse("{% assign n = 1 %}{{ n }},{{ list | join: \"-\" }}").unwrap();
    let pairs = [("list", ContextValue::from(vec![1, 2]))];
    let first = engine.render_sync(&templates, scope(&pairs)).unwrap();
    let second = engine.render_sync(&templates, scope(&pairs)).unwrap();
    assert_eq!(first, "1,1-2");
    assert_eq!(first, second);
}

#[test]
fn test_if_elsif_else_chain() {
    let text = "{% if n > 2 %}big{% elsif n > 0 %}small{% else %}none{% endif %}";
    assert_eq!(render(text, &[("n", ContextValue::Integer(5))]).unwrap(), "big");
    assert_eq!(render(text, &[("n", ContextValue::Integer(1))]).unwrap(), "small");
    assert_eq!(render(text, &[("n", ContextValue::Integer(0))]).unwrap(), "none");
}

#[test]
fn test_operator_chain_is_flat_left_to_right() {
    // a left-to-right chain, no precedence: (true and false) or true
    let out = render(
        "{% if a and b or c %}y{% else %}n{% endif %}",
        &[
            ("a", ContextValue::Bool(true)),
            ("b", ContextValue::Bool(false)),
            ("c", ContextValue::Bool(true)),
        ],
    )
    .unwrap();
    assert_eq!(out, "y");
}

#[test]
fn test_unless_negates_first_condition() {
    let text = "{% unless done %}pending{% else %}done{% endunless %}";
    assert_eq!(render(text, &[("done", ContextValue::Bool(false))]).unwrap(), "pending");
    assert_eq!(render(text, &[("done", ContextValue::Bool(true))]).unwrap(), "done");
}

#[test]
fn test_case_when_matches_first_branch() {
    let text = "{% case n %}{% when 1, 2 %}low{% when 3 %}three{% else %}other{% endcase %}";
    assert_eq!(render(text, &[("n", ContextValue::Integer(2))]).unwrap(), "low");
    assert_eq!(render(text, &[("n", ContextValue::Integer(3))]).unwrap(), "three");
    assert_eq!(render(text, &[("n", ContextValue::Integer(9))]).unwrap(), "other");
}

#[test]
fn test_each_binds_loop_metadata() {
    let out = render(
        "{% each i in (1..3) %}{{ loop.index }}:{{ i }}{% unless loop.last %} {% endunless %}{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "1:1 2:2 3:3");

    let out = render("{% each i in (1..3) %}{{ loop.index }}{% endeach %}", &[]).unwrap();
    assert_eq!(out, "123");
}

#[test]
fn test_each_offset_limit_reversed() {
    let out = render(
        "{% each i in (1..4) offset: 1 limit: 2 reversed %}{{ i }}{% unless loop.last %},{% endunless %}{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "3,2");
}

#[test]
fn test_each_offset_continue_resumes() {
    let out = render(
        "{% each i in (1..6) limit: 3 %}{{ i }}{% endeach %}|{% each i in (1..6) offset: continue limit: 3 %}{{ i }}{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "123|456");
}

#[test]
fn test_each_else_for_empty_collection() {
    let out = render(
        "{% each x in items %}{{ x }}{% else %}empty{% endeach %}",
        &[("items", ContextValue::Array(Vec::new()))],
    )
    .unwrap();
    assert_eq!(out, "empty");
}

#[test]
fn test_each_else_ignores_modifiers() {
    // offsetting past the end empties the sequence, not the collection
    let out = render(
        "{% each i in (1..3) offset: 10 %}{{ i }}{% else %}empty{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "");
}

#[test]
fn test_each_over_object_yields_sorted_pairs() {
    let map: HashMap<String, ContextValue> = [
        ("b".to_string(), ContextValue::Integer(2)),
        ("a".to_string(), ContextValue::Integer(1)),
    ]
    .into_iter()
    .collect();
    let out = render(
        "{% each pair in m %}{{ pair[0] }}={{ pair[1] }};{% endeach %}",
        &[("m", ContextValue::Object(map))],
    )
    .unwrap();
    assert_eq!(out, "a=1;b=2;");
}

#[test]
fn test_cycle_rotates_candidates() {
    let out = render(
        "{% each i in (1..4) %}{% cycle 'odd', 'even' %} {% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "odd even odd even ");
}

#[test]
fn test_cycle_state_is_keyed_by_group_and_candidates() {
    // identical spellings share one rotation
    let out = render("{% cycle 1, 2 %}{% cycle 1, 2 %}", &[]).unwrap();
    assert_eq!(out, "12");
    // distinct groups rotate independently
    let out = render("{% cycle 'a': 1, 2 %}{% cycle 'b': 1, 2 %}", &[]).unwrap();
    assert_eq!(out, "11");
}

#[test]
fn test_break_and_continue() {
    let out = render(
        "{% each i in (1..5) %}{% if i == 3 %}{% break %}{% endif %}{{ i }}{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "12");

    let out = render(
        "{% each i in (1..5) %}{% if i == 2 %}{% continue %}{% endif %}{{ i }}{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "1345");
}

#[test]
fn test_break_only_stops_the_nearest_loop() {
    let out = render(
        "{% each i in (1..2) %}{% each j in (1..3) %}{% if j == 2 %}{% break %}{% endif %}{{ i }}{{ j }}{% endeach %}{% endeach %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "1121");
}

#[test]
fn test_assign_and_capture() {
    let out = render(
        "{% assign total = n %}{% capture label %}n is {{ total }}{% endcapture %}{{ label }}",
        &[("n", ContextValue::Integer(7))],
    )
    .unwrap();
    assert_eq!(out, "n is 7");
}

#[test]
fn test_assignment_survives_block_scopes() {
    // assign writes the bottom frame, so the value outlives the loop
    let out = render(
        "{% each i in (1..3) %}{% assign last = i %}{% endeach %}{{ last }}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "3");
}

#[test]
fn test_increment_and_decrement_counters() {
    let out = render(
        "{% increment c %}-{% increment c %}-{% increment c %} {% decrement d %}-{% decrement d %}",
        &[],
    )
    .unwrap();
    assert_eq!(out, "0-1-2 -1--2");
}

#[test]
fn test_comment_renders_nothing() {
    let out = render("a{% comment %}{{ boom }}{% endcomment %}b", &[]).unwrap();
    assert_eq!(out, "ab");
}

#[test]
fn test_echo_outputs_like_interpolation() {
    let out = render("{% echo n | append: \"!\" %}", &[("n", ContextValue::Integer(4))]).unwrap();
    assert_eq!(out, "4!");
}

#[test]
fn test_greedy_trim_markers() {
    let out = render("a \n\t {{- 'x' -}} \n b", &[]).unwrap();
    assert_eq!(out, "axb");
}

#[test]
fn test_trim_marker_only_affects_marked_side() {
    let out = render("a\n{%- assign x = 1 %}\nb", &[]).unwrap();
    assert_eq!(out, "a\nb");
}

#[test]
fn test_non_greedy_trim_stops_at_one_newline() {
    let engine = Engine::with_options(EngineOptions {
        greedy: false,
        ..EngineOptions::default()
    })
    .unwrap();
    // left of a directive: inline blanks plus one preceding newline
    let out = engine
        .parse_and_render_sync("a\n\n  {%- assign x = 1 -%}  \nb", scope(&[]))
        .unwrap();
    assert_eq!(out, "a\n\nb");
}

#[test]
fn test_global_trim_options() {
    let engine = Engine::with_options(EngineOptions {
        trim_tag_left: true,
        trim_tag_right: true,
        ..EngineOptions::default()
    })
    .unwrap();
    let out = engine
        .parse_and_render_sync("a \n {% assign x = 1 %} \n b{{ ' c' }}", scope(&[]))
        .unwrap();
    assert_eq!(out, "ab c");
}

#[test]
fn test_strict_variables_reports_dotted_path() {
    let engine = Engine::with_options(EngineOptions {
        strict_variables: true,
        ..EngineOptions::default()
    })
    .unwrap();
    let inner: HashMap<String, ContextValue> = HashMap::new();
    let err = engine
        .parse_and_render_sync(
            "{{ a.b.c }}",
            scope(&[(
                "a",
                ContextValue::Object(
                    [("b".to_string(), ContextValue::Object(inner))]
                        .into_iter()
                        .collect(),
                ),
            )]),
        )
        .unwrap_err();
    assert!(matches!(err, WeftError::UndefinedVariable(path) if path == "a.b.c"));
}

#[test]
fn test_lenient_if_tolerates_undefined_conditions() {
    let engine = Engine::with_options(EngineOptions {
        strict_variables: true,
        lenient_if: true,
        ..EngineOptions::default()
    })
    .unwrap();
    let out = engine
        .parse_and_render_sync("{% if missing %}y{% else %}n{% endif %}", scope(&[]))
        .unwrap();
    assert_eq!(out, "n");
    // a leading default filter gets the same leniency
    let out = engine
        .parse_and_render_sync("{{ missing | default: \"d\" }}", scope(&[]))
        .unwrap();
    assert_eq!(out, "d");
}

#[test]
fn test_output_escape_and_raw_filter() {
    let engine = Engine::with_options(EngineOptions {
        output_escape: Some(OutputEscape::Name("escape".to_string())),
        ..EngineOptions::default()
    })
    .unwrap();
    let out = engine
        .parse_and_render_sync(
            "{{ html }}|{{ html | raw }}",
            scope(&[("html", ContextValue::from("<b>&</b>"))]),
        )
        .unwrap();
    assert_eq!(out, "&lt;b&gt;&amp;&lt;/b&gt;|<b>&</b>");
}

#[test]
fn test_unknown_tag_placeholder() {
    let out = render("a{% widget %}b", &[]).unwrap();
    assert_eq!(out, "a<!-- unknown tag \"widget\" -->b");
}

#[test]
fn test_custom_filter_registration() {
    let mut engine = Engine::new();
    engine.register_filter_fn("shout", |input, _args| {
        Ok(ContextValue::from(format!(
            "{}!",
            input.to_display_string()
        )))
    });
    let out = engine
        .parse_and_render_sync("{{ word | shout }}", scope(&[("word", ContextValue::from("go"))]))
        .unwrap();
    assert_eq!(out, "go!");
}

#[test]
fn test_eval_value_sync() {
    let engine = Engine::new();
    let value = engine
        .eval_value_sync(
            "items | size",
            scope(&[("items", ContextValue::from(vec![1, 2, 3]))]),
        )
        .unwrap();
    assert_eq!(value, ContextValue::Integer(3));
}

#[test]
fn test_defined_nil_shadows_outer_value() {
    // a frame that defines the key as nil hides the outer definition
    let out = render(
        "{{ x }}{% each x in items %}[{{ x }}]{% endeach %}{{ x }}",
        &[
            ("x", ContextValue::from("outer")),
            ("items", ContextValue::Array(vec![ContextValue::Nil])),
        ],
    )
    .unwrap();
    assert_eq!(out, "outer[]outer");
}

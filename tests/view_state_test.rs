use spantree::bounds::compute_bounds;
use spantree::ordering::{order_spans, OrderedSpan, SpanStatus};
use spantree::span_tree::build_forest;
use spantree::view_state::{default_selection, ViewState};
use spantree::waterfall::build_waterfall;

use test_helpers::*;

fn sample_spans() -> Vec<spantree::SpanRecord> {
    vec![
        create_test_span_with_end("root", "", 0, 1_000),
        create_test_span_with_end("db", "root", 100, 400),
        create_test_span_with_end("query", "db", 150, 350),
        create_test_span_with_end("render", "root", 500, 900),
    ]
}

fn visible_ids<'a>(view_state: &ViewState, ordered: &[OrderedSpan<'a>]) -> Vec<&'a str> {
    view_state
        .visible_spans(ordered)
        .into_iter()
        .map(OrderedSpan::span_id)
        .collect()
}

#[test]
fn test_collapse_hides_descendants_only() {
    let spans = sample_spans();
    let forest = build_forest(&spans).unwrap();
    let ordered = order_spans(&forest).unwrap();
    let mut view_state = ViewState::new();

    assert_eq!(
        visible_ids(&view_state, &ordered),
        vec!["root", "db", "query", "render"]
    );

    assert!(view_state.toggle_collapsed("db"));
    assert_eq!(
        visible_ids(&view_state, &ordered),
        vec!["root", "db", "render"]
    );

    assert!(view_state.toggle_collapsed("root"));
    assert_eq!(visible_ids(&view_state, &ordered), vec!["root"]);

    assert!(!view_state.toggle_collapsed("root"));
    assert_eq!(
        visible_ids(&view_state, &ordered),
        vec!["root", "db", "render"],
        "db is still collapsed after root is expanded again"
    );

    view_state.expand_all();
    assert_eq!(visible_ids(&view_state, &ordered).len(), 4);
}

#[test]
fn test_default_selection_skips_missing_root() {
    let spans = vec![
        create_test_span("b", "gone", 50),
        create_test_span("a", "gone", 100),
    ];
    let forest = build_forest(&spans).unwrap();
    let ordered = order_spans(&forest).unwrap();

    assert_eq!(ordered[0].status(), SpanStatus::Missing);
    assert_eq!(default_selection(&ordered), Some("b"));
    assert_eq!(default_selection(&[]), None);
}

#[test]
fn test_view_state_survives_recomputation() {
    let mut spans = sample_spans();
    let mut view_state = ViewState::new();
    {
        let forest = build_forest(&spans).unwrap();
        let ordered = order_spans(&forest).unwrap();
        view_state.select("render");
        view_state.toggle_collapsed("db");
        assert_eq!(view_state.select_default(&ordered), Some("render"));
    }

    // New spans arrive, the trace is rebuilt from scratch.
    spans.push(create_test_span_with_end("cache", "db", 120, 140));
    let forest = build_forest(&spans).unwrap();
    let ordered = order_spans(&forest).unwrap();

    assert_eq!(view_state.select_default(&ordered), Some("render"));
    assert!(view_state.is_collapsed("db"));
    assert_eq!(
        visible_ids(&view_state, &ordered),
        vec!["root", "db", "render"]
    );
}

#[test]
fn test_stale_selection_is_replaced() {
    let spans = sample_spans();
    let forest = build_forest(&spans).unwrap();
    let ordered = order_spans(&forest).unwrap();

    let mut view_state = ViewState::new();
    view_state.select("no-longer-there");
    assert_eq!(view_state.select_default(&ordered), Some("root"));
}

#[test]
fn test_waterfall_rows() {
    let spans = vec![
        with_event(
            with_service(create_test_span_with_end("root", "", 0, 1_000), "frontend"),
            "cache miss",
            250,
        ),
        with_service(create_test_span_with_end("db", "root", 100, 400), "postgres"),
        create_test_span_with_end("query", "db", 150, 350),
    ];
    let forest = build_forest(&spans).unwrap();
    let ordered = order_spans(&forest).unwrap();
    let bounds = compute_bounds(&spans);

    let mut view_state = ViewState::new();
    view_state.select("db");
    let rows = build_waterfall(&ordered, bounds, &view_state);

    assert_eq!(rows.len(), 3);
    let root = &rows[0];
    assert_eq!(root.name(), Some("op-root"));
    assert_eq!(root.service_name(), Some("frontend"));
    assert_eq!(root.offset_percent, 0);
    assert_eq!(root.width_percent, 100);
    assert_eq!(root.duration.as_deref(), Some("1.000 μs"));
    assert_eq!(root.event_offsets, vec![25]);
    assert!(root.has_children);
    assert!(!root.selected);

    let db = &rows[1];
    assert_eq!(db.depth, 1);
    assert_eq!(db.offset_percent, 10);
    assert_eq!(db.width_percent, 30);
    assert_eq!(db.duration.as_deref(), Some("300 ns"));
    assert!(db.selected);

    let query = &rows[2];
    assert_eq!(query.service_name(), Some("unknown"));
    assert!(!query.has_children);

    view_state.toggle_collapsed("db");
    let rows = build_waterfall(&ordered, bounds, &view_state);
    assert_eq!(rows.len(), 2);
    assert!(rows[1].collapsed);
    assert!(rows[1].has_children, "collapsed spans still report children");
}

#[test]
fn test_waterfall_missing_rows_have_no_bar() {
    let spans = vec![create_test_span_with_end("child", "gone", 10, 20)];
    let forest = build_forest(&spans).unwrap();
    let ordered = order_spans(&forest).unwrap();
    let rows = build_waterfall(&ordered, compute_bounds(&spans), &ViewState::new());

    assert_eq!(rows[0].status, SpanStatus::Missing);
    assert_eq!(rows[0].span_id, "gone");
    assert_eq!(rows[0].name(), None);
    assert_eq!(rows[0].duration, None);
    assert_eq!(rows[0].width_percent, 0);
    assert_eq!(rows[1].width_percent, 100);
}

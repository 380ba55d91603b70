use spantree::bounds::{
    compute_bounds, duration_string, format_duration, offset_percent, width_percent, TraceBounds,
};

use test_helpers::*;

#[test]
fn test_bounds_keep_nanosecond_precision() {
    let start = 1_700_000_000_123_456_789;
    let end = 1_700_000_000_987_654_321;
    let spans = vec![
        create_test_span_with_end("inner", "outer", start + 1, end - 1),
        create_test_span_with_end("outer", "", start, end),
    ];

    let bounds = compute_bounds(&spans);
    assert_eq!(bounds.start_time, 1_700_000_000_123_456_789u64);
    assert_eq!(bounds.end_time, 1_700_000_000_987_654_321u64);
    assert_eq!(bounds.duration_nanos(), 864_197_532);
}

#[test]
fn test_neighbouring_nanoseconds_are_distinguished() {
    // Adjacent values beyond 2^53 would compare equal as f64.
    let spans = vec![
        create_test_span_with_end("a", "", 1_700_000_000_000_000_001, 1_700_000_000_000_000_003),
        create_test_span_with_end("b", "", 1_700_000_000_000_000_002, 1_700_000_000_000_000_004),
    ];
    let bounds = compute_bounds(&spans);
    assert_eq!(bounds.start_time, 1_700_000_000_000_000_001);
    assert_eq!(bounds.end_time, 1_700_000_000_000_000_004);
}

#[test]
fn test_empty_trace_has_zero_bounds() {
    assert_eq!(
        compute_bounds(&[]),
        TraceBounds {
            start_time: 0,
            end_time: 0
        }
    );
}

#[test]
fn test_untimed_spans_are_skipped() {
    let spans = vec![
        create_untimed_span("untimed", ""),
        create_test_span_with_end("timed", "", 100, 200),
    ];
    assert_eq!(
        compute_bounds(&spans),
        TraceBounds {
            start_time: 100,
            end_time: 200
        }
    );
}

#[test]
fn test_duration_formatting_boundary() {
    assert_ne!(format_duration(999_999_999).as_deref(), Some("1000.000 ms"));
    assert_eq!(format_duration(999_999_999).as_deref(), Some("999.999 ms"));
    assert_eq!(format_duration(1_000_000_000).as_deref(), Some("1.000 s"));
}

#[test]
fn test_duration_of_real_timestamps() {
    assert_eq!(
        duration_string(
            Some(1_700_000_000_123_456_789),
            Some(1_700_000_000_987_654_321)
        )
        .as_deref(),
        Some("864.197 ms")
    );
}

#[test]
fn test_offset_percent() {
    let bounds = TraceBounds {
        start_time: 1_700_000_000_000_000_000,
        end_time: 1_700_000_000_000_000_300,
    };
    assert_eq!(offset_percent(bounds, bounds.start_time), 0);
    assert_eq!(offset_percent(bounds, bounds.start_time + 100), 33);
    assert_eq!(offset_percent(bounds, bounds.start_time + 299), 99);
    assert_eq!(offset_percent(bounds, bounds.end_time), 100);
    assert_eq!(bounds.offset_percent(bounds.start_time + 150), 50);
}

#[test]
fn test_offset_before_start_rounds_down() {
    let bounds = TraceBounds {
        start_time: 1_000,
        end_time: 1_300,
    };
    assert_eq!(offset_percent(bounds, 999), -1);
}

#[test]
fn test_zero_width_bounds_fall_back_to_zero() {
    let bounds = TraceBounds {
        start_time: 500,
        end_time: 500,
    };
    assert_eq!(offset_percent(bounds, 500), 0);
    assert_eq!(offset_percent(bounds, 10_000), 0);
    assert_eq!(width_percent(bounds, 500, 500), 0);
}

#[test]
fn test_width_percent() {
    let bounds = TraceBounds {
        start_time: 0,
        end_time: 1_000,
    };
    assert_eq!(width_percent(bounds, 0, 1_000), 100);
    assert_eq!(width_percent(bounds, 100, 434), 33);
    assert_eq!(width_percent(bounds, 100, 435), 34);
}

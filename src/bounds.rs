//! Trace-wide time bounds and the integer arithmetic used to lay spans out inside them.
//!
//! Timestamps are nanoseconds since the epoch, which is well past the range in which `f64`
//! is exact. Differences and percentages are computed in `i128`.

use crate::types::{
    SpanRecord, UnixNanos, NANOS_PER_MICROSECOND, NANOS_PER_MILLISECOND, NANOS_PER_SECOND,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceBounds {
    pub start_time: UnixNanos,
    pub end_time: UnixNanos,
}

impl TraceBounds {
    pub fn duration_nanos(&self) -> i128 {
        i128::from(self.end_time) - i128::from(self.start_time)
    }

    /// Position of `time` within the bounds as a whole percentage, rounded down.
    pub fn offset_percent(&self, time: UnixNanos) -> i64 {
        offset_percent(*self, time)
    }
}

/// Earliest start and latest end over all spans.
/// Absent timestamps are skipped, an empty trace yields `{ 0, 0 }`.
pub fn compute_bounds(spans: &[SpanRecord]) -> TraceBounds {
    let start_time = spans.iter().filter_map(|span| span.start_time).min();
    let end_time = spans.iter().filter_map(|span| span.end_time).max();

    TraceBounds {
        start_time: start_time.unwrap_or_default(),
        end_time: end_time.unwrap_or_default(),
    }
}

/// `floor((time - start) * 100 / (end - start))`, or 0 when the bounds have no width.
///
/// Times before `start` give negative offsets, which round down too: -0.25% becomes -1.
pub fn offset_percent(bounds: TraceBounds, time: UnixNanos) -> i64 {
    let total = bounds.duration_nanos();
    if total <= 0 {
        return 0;
    }
    let offset = i128::from(time) - i128::from(bounds.start_time);
    clamp_to_i64((offset * 100).div_euclid(total))
}

/// Share of the trace covered by `[start, end]` as a whole percentage, rounded to nearest
/// with halves rounded up. 0 when the bounds have no width.
pub fn width_percent(bounds: TraceBounds, start: UnixNanos, end: UnixNanos) -> i64 {
    let total = bounds.duration_nanos();
    if total <= 0 {
        return 0;
    }
    let length = i128::from(end) - i128::from(start);
    clamp_to_i64((length * 200 + total).div_euclid(total * 2))
}

fn clamp_to_i64(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Format a duration using the largest unit in which it is at least 1.
///
/// Seconds, milliseconds and microseconds get three decimals, which are truncated so that a
/// value never rounds up into the next unit. Negative durations have no representation.
pub fn format_duration(duration_nanos: i128) -> Option<String> {
    if duration_nanos < 0 {
        return None;
    }

    let (unit_nanos, unit) = if duration_nanos >= NANOS_PER_SECOND {
        (NANOS_PER_SECOND, "s")
    } else if duration_nanos >= NANOS_PER_MILLISECOND {
        (NANOS_PER_MILLISECOND, "ms")
    } else if duration_nanos >= NANOS_PER_MICROSECOND {
        (NANOS_PER_MICROSECOND, "μs")
    } else {
        return Some(format!("{duration_nanos} ns"));
    };

    let whole = duration_nanos / unit_nanos;
    let thousandths = (duration_nanos % unit_nanos) * 1000 / unit_nanos;
    Some(format!("{whole}.{thousandths:03} {unit}"))
}

/// Duration between two timestamps, `None` if either is absent or the end precedes the start.
pub fn duration_string(start: Option<UnixNanos>, end: Option<UnixNanos>) -> Option<String> {
    let duration = i128::from(end?) - i128::from(start?);
    format_duration(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_unit() {
        assert_eq!(format_duration(0).as_deref(), Some("0 ns"));
        assert_eq!(format_duration(999).as_deref(), Some("999 ns"));
        assert_eq!(format_duration(1_000).as_deref(), Some("1.000 μs"));
        assert_eq!(format_duration(1_234_567).as_deref(), Some("1.234 ms"));
        assert_eq!(format_duration(12_345_678_901).as_deref(), Some("12.345 s"));
    }

    #[test]
    fn unit_boundaries_do_not_round_up() {
        assert_eq!(format_duration(999_999).as_deref(), Some("999.999 μs"));
        assert_eq!(format_duration(999_999_999).as_deref(), Some("999.999 ms"));
        assert_eq!(format_duration(1_000_000_000).as_deref(), Some("1.000 s"));
    }

    #[test]
    fn negative_durations_are_absent() {
        assert_eq!(format_duration(-1), None);
        assert_eq!(duration_string(Some(10), Some(5)), None);
        assert_eq!(duration_string(None, Some(5)), None);
        assert_eq!(duration_string(Some(5), Some(5)).as_deref(), Some("0 ns"));
    }

    #[test]
    fn width_rounds_half_up() {
        let bounds = TraceBounds {
            start_time: 0,
            end_time: 200,
        };
        assert_eq!(width_percent(bounds, 0, 1), 1);
        assert_eq!(width_percent(bounds, 0, 3), 2);
        assert_eq!(width_percent(bounds, 50, 250), 100);
        assert_eq!(width_percent(TraceBounds::default(), 0, 3), 0);
    }
}

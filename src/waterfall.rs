//! Row layout for a waterfall view.
//!
//! Combines the ordered spans, the trace bounds and the caller's view state into the values a
//! renderer needs for each visible row. Positions are whole percentages of the trace duration.

use crate::bounds::{duration_string, offset_percent, width_percent, TraceBounds};
use crate::ordering::{OrderedSpan, SpanStatus};
use crate::types::SpanRecord;
use crate::view_state::ViewState;

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallRow<'a> {
    pub span_id: &'a str,
    pub depth: usize,
    pub status: SpanStatus,
    pub span: Option<&'a SpanRecord>,
    /// Start of the bar, from the start of the trace.
    pub offset_percent: i64,
    /// Length of the bar, never negative.
    pub width_percent: i64,
    pub duration: Option<String>,
    /// Positions of the span's timed events.
    pub event_offsets: Vec<i64>,
    pub has_children: bool,
    pub selected: bool,
    pub collapsed: bool,
}

impl WaterfallRow<'_> {
    pub fn name(&self) -> Option<&str> {
        self.span.map(|span| span.payload.name.as_str())
    }

    pub fn service_name(&self) -> Option<&str> {
        self.span.map(SpanRecord::service_name)
    }
}

pub fn build_waterfall<'a>(
    ordered: &[OrderedSpan<'a>],
    bounds: TraceBounds,
    view_state: &ViewState,
) -> Vec<WaterfallRow<'a>> {
    let mut rows = Vec::with_capacity(ordered.len());

    for (index, span) in ordered.iter().enumerate() {
        let depth = span.depth();
        // Children directly follow their parent in depth-first order.
        let has_children = ordered
            .get(index + 1)
            .is_some_and(|next| next.depth() > depth);

        let span_id = span.span_id();
        let mut row = WaterfallRow {
            span_id,
            depth,
            status: span.status(),
            span: span.span(),
            offset_percent: 0,
            width_percent: 0,
            duration: None,
            event_offsets: Vec::new(),
            has_children,
            selected: view_state.is_selected(span_id),
            collapsed: view_state.is_collapsed(span_id),
        };

        if let Some(record) = span.span() {
            if let Some(start_time) = record.start_time {
                row.offset_percent = offset_percent(bounds, start_time);
                if let Some(end_time) = record.end_time {
                    row.width_percent = width_percent(bounds, start_time, end_time).max(0);
                }
            }
            row.duration = duration_string(record.start_time, record.end_time);
            row.event_offsets = record
                .payload
                .events
                .iter()
                .filter_map(|event| event.time)
                .map(|time| offset_percent(bounds, time))
                .collect();
        }

        rows.push(row);
    }

    // Hidden rows are dropped after the has_children pass, a collapsed span still has children.
    let visible: Vec<&str> = view_state
        .visible_spans(ordered)
        .into_iter()
        .map(OrderedSpan::span_id)
        .collect();
    if visible.len() < rows.len() {
        let mut visible = visible.into_iter().peekable();
        rows.retain(|row| {
            if visible.peek() == Some(&row.span_id) {
                visible.next();
                true
            } else {
                false
            }
        });
    }

    rows
}

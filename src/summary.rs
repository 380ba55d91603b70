//! One-line descriptions of traces, used for trace lists.

use std::cmp::Reverse;

use crate::bounds::duration_string;
use crate::types::{SpanRecord, UnixNanos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSpan {
    pub service_name: String,
    pub name: String,
    pub start_time: Option<UnixNanos>,
    pub end_time: Option<UnixNanos>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    pub trace_id: String,
    /// `None` when the root span of the trace hasn't been received.
    pub root_span: Option<RootSpan>,
    pub span_count: usize,
}

impl TraceSummary {
    pub fn has_root_span(&self) -> bool {
        self.root_span.is_some()
    }

    pub fn duration_string(&self) -> Option<String> {
        let root = self.root_span.as_ref()?;
        duration_string(root.start_time, root.end_time)
    }
}

/// The root span is the first span without a parent.
pub fn summarize(trace_id: &str, spans: &[SpanRecord]) -> TraceSummary {
    let root_span = spans.iter().find(|span| span.is_root()).map(|root| RootSpan {
        service_name: root.service_name().to_string(),
        name: root.payload.name.clone(),
        start_time: root.start_time,
        end_time: root.end_time,
    });

    TraceSummary {
        trace_id: trace_id.to_string(),
        root_span,
        span_count: spans.len(),
    }
}

/// Most recent root span first. Traces without a root, or with an untimed one, go last.
pub fn sort_summaries(summaries: &mut [TraceSummary]) {
    summaries.sort_by_key(|summary| {
        let start = summary.root_span.as_ref().and_then(|root| root.start_time);
        (start.is_none(), Reverse(start))
    });
}

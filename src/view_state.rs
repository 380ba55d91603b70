//! Interaction state of a waterfall: which span is selected and which subtrees are collapsed.
//!
//! The state is keyed by span id and owned by the caller, separate from the reconstructed
//! trace. Rebuilding the ordered spans after new data arrives leaves it untouched.

use std::collections::HashSet;

use crate::ordering::{OrderedSpan, SpanStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    selected: Option<String>,
    collapsed: HashSet<String>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, span_id: impl Into<String>) {
        self.selected = Some(span_id.into());
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_selected(&self, span_id: &str) -> bool {
        self.selected.as_deref() == Some(span_id)
    }

    /// Selects the first present span unless the current selection is still part of the trace.
    /// Returns the selected id.
    pub fn select_default(&mut self, ordered: &[OrderedSpan<'_>]) -> Option<&str> {
        let still_present = self.selected.as_deref().is_some_and(|selected| {
            ordered
                .iter()
                .any(|span| span.status() == SpanStatus::Present && span.span_id() == selected)
        });
        if !still_present {
            self.selected = default_selection(ordered).map(str::to_string);
        }
        self.selected()
    }

    /// Collapse the span's subtree, or expand it if it was collapsed. Returns the new state.
    pub fn toggle_collapsed(&mut self, span_id: &str) -> bool {
        if self.collapsed.remove(span_id) {
            false
        } else {
            self.collapsed.insert(span_id.to_string());
            true
        }
    }

    pub fn is_collapsed(&self, span_id: &str) -> bool {
        self.collapsed.contains(span_id)
    }

    pub fn expand_all(&mut self) {
        self.collapsed.clear();
    }

    /// The spans left after hiding the descendants of every collapsed span.
    ///
    /// Relies on the depth-first order: the descendants of a span are exactly the spans that
    /// follow it with a greater depth.
    pub fn visible_spans<'s, 'a>(&self, ordered: &'s [OrderedSpan<'a>]) -> Vec<&'s OrderedSpan<'a>> {
        let mut visible = Vec::with_capacity(ordered.len());
        let mut collapsed_at_depth: Option<usize> = None;

        for span in ordered {
            if let Some(depth) = collapsed_at_depth {
                if span.depth() > depth {
                    continue;
                }
                collapsed_at_depth = None;
            }
            visible.push(span);
            if self.is_collapsed(span.span_id()) {
                collapsed_at_depth = Some(span.depth());
            }
        }

        visible
    }
}

/// The first present span; a missing root in front of it is skipped.
pub fn default_selection<'a>(ordered: &[OrderedSpan<'a>]) -> Option<&'a str> {
    ordered
        .iter()
        .find(|span| span.status() == SpanStatus::Present)
        .map(OrderedSpan::span_id)
}

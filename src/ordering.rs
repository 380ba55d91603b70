//! Flattens a span forest into the linear order in which a waterfall displays it.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Result, TreeError};
use crate::span_tree::{Forest, TreeNode};
use crate::task_timer::TaskTimer;
use crate::types::{SpanRecord, UnixNanos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Present,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanMetadata<'a> {
    /// Number of parent hops to the root, roots have depth 0.
    pub depth: usize,
    pub span_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderedSpan<'a> {
    Present {
        span: &'a SpanRecord,
        metadata: SpanMetadata<'a>,
    },
    Missing {
        metadata: SpanMetadata<'a>,
    },
}

impl<'a> OrderedSpan<'a> {
    pub fn status(&self) -> SpanStatus {
        match self {
            OrderedSpan::Present { .. } => SpanStatus::Present,
            OrderedSpan::Missing { .. } => SpanStatus::Missing,
        }
    }

    pub fn metadata(&self) -> SpanMetadata<'a> {
        match self {
            OrderedSpan::Present { metadata, .. } | OrderedSpan::Missing { metadata } => *metadata,
        }
    }

    pub fn depth(&self) -> usize {
        self.metadata().depth
    }

    pub fn span_id(&self) -> &'a str {
        self.metadata().span_id
    }

    pub fn span(&self) -> Option<&'a SpanRecord> {
        match self {
            OrderedSpan::Present { span, .. } => Some(span),
            OrderedSpan::Missing { .. } => None,
        }
    }
}

/// Depth-first walk over the forest.
///
/// Roots keep the order chosen by the forest builder. Siblings are emitted by ascending start
/// time, spans without a start time come after their timed siblings. The walk uses an explicit
/// stack, so deep traces can't overflow the call stack.
pub fn order_spans(forest: &Forest) -> Result<Vec<OrderedSpan<'_>>> {
    let t = TaskTimer::new("Ordering spans");

    let mut ordered = Vec::with_capacity(forest.len());
    let mut visited: HashSet<&str> = HashSet::with_capacity(forest.len());

    for root in forest.roots() {
        let mut stack: Vec<(&TreeNode, usize)> = vec![(root, 0)];

        while let Some((node, depth)) = stack.pop() {
            if !visited.insert(node.span_id()) {
                return Err(TreeError::Cycle {
                    span_id: node.span_id().to_string(),
                });
            }

            let metadata = SpanMetadata {
                depth,
                span_id: node.span_id(),
            };
            ordered.push(match node {
                TreeNode::Present { span, .. } => OrderedSpan::Present { span, metadata },
                TreeNode::Ghost { .. } => OrderedSpan::Missing { metadata },
            });

            let mut children: Vec<&TreeNode> = forest.children(node).collect();
            if let Some(ghost) = children.iter().find(|child| child.is_ghost()) {
                return Err(TreeError::NestedGhost {
                    span_id: ghost.span_id().to_string(),
                    parent_span_id: node.span_id().to_string(),
                });
            }

            // The stack pops the last pushed child first, so push the latest one first.
            children.sort_by(|a, b| start_order_key(b).cmp(&start_order_key(a)));
            stack.extend(children.into_iter().map(|child| (child, depth + 1)));
        }
    }

    if visited.len() < forest.len() {
        return Err(TreeError::Cycle {
            span_id: find_cycle_member(forest, &visited),
        });
    }

    debug!(spans = ordered.len(), "ordered spans");
    t.stop();
    Ok(ordered)
}

fn start_order_key(node: &TreeNode) -> (bool, UnixNanos) {
    let start_time = node.start_time();
    (start_time.is_none(), start_time.unwrap_or_default())
}

/// Nodes that can't be reached from any root hang below a parent cycle.
/// Follows parent links from the smallest unreached id until an id repeats.
fn find_cycle_member<'a>(forest: &'a Forest, visited: &HashSet<&'a str>) -> String {
    let Some(start) = forest
        .nodes()
        .map(TreeNode::span_id)
        .filter(|id| !visited.contains(id))
        .min()
    else {
        return String::new();
    };

    let mut on_path: HashSet<&str> = HashSet::new();
    let mut current = start;
    loop {
        if !on_path.insert(current) {
            return current.to_string();
        }
        match forest.get(current).and_then(TreeNode::span) {
            Some(span) if !span.is_root() => current = span.parent_span_id.as_str(),
            _ => return start.to_string(),
        }
    }
}

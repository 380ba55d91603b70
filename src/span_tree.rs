//! Reconstruction of the span hierarchy from a flat, unordered list of spans.
//!
//! Parents may show up after their children or never show up at all. A parent that is
//! referenced but never seen is represented by a ghost node, which keeps the orphaned
//! subtree attached to something that can be displayed.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{Result, TreeError};
use crate::task_timer::TaskTimer;
use crate::types::{SpanRecord, UnixNanos};

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Present {
        span: SpanRecord,
        children: Vec<String>,
    },
    /// A span that was referenced as a parent but never received.
    Ghost {
        span_id: String,
        children: Vec<String>,
    },
}

impl TreeNode {
    pub fn span_id(&self) -> &str {
        match self {
            TreeNode::Present { span, .. } => &span.span_id,
            TreeNode::Ghost { span_id, .. } => span_id,
        }
    }

    /// Ids of the children, in the order in which they were linked.
    pub fn children(&self) -> &[String] {
        match self {
            TreeNode::Present { children, .. } | TreeNode::Ghost { children, .. } => children,
        }
    }

    fn children_mut(&mut self) -> &mut Vec<String> {
        match self {
            TreeNode::Present { children, .. } | TreeNode::Ghost { children, .. } => children,
        }
    }

    pub fn span(&self) -> Option<&SpanRecord> {
        match self {
            TreeNode::Present { span, .. } => Some(span),
            TreeNode::Ghost { .. } => None,
        }
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self, TreeNode::Ghost { .. })
    }

    pub fn start_time(&self) -> Option<UnixNanos> {
        self.span().and_then(|span| span.start_time)
    }
}

/// All nodes of one trace, owned by id, plus the ordered list of roots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    nodes: HashMap<String, TreeNode>,
    roots: Vec<String>,
}

impl Forest {
    /// Root ids: spans without a parent in input order, then ghosts sorted by start time.
    pub fn root_ids(&self) -> &[String] {
        &self.roots
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn get(&self, span_id: &str) -> Option<&TreeNode> {
        self.nodes.get(span_id)
    }

    pub fn children<'a>(&'a self, node: &'a TreeNode) -> impl Iterator<Item = &'a TreeNode> {
        node.children().iter().filter_map(|id| self.nodes.get(id))
    }

    /// Number of nodes, ghosts included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.nodes.values().filter(|node| !node.is_ghost()).count()
    }

    pub fn ghost_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_ghost()).count()
    }

    /// Iterates over all nodes in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    #[cfg(test)]
    pub(crate) fn from_parts(nodes: Vec<TreeNode>, roots: Vec<&str>) -> Self {
        Forest {
            nodes: nodes
                .into_iter()
                .map(|node| (node.span_id().to_string(), node))
                .collect(),
            roots: roots.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Build the span forest of a single trace.
///
/// Spans are processed in input order. When a span id occurs more than once the last record
/// wins: its payload and its parent link replace the earlier ones, while children that were
/// already linked to the id are kept.
pub fn build_forest(spans: &[SpanRecord]) -> Result<Forest> {
    let t = TaskTimer::new("Building span forest");

    let mut nodes: HashMap<String, TreeNode> = HashMap::with_capacity(spans.len());
    let mut roots: Vec<String> = Vec::new();
    // Every id a ghost was created for, in creation order. Some of them get promoted later.
    let mut ghost_ids: Vec<String> = Vec::new();

    for span in spans {
        let span_id = &span.span_id;

        let mut children = match nodes.remove(span_id) {
            None => Vec::new(),
            Some(TreeNode::Ghost { children, .. }) => children,
            Some(TreeNode::Present {
                span: previous,
                children,
            }) => {
                warn!(span_id = %span_id, "duplicate span id, the later record replaces the earlier one");
                detach(&mut nodes, &mut roots, &previous);
                children
            }
        };
        // Only a self-referencing record links a span below itself. That link belongs to the
        // replaced record, a self-referencing new record adds it again below.
        children.retain(|child| child != span_id);

        nodes.insert(
            span_id.clone(),
            TreeNode::Present {
                span: span.clone(),
                children,
            },
        );

        if span.is_root() {
            roots.push(span_id.clone());
            continue;
        }

        let parent = nodes
            .entry(span.parent_span_id.clone())
            .or_insert_with(|| {
                ghost_ids.push(span.parent_span_id.clone());
                TreeNode::Ghost {
                    span_id: span.parent_span_id.clone(),
                    children: Vec::new(),
                }
            });
        parent.children_mut().push(span_id.clone());
    }

    let real_root_count = roots.len();
    let mut seen_ghosts: HashSet<&str> = HashSet::new();
    let mut ghost_roots: Vec<(Option<UnixNanos>, &str)> = Vec::new();
    for ghost_id in &ghost_ids {
        if !seen_ghosts.insert(ghost_id.as_str()) {
            continue;
        }
        let Some(node) = nodes.get(ghost_id).filter(|node| node.is_ghost()) else {
            // Promoted, or removed after its only child moved away.
            continue;
        };
        if node.children().is_empty() {
            return Err(TreeError::ChildlessGhost {
                span_id: ghost_id.clone(),
            });
        }
        ghost_roots.push((earliest_present_start(&nodes, node)?, ghost_id.as_str()));
    }

    // Stable, so ghosts that start at the same time keep their creation order.
    ghost_roots.sort_by_key(|(earliest, _)| (earliest.is_none(), *earliest));
    roots.extend(ghost_roots.into_iter().map(|(_, id)| id.to_string()));

    debug!(
        spans = spans.len(),
        nodes = nodes.len(),
        roots = real_root_count,
        ghost_roots = roots.len() - real_root_count,
        "built span forest"
    );
    t.stop();

    Ok(Forest { nodes, roots })
}

/// Remove the link created for an earlier record of a span that is about to be replaced.
fn detach(nodes: &mut HashMap<String, TreeNode>, roots: &mut Vec<String>, previous: &SpanRecord) {
    let span_id = &previous.span_id;
    if previous.is_root() {
        roots.retain(|root| root != span_id);
        return;
    }

    let Some(parent) = nodes.get_mut(&previous.parent_span_id) else {
        return;
    };
    let siblings = parent.children_mut();
    if let Some(position) = siblings.iter().position(|child| child == span_id) {
        siblings.remove(position);
    }
    if parent.is_ghost() && parent.children().is_empty() {
        nodes.remove(&previous.parent_span_id);
    }
}

/// Earliest start among the present descendants of a ghost.
///
/// Immediate children decide. Deeper levels are only consulted when no span on the levels
/// above carries a start time. `Ok(None)` means present descendants exist but none is timed.
fn earliest_present_start(
    nodes: &HashMap<String, TreeNode>,
    ghost: &TreeNode,
) -> Result<Option<UnixNanos>> {
    let mut seen: HashSet<&str> = HashSet::from([ghost.span_id()]);
    let mut level: Vec<&TreeNode> = vec![ghost];
    let mut found_present = false;

    loop {
        let mut next_level: Vec<&TreeNode> = Vec::new();
        for &node in &level {
            for child_id in node.children() {
                if !seen.insert(child_id.as_str()) {
                    return Err(TreeError::Cycle {
                        span_id: child_id.clone(),
                    });
                }
                next_level.extend(nodes.get(child_id));
            }
        }
        level = next_level;
        if level.is_empty() {
            break;
        }

        let mut earliest: Option<UnixNanos> = None;
        for node in &level {
            if let Some(span) = node.span() {
                found_present = true;
                if let Some(start_time) = span.start_time {
                    earliest = Some(earliest.map_or(start_time, |e| e.min(start_time)));
                }
            }
        }
        if earliest.is_some() {
            return Ok(earliest);
        }
    }

    if found_present {
        Ok(None)
    } else {
        Err(TreeError::GhostWithoutPresentDescendant {
            span_id: ghost.span_id().to_string(),
        })
    }
}

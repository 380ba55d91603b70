pub mod bounds;
pub mod error;
pub mod input;
pub mod ordering;
pub mod settings;
pub mod span_tree;
pub mod summary;
pub mod task_timer;
pub mod types;
pub mod view_state;
pub mod waterfall;

pub use bounds::{compute_bounds, format_duration, TraceBounds};
pub use error::TreeError;
pub use ordering::{order_spans, OrderedSpan, SpanStatus};
pub use span_tree::{build_forest, Forest, TreeNode};
pub use types::{SpanRecord, UnixNanos};

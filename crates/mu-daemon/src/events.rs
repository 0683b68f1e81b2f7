//! Graph change events broadcast to WebSocket subscribers.
//!
//! Per spec.md §4.7, the worker emits one event per node touched by a
//! commit; per §5, delivery is a `tokio::sync::broadcast` bus with
//! bounded per-connection queues that drop slow consumers rather than
//! block the worker.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEventKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEvent {
    pub kind: GraphEventKind,
    pub node_id: String,
    pub file_path: String,
}

//! Weft Graph
//!
//! This crate turns a raw flow (`weft-config`) into the graph the engine runs.
//!
//! Key differences from `weft-config`:
//! - Groups are flattened away; every vertex is a concrete component
//! - Edges are validated (no dangling ends, target fields exist)
//! - A dependency index (predecessors/successors) is maintained per vertex
//! - Subgraphs, entry points and a deterministic run order can be derived

mod error;
mod flatten;
mod graph;
mod order;
mod subgraph;
mod vertex;

pub use error::GraphError;
pub use flatten::flatten;
pub use graph::Graph;
pub use subgraph::{DEFAULT_INPUT_PRIORITY, find_entry_point};
pub use vertex::{Edge, Vertex};

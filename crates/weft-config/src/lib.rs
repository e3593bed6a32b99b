//! Weft Config
//!
//! This crate contains the serializable flow representation for weft. These
//! types mirror the JSON a visual flow editor exports: nodes with component
//! templates, edges with source/target handles, and group nodes that carry a
//! nested flow.
//!
//! Flows can be loaded from:
//! - Bare `{ "nodes": [...], "edges": [...] }` documents
//! - Exported flow documents that wrap the graph in a `data` key
//!
//! Keys this crate does not model (positions, UI metadata, ...) are kept in
//! `extra` maps so a flow survives a load/save cycle. The engine takes these
//! types, flattens groups and builds an executable graph from them.

mod edge;
mod flow;
mod node;
mod template;
mod tweaks;

pub use edge::{EdgeData, EdgeInfo, SourceHandle, TargetHandle};
pub use flow::{FlowData, NestedFlow};
pub use node::{NodeData, NodeInfo, NodeSpec, OutputDef};
pub use template::{ProxyRef, Template, TemplateField};
pub use tweaks::{Tweaks, apply_tweaks};

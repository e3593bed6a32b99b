//! Weft Engine
//!
//! This crate runs a flow graph: it orders the vertices, resolves each
//! vertex's parameters, invokes the component build capability once per
//! selected output and streams the results back as they are produced.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - run(graph, request) → RunStream                          │
//! │  - observers, variables, frozen-result cache                │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         RunLoop                             │
//! │  - scope (start/stop), ready queue, inactive branches       │
//! │  - before/after GraphEvents for every transition            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Resolver  →  ComponentBuilder (per output)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use weft_engine::{Engine, PassthroughBuilder, RunRequest};
//! use weft_resolver::StandardResolver;
//! use weft_storage::FsStorage;
//!
//! let engine = Engine::new(
//!   Arc::new(PassthroughBuilder),
//!   Arc::new(StandardResolver::new(FsStorage::new("/data/files"))),
//! );
//! let summary = engine
//!   .run_to_end(Arc::new(graph), RunRequest::default().with_input("input_value", "hi"))
//!   .await?;
//! ```

mod builder;
mod engine;
mod error;
mod events;
mod recorder;
mod request;
mod result;
mod run;
mod state;
mod variables;

pub use builder::{BuildError, BuildOutput, BuildRequest, ComponentBuilder, PassthroughBuilder, Route};
pub use engine::{Engine, EngineConfig, RunStream};
pub use error::EngineError;
pub use events::{
  ChannelObserver, EventType, GraphEvent, Observer, ObserverId, ObserverRegistry, RunSnapshot,
  Timing,
};
pub use recorder::{ComponentSnapshot, EventLog, Recorder, RecordingError, SnapshotDelta};
pub use request::{INPUT_FIELD_NAME, RunRequest};
pub use result::{DEFAULT_OUTPUT, RunEvent, RunSummary, VertexBuild};
pub use state::{
  OutputBinding, SharedState, StateError, StateField, StateModel, StateModelBuilder, StateRecord,
  StateValue, ValueType,
};
pub use variables::{MemoryVariables, VariableStore};

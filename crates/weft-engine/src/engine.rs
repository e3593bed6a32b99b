use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{Stream, StreamExt};
use tracing::error;
use weft_graph::{DEFAULT_INPUT_PRIORITY, Graph};
use weft_resolver::Resolver;

use crate::builder::ComponentBuilder;
use crate::error::EngineError;
use crate::events::{Observer, ObserverId, ObserverRegistry};
use crate::request::RunRequest;
use crate::result::{RunEvent, RunSummary, VertexBuild};
use crate::run::RunLoop;
use crate::variables::{MemoryVariables, VariableStore};

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Input kinds, most preferred first, used to pick a run's entry point.
  pub input_priority: Vec<String>,
  /// Look up stored variables in the process environment when the variable
  /// store does not have them.
  pub fallback_to_env_vars: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      input_priority: DEFAULT_INPUT_PRIORITY.iter().map(|s| s.to_string()).collect(),
      fallback_to_env_vars: false,
    }
  }
}

/// Events of a run, ending with [`RunEvent::Finished`] or an error.
///
/// Dropping the stream abandons the run, including any build in progress.
pub type RunStream = Pin<Box<dyn Stream<Item = Result<RunEvent, EngineError>> + Send>>;

/// Runs graphs.
///
/// An engine holds the capabilities shared by its runs (builder, resolver,
/// variables), the observer list and the cache of frozen vertex results.
/// Cloning it is cheap and clones share all of them.
#[derive(Clone)]
pub struct Engine {
  config: EngineConfig,
  builder: Arc<dyn ComponentBuilder>,
  resolver: Arc<dyn Resolver>,
  variables: Arc<dyn VariableStore>,
  observers: ObserverRegistry,
  /// Frozen vertex results keyed by (flow id, vertex id).
  frozen: Arc<Mutex<HashMap<(String, String), VertexBuild>>>,
}

impl Engine {
  pub fn new(builder: Arc<dyn ComponentBuilder>, resolver: Arc<dyn Resolver>) -> Self {
    Self {
      config: EngineConfig::default(),
      builder,
      resolver,
      variables: Arc::new(MemoryVariables::new()),
      observers: ObserverRegistry::new(),
      frozen: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn with_config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_variables(mut self, variables: Arc<dyn VariableStore>) -> Self {
    self.variables = variables;
    self
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn register_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
    self.observers.register(observer)
  }

  pub fn unregister_observer(&self, id: ObserverId) -> bool {
    self.observers.unregister(id)
  }

  pub fn observers(&self) -> &ObserverRegistry {
    &self.observers
  }

  /// Forget cached results of frozen vertices.
  pub fn clear_frozen_cache(&self) {
    self.frozen.lock().unwrap_or_else(PoisonError::into_inner).clear();
  }

  pub(crate) fn builder(&self) -> &dyn ComponentBuilder {
    self.builder.as_ref()
  }

  pub(crate) fn resolver(&self) -> &dyn Resolver {
    self.resolver.as_ref()
  }

  pub(crate) fn variables(&self) -> &dyn VariableStore {
    self.variables.as_ref()
  }

  pub(crate) fn frozen_build(&self, flow_id: &str, vertex_id: &str) -> Option<VertexBuild> {
    let frozen = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
    frozen
      .get(&(flow_id.to_string(), vertex_id.to_string()))
      .cloned()
  }

  pub(crate) fn store_frozen(&self, flow_id: &str, build: &VertexBuild) {
    let mut frozen = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
    frozen.insert((flow_id.to_string(), build.vertex_id.clone()), build.clone());
  }

  /// Start a run.
  ///
  /// Nothing happens until the stream is polled. Vertices are built one at a
  /// time; each build is yielded as soon as it completes.
  pub fn run(&self, graph: Arc<Graph>, request: RunRequest) -> RunStream {
    let mut run = RunLoop::new(self.clone(), graph, request);

    Box::pin(async_stream::stream! {
      if let Err(e) = run.prepare().await {
        error!(run_id = %run.run_id(), error = %e, "run_failed");
        yield Err(e);
        return;
      }

      while let Some(vertex_id) = run.next_ready() {
        match run.step(&vertex_id).await {
          Ok(build) => {
            yield Ok(RunEvent::Built(build));
          }
          Err(e) => {
            error!(
              run_id = %run.run_id(),
              vertex_id = ?e.vertex_id(),
              error = %e,
              "run_failed"
            );
            yield Err(e);
            return;
          }
        }
      }

      let summary = run.finish().await;
      yield Ok(RunEvent::Finished(summary));
    })
  }

  /// Run to completion and return the summary.
  pub async fn run_to_end(&self, graph: Arc<Graph>, request: RunRequest) -> Result<RunSummary, EngineError> {
    let mut stream = self.run(graph, request);
    while let Some(event) = stream.next().await {
      if let RunEvent::Finished(summary) = event? {
        return Ok(summary);
      }
    }
    Err(EngineError::Cancelled)
  }
}

impl std::fmt::Debug for Engine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Engine")
      .field("config", &self.config)
      .field("observers", &self.observers)
      .finish_non_exhaustive()
  }
}

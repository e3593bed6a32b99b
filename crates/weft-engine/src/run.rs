//! State of a single run.
//!
//! A [`RunLoop`] owns everything one run mutates: the vertex states, the
//! ready queue, the predecessors each pending vertex still waits for and the
//! builds produced so far. The engine drives it one vertex at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info, info_span, warn};
use weft_config::OutputDef;
use weft_graph::{Edge, Graph, GraphError, Vertex};
use weft_resolver::{ResolvedParams, Upstream};

use crate::builder::{BuildRequest, BuildOutput};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{EventType, GraphEvent, RunSnapshot, Timing};
use crate::request::{INPUT_FIELD_NAME, RunRequest};
use crate::result::{DEFAULT_OUTPUT, RunSummary, VertexBuild};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexState {
  Pending,
  Ready,
  Building,
  Built,
  Inactive,
}

/// An event whose `before` half has been dispatched.
struct Transition {
  step: u64,
  event_type: EventType,
  vertex_id: Option<String>,
  before: RunSnapshot,
}

pub(crate) struct RunLoop {
  engine: Engine,
  graph: Arc<Graph>,
  request: RunRequest,
  run_id: String,
  step: u64,
  scope: BTreeSet<String>,
  entry: Option<String>,
  states: HashMap<String, VertexState>,
  waiting: BTreeMap<String, BTreeSet<String>>,
  ready: Vec<String>,
  builds: HashMap<String, VertexBuild>,
  call_order: Vec<String>,
  inactive: Vec<String>,
}

impl RunLoop {
  pub(crate) fn new(engine: Engine, graph: Arc<Graph>, request: RunRequest) -> Self {
    Self {
      engine,
      graph,
      request,
      run_id: uuid::Uuid::new_v4().to_string(),
      step: 0,
      scope: BTreeSet::new(),
      entry: None,
      states: HashMap::new(),
      waiting: BTreeMap::new(),
      ready: Vec::new(),
      builds: HashMap::new(),
      call_order: Vec::new(),
      inactive: Vec::new(),
    }
  }

  pub(crate) fn run_id(&self) -> &str {
    &self.run_id
  }

  /// Validate the request, fix the run scope and queue the first vertices.
  pub(crate) async fn prepare(&mut self) -> Result<(), EngineError> {
    if self.request.start.is_some() && self.request.stop.is_some() {
      return Err(EngineError::InvalidRequest {
        message: "start and stop cannot both be set".to_string(),
      });
    }
    if let Some(value) = self.request.inputs.get(INPUT_FIELD_NAME)
      && !value.is_string()
    {
      return Err(EngineError::InvalidRequest {
        message: format!("{INPUT_FIELD_NAME} must be a string"),
      });
    }

    let start = self.request.start.as_deref().map(|name| self.lookup(name)).transpose()?;
    let stop = self.request.stop.as_deref().map(|name| self.lookup(name)).transpose()?;
    let scope = match (&start, &stop) {
      (Some(start), _) => self.graph.downstream_closure(start)?,
      (_, Some(stop)) => self.graph.upstream_closure(stop)?,
      _ => self.graph.vertex_ids().map(str::to_string).collect(),
    };
    self.graph.run_order(Some(&scope))?;

    for name in &self.request.outputs {
      if self.graph.vertex_by_name(name).is_none() {
        warn!(run_id = %self.run_id, output = %name, "unknown_output_vertex");
      }
    }

    let entry = start.or_else(|| {
      self
        .graph
        .entry_point(&self.engine.config().input_priority)
        .filter(|id| scope.contains(*id))
        .map(str::to_string)
    });

    let transition = self.begin(EventType::Prepare, None).await;
    self.scope = scope;
    self.entry = entry;
    for id in &self.scope {
      let waits: BTreeSet<String> = self
        .graph
        .predecessors(id)
        .iter()
        .filter(|p| self.scope.contains(*p))
        .cloned()
        .collect();
      if waits.is_empty() {
        self.states.insert(id.clone(), VertexState::Ready);
        self.ready.push(id.clone());
      } else {
        self.states.insert(id.clone(), VertexState::Pending);
        self.waiting.insert(id.clone(), waits);
      }
    }
    self.sort_ready();

    info!(
      run_id = %self.run_id,
      vertices = self.scope.len(),
      entry = ?self.entry,
      "run_started"
    );
    let changes = json!({
      "scope": self.scope.iter().collect::<Vec<_>>(),
      "entry": self.entry,
    });
    self.complete(transition, changes).await;
    Ok(())
  }

  /// The vertex to build next.
  pub(crate) fn next_ready(&self) -> Option<String> {
    self.ready.first().cloned()
  }

  /// Build one ready vertex and release what it unblocks.
  pub(crate) async fn step(&mut self, vertex_id: &str) -> Result<VertexBuild, EngineError> {
    if self.request.cancel.is_cancelled() {
      warn!(run_id = %self.run_id, "run_cancelled");
      return Err(EngineError::Cancelled);
    }

    let transition = self.begin(EventType::BuildVertex, Some(vertex_id)).await;
    self.ready.retain(|id| id != vertex_id);
    self.states.insert(vertex_id.to_string(), VertexState::Building);

    let build = self.build_vertex(vertex_id).await?;
    let updated = self.apply_state(&build);

    self.states.insert(vertex_id.to_string(), VertexState::Built);
    self.call_order.push(vertex_id.to_string());
    self.builds.insert(vertex_id.to_string(), build.clone());

    info!(
      run_id = %self.run_id,
      vertex_id = %vertex_id,
      cached = build.cached,
      "vertex_built"
    );
    let changes = json!({
      "outputs": build.outputs.keys().collect::<Vec<_>>(),
      "cached": build.cached,
      "state": updated,
    });
    self.complete(transition, changes).await;

    self.release_successors(vertex_id).await;
    Ok(build)
  }

  /// Close the run and collect the requested outputs.
  pub(crate) async fn finish(&mut self) -> RunSummary {
    let transition = self.begin(EventType::Finish, None).await;

    let outputs = self
      .call_order
      .iter()
      .filter(|id| self.is_requested_output(id))
      .filter_map(|id| self.builds.get(id).cloned())
      .collect();
    let summary = RunSummary {
      run_id: self.run_id.clone(),
      call_order: self.call_order.clone(),
      inactive: self.inactive.clone(),
      outputs,
    };

    info!(
      run_id = %self.run_id,
      built = summary.call_order.len(),
      inactive = summary.inactive.len(),
      "run_finished"
    );
    let changes = json!({
      "call_order": summary.call_order,
      "inactive": summary.inactive,
    });
    self.complete(transition, changes).await;
    summary
  }

  fn lookup(&self, name: &str) -> Result<String, EngineError> {
    self
      .graph
      .vertex_by_name(name)
      .map(|vertex| vertex.id.clone())
      .ok_or_else(|| GraphError::VertexNotFound(name.to_string()).into())
  }

  fn is_requested_output(&self, vertex_id: &str) -> bool {
    let Some(vertex) = self.graph.vertex(vertex_id) else {
      return false;
    };
    if self.request.outputs.is_empty() {
      vertex.is_output
    } else {
      self.request.outputs.iter().any(|name| vertex.answers_to(name))
    }
  }

  /// Entry point first, then by id.
  fn sort_ready(&mut self) {
    let entry = self.entry.clone();
    self
      .ready
      .sort_by_key(|id| (entry.as_deref() != Some(id.as_str()), id.clone()));
  }

  fn snapshot(&self) -> RunSnapshot {
    RunSnapshot {
      queue: self.ready.clone(),
      built: self.call_order.clone(),
      inactive: self.inactive.clone(),
      waiting: self
        .waiting
        .iter()
        .map(|(id, waits)| (id.clone(), waits.iter().cloned().collect()))
        .collect(),
    }
  }

  async fn begin(&mut self, event_type: EventType, vertex_id: Option<&str>) -> Transition {
    let transition = Transition {
      step: self.step,
      event_type,
      vertex_id: vertex_id.map(str::to_string),
      before: self.snapshot(),
    };
    self.step += 1;

    let event = GraphEvent {
      run_id: self.run_id.clone(),
      step: transition.step,
      timing: Timing::Before,
      event_type,
      vertex_id: transition.vertex_id.clone(),
      changes: Value::Null,
      state_before: Some(transition.before.clone()),
      state_after: None,
    };
    self.engine.observers().notify(&event).await;
    transition
  }

  async fn complete(&self, transition: Transition, changes: Value) {
    let event = GraphEvent {
      run_id: self.run_id.clone(),
      step: transition.step,
      timing: Timing::After,
      event_type: transition.event_type,
      vertex_id: transition.vertex_id,
      changes,
      state_before: Some(transition.before),
      state_after: Some(self.snapshot()),
    };
    self.engine.observers().notify(&event).await;
  }

  async fn build_vertex(&self, vertex_id: &str) -> Result<VertexBuild, EngineError> {
    let graph = self.graph.clone();
    let vertex = graph.get_vertex(vertex_id)?;

    if vertex.frozen
      && let Some(mut cached) = self.engine.frozen_build(graph.flow_id(), vertex_id)
    {
      debug!(run_id = %self.run_id, vertex_id = %vertex_id, "frozen_cache_hit");
      cached.cached = true;
      return Ok(cached);
    }

    let mut params = self
      .engine
      .resolver()
      .resolve(&graph, vertex_id)
      .map_err(|source| EngineError::Resolution {
        vertex_id: vertex_id.to_string(),
        source,
      })?;
    self.overlay_inputs(vertex, &mut params);
    if let Some(session_id) = &self.request.session_id
      && vertex.has_field("session_id")
    {
      params.set_value("session_id", Value::String(session_id.clone()));
    }
    self.load_variables(vertex_id, &mut params).await?;

    let inputs = params.materialize(|upstream| self.upstream_value(upstream));

    let mut outputs = IndexMap::new();
    for output in self.select_outputs(&graph, vertex) {
      let name = output.map_or(DEFAULT_OUTPUT, |o| o.name.as_str()).to_string();
      let built = self.build_output(vertex, output, &name, &inputs).await?;
      outputs.insert(name, built);
    }

    let build = VertexBuild {
      vertex_id: vertex_id.to_string(),
      display_name: vertex.display_name.clone(),
      inputs,
      outputs,
      cached: false,
    };
    if vertex.frozen {
      self.engine.store_frozen(graph.flow_id(), &build);
    }
    Ok(build)
  }

  async fn build_output(
    &self,
    vertex: &Vertex,
    output: Option<&OutputDef>,
    name: &str,
    inputs: &serde_json::Map<String, Value>,
  ) -> Result<BuildOutput, EngineError> {
    let request = BuildRequest {
      run_id: &self.run_id,
      vertex,
      output,
      params: inputs,
    };
    let span = info_span!(
      "vertex_build",
      run_id = %self.run_id,
      vertex_id = %vertex.id,
      output = %name
    );
    let build = self.engine.builder().build(request).instrument(span);

    let result = tokio::select! {
      biased;
      _ = self.request.cancel.cancelled() => {
        warn!(run_id = %self.run_id, vertex_id = %vertex.id, "build_cancelled");
        return Err(EngineError::Cancelled);
      }
      result = build => result,
    };

    result.map_err(|source| {
      error!(
        run_id = %self.run_id,
        vertex_id = %vertex.id,
        output = %name,
        error = %source,
        "build_failed"
      );
      EngineError::Build {
        vertex_id: vertex.id.clone(),
        output: name.to_string(),
        source,
      }
    })
  }

  /// Put the run inputs on an input vertex the request targets.
  fn overlay_inputs(&self, vertex: &Vertex, params: &mut ResolvedParams) {
    if !vertex.is_input || self.request.inputs.is_empty() {
      return;
    }
    let components = &self.request.input_components;
    if !components.is_empty() && !components.iter().any(|c| vertex.answers_to(c)) {
      return;
    }
    if let Some(kind) = self.request.input_type.as_deref()
      && kind != "any"
      && !vertex.id.to_lowercase().contains(&kind.to_lowercase())
    {
      return;
    }

    for (name, value) in &self.request.inputs {
      if name == INPUT_FIELD_NAME || vertex.has_field(name) {
        params.set_value(name.clone(), value.clone());
      }
    }
  }

  /// Replace variable names in `load_from_db` fields with their values.
  async fn load_variables(&self, vertex_id: &str, params: &mut ResolvedParams) -> Result<(), EngineError> {
    for field in params.load_from_db.clone() {
      let Some(name) = params
        .get(&field)
        .and_then(|p| p.as_value())
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
      else {
        continue;
      };

      let mut value = self.engine.variables().get(&name).await;
      if value.is_none() && self.engine.config().fallback_to_env_vars {
        value = std::env::var(&name).ok();
      }
      let Some(value) = value else {
        return Err(EngineError::VariableNotFound {
          vertex_id: vertex_id.to_string(),
          field,
          name,
        });
      };
      params.set_value(field, Value::String(value));
    }
    Ok(())
  }

  /// The value an upstream reference stands for, if it is live.
  fn upstream_value(&self, upstream: &Upstream) -> Option<Value> {
    let build = self.builds.get(&upstream.vertex_id)?;
    let output = build.output(upstream.output.as_deref())?;
    (!output.is_suppressed()).then(|| output.value.clone())
  }

  /// The outputs to invoke for `vertex`.
  ///
  /// A vertex nobody consumes runs every output. Otherwise only the wired
  /// outputs run, widened to the whole `group_outputs` set when one of them
  /// belongs to it.
  fn select_outputs<'g>(&self, graph: &'g Graph, vertex: &'g Vertex) -> Vec<Option<&'g OutputDef>> {
    let Some(first) = vertex.outputs.first() else {
      return vec![None];
    };
    let wired: BTreeSet<&str> = graph
      .outbound_edges(&vertex.id)
      .map(|edge| edge.source_output.as_deref().unwrap_or(first.name.as_str()))
      .collect();
    if wired.is_empty() {
      return vertex.outputs.iter().map(Some).collect();
    }

    let grouped = vertex
      .outputs
      .iter()
      .any(|o| o.group_outputs && wired.contains(o.name.as_str()));
    let selected: Vec<Option<&OutputDef>> = vertex
      .outputs
      .iter()
      .filter(|o| wired.contains(o.name.as_str()) || (grouped && o.group_outputs))
      .map(Some)
      .collect();
    if selected.is_empty() {
      return vertex.outputs.iter().map(Some).collect();
    }
    selected
  }

  fn apply_state(&self, build: &VertexBuild) -> Vec<String> {
    let Some(state) = &self.request.state else {
      return Vec::new();
    };
    let mut record = state.lock().unwrap_or_else(PoisonError::into_inner);
    record.apply(build)
  }

  /// Whether `edge` carries nothing: its source is inactive or suppressed the
  /// output the edge reads.
  fn is_dead(&self, edge: &Edge) -> bool {
    match self.states.get(&edge.source_id) {
      Some(VertexState::Inactive) => true,
      Some(VertexState::Built) => self
        .builds
        .get(&edge.source_id)
        .and_then(|build| build.output(edge.source_output.as_deref()))
        .is_none_or(BuildOutput::is_suppressed),
      _ => false,
    }
  }

  fn all_inbound_dead(&self, vertex_id: &str) -> bool {
    let mut inbound = self
      .graph
      .inbound_edges(vertex_id)
      .filter(|edge| self.scope.contains(&edge.source_id))
      .peekable();
    inbound.peek().is_some() && inbound.all(|edge| self.is_dead(edge))
  }

  /// Queue the successors `settled` unblocked, and mark inactive those whose
  /// every input is dead. Inactivity propagates.
  async fn release_successors(&mut self, settled: &str) {
    let graph = self.graph.clone();
    let mut worklist = VecDeque::from([settled.to_string()]);

    while let Some(current) = worklist.pop_front() {
      let successors: Vec<&String> = graph
        .successors(&current)
        .iter()
        .filter(|s| self.states.get(*s) == Some(&VertexState::Pending))
        .collect();
      if successors.is_empty() {
        continue;
      }

      let transition = self.begin(EventType::QueueReady, Some(&current)).await;
      let mut queued = Vec::new();
      let mut dead = Vec::new();
      for successor in successors {
        let Some(waits) = self.waiting.get_mut(successor) else {
          continue;
        };
        waits.remove(&current);
        if !waits.is_empty() {
          continue;
        }
        if self.all_inbound_dead(successor) {
          dead.push(successor.clone());
        } else {
          self.waiting.remove(successor);
          self.states.insert(successor.clone(), VertexState::Ready);
          self.ready.push(successor.clone());
          queued.push(successor.clone());
        }
      }
      self.sort_ready();
      self.complete(transition, json!({ "queued": queued })).await;

      for vertex_id in dead {
        let transition = self.begin(EventType::MarkInactive, Some(&vertex_id)).await;
        self.waiting.remove(&vertex_id);
        self.states.insert(vertex_id.clone(), VertexState::Inactive);
        self.inactive.push(vertex_id.clone());
        debug!(run_id = %self.run_id, vertex_id = %vertex_id, "vertex_inactive");
        self.complete(transition, json!({ "inactive": vertex_id })).await;
        worklist.push_back(vertex_id);
      }
    }
  }
}

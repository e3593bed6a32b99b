use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::state::SharedState;

/// Template field that receives a run's input text.
pub const INPUT_FIELD_NAME: &str = "input_value";

/// Parameters of a single run.
///
/// `Default` runs every vertex with no inputs.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
  /// Values overlaid on matching input vertices. `input_value` must be a
  /// string.
  pub inputs: Map<String, Value>,
  /// Input vertices (id or display name) the inputs apply to. Empty means
  /// every input vertex.
  pub input_components: Vec<String>,
  /// Only input vertices whose id contains this kind receive inputs. `None`
  /// or `any` disables the filter.
  pub input_type: Option<String>,
  /// Vertices (id or display name) whose builds the summary reports.
  pub outputs: Vec<String>,
  /// Run only this vertex and what depends on it.
  pub start: Option<String>,
  /// Run only this vertex and what it depends on.
  pub stop: Option<String>,
  pub session_id: Option<String>,
  pub state: Option<SharedState>,
  pub cancel: CancellationToken,
}

impl RunRequest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.inputs.insert(name.into(), value.into());
    self
  }

  pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
    self.inputs.extend(inputs);
    self
  }

  pub fn for_input_components<I, S>(mut self, components: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.input_components = components.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
    self.input_type = Some(input_type.into());
    self
  }

  pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.outputs = outputs.into_iter().map(Into::into).collect();
    self
  }

  pub fn starting_at(mut self, vertex: impl Into<String>) -> Self {
    self.start = Some(vertex.into());
    self
  }

  pub fn stopping_at(mut self, vertex: impl Into<String>) -> Self {
    self.stop = Some(vertex.into());
    self
  }

  pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
    self.session_id = Some(session_id.into());
    self
  }

  pub fn with_state(mut self, state: SharedState) -> Self {
    self.state = Some(state);
    self
  }

  pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }
}

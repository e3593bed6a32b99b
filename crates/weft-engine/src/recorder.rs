//! Event log persistence.
//!
//! [`Recorder`] is an observer that keeps every event of the runs it watches.
//! The resulting [`EventLog`] can be written to JSON and read back, then
//! replayed as a per-component timeline.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{EventType, GraphEvent, Observer, Timing};

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
  #[error("event log io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("event log json error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Recorded events, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
  pub events: Vec<GraphEvent>,
  /// Vertices in the order they finished building.
  pub call_order: Vec<String>,
}

/// One vertex build as seen from the run state around it.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSnapshot {
  pub vertex_id: String,
  pub step: u64,
  pub queue_before: Vec<String>,
  pub queue_after: Vec<String>,
  pub waiting_before: BTreeSet<String>,
  pub waiting_after: BTreeSet<String>,
  pub changes: Value,
}

/// Differences between the state before and after a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDelta {
  pub queue_added: Vec<String>,
  pub queue_removed: Vec<String>,
  /// Vertices that started or stopped waiting.
  pub waiting_changed: Vec<String>,
}

impl ComponentSnapshot {
  pub fn delta(&self) -> SnapshotDelta {
    let queue_added = self
      .queue_after
      .iter()
      .filter(|id| !self.queue_before.contains(id))
      .cloned()
      .collect();
    let queue_removed = self
      .queue_before
      .iter()
      .filter(|id| !self.queue_after.contains(id))
      .cloned()
      .collect();
    let waiting_changed = self
      .waiting_before
      .symmetric_difference(&self.waiting_after)
      .cloned()
      .collect();
    SnapshotDelta {
      queue_added,
      queue_removed,
      waiting_changed,
    }
  }
}

impl EventLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, event: GraphEvent) {
    if event.event_type == EventType::BuildVertex
      && event.timing == Timing::After
      && let Some(vertex_id) = &event.vertex_id
    {
      self.call_order.push(vertex_id.clone());
    }
    self.events.push(event);
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(self)?;
    tokio::fs::write(path, json).await?;
    Ok(())
  }

  pub async fn load(path: impl AsRef<Path>) -> Result<Self, RecordingError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  /// Every completed vertex build, in build order.
  ///
  /// The state after a build includes the queueing and inactivation that the
  /// build triggered, up to the next build or the end of the run.
  pub fn timeline(&self) -> Vec<ComponentSnapshot> {
    let mut timeline = Vec::new();
    for (index, event) in self.events.iter().enumerate() {
      if event.event_type != EventType::BuildVertex || event.timing != Timing::After {
        continue;
      }
      let (Some(vertex_id), Some(before)) = (&event.vertex_id, &event.state_before) else {
        continue;
      };
      let settled = self.events[index + 1..]
        .iter()
        .take_while(|e| !matches!(e.event_type, EventType::BuildVertex | EventType::Finish))
        .filter_map(|e| e.state_after.as_ref())
        .last()
        .or(event.state_after.as_ref());
      let Some(after) = settled else {
        continue;
      };

      timeline.push(ComponentSnapshot {
        vertex_id: vertex_id.clone(),
        step: event.step,
        queue_before: before.queue.clone(),
        queue_after: after.queue.clone(),
        waiting_before: before.waiting.keys().cloned().collect(),
        waiting_after: after.waiting.keys().cloned().collect(),
        changes: event.changes.clone(),
      });
    }
    timeline
  }

  pub fn snapshot_for(&self, vertex_id: &str) -> Option<ComponentSnapshot> {
    self.timeline().into_iter().find(|s| s.vertex_id == vertex_id)
  }

  pub fn snapshot_at(&self, step: u64) -> Option<ComponentSnapshot> {
    self.timeline().into_iter().find(|s| s.step == step)
  }
}

/// Observer that records events into an [`EventLog`].
#[derive(Debug, Clone, Default)]
pub struct Recorder {
  log: Arc<Mutex<EventLog>>,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  /// A copy of everything recorded so far.
  pub fn log(&self) -> EventLog {
    self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
    let log = self.log();
    log.save(path).await
  }
}

#[async_trait]
impl Observer for Recorder {
  async fn on_event(&self, event: &GraphEvent) {
    self
      .log
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(event.clone());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::RunSnapshot;
  use serde_json::json;
  use std::collections::BTreeMap;

  fn snapshot(queue: &[&str], waiting: &[&str]) -> RunSnapshot {
    RunSnapshot {
      queue: queue.iter().map(|s| s.to_string()).collect(),
      built: vec![],
      inactive: vec![],
      waiting: waiting
        .iter()
        .map(|s| (s.to_string(), vec!["x".to_string()]))
        .collect::<BTreeMap<_, _>>(),
    }
  }

  fn build_events(step: u64, vertex: &str, before: RunSnapshot, after: RunSnapshot) -> [GraphEvent; 2] {
    let base = GraphEvent {
      run_id: "run-1".to_string(),
      step,
      timing: Timing::Before,
      event_type: EventType::BuildVertex,
      vertex_id: Some(vertex.to_string()),
      changes: json!({}),
      state_before: Some(before.clone()),
      state_after: None,
    };
    let after_event = GraphEvent {
      timing: Timing::After,
      changes: json!({ "outputs": ["result"] }),
      state_after: Some(after),
      ..base.clone()
    };
    [base, after_event]
  }

  fn sample_log() -> EventLog {
    let mut log = EventLog::new();
    for event in build_events(1, "A", snapshot(&["A"], &["B", "C"]), snapshot(&[], &["B", "C"])) {
      log.push(event);
    }
    for event in build_events(3, "B", snapshot(&["B"], &["C"]), snapshot(&[], &["C"])) {
      log.push(event);
    }
    log
  }

  #[test]
  fn test_push_tracks_call_order() {
    let log = sample_log();
    assert_eq!(log.len(), 4);
    assert_eq!(log.call_order, vec!["A", "B"]);
  }

  #[test]
  fn test_timeline_and_delta() {
    let log = sample_log();
    let timeline = log.timeline();
    assert_eq!(timeline.len(), 2);

    let a = &timeline[0];
    assert_eq!(a.vertex_id, "A");
    let delta = a.delta();
    assert_eq!(delta.queue_removed, vec!["A"]);
    assert!(delta.queue_added.is_empty());
    assert!(delta.waiting_changed.is_empty());

    let b = log.snapshot_at(3).unwrap();
    assert_eq!(b.vertex_id, "B");
    assert!(log.snapshot_for("C").is_none());
  }

  #[tokio::test]
  async fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("run.json");

    let log = sample_log();
    log.save(&path).await.unwrap();
    let loaded = EventLog::load(&path).await.unwrap();
    assert_eq!(loaded, log);
  }

  #[tokio::test]
  async fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = EventLog::load(dir.path().join("nope.json")).await.unwrap_err();
    assert!(matches!(err, RecordingError::Io(_)));
  }

  #[tokio::test]
  async fn test_recorder_observes() {
    let recorder = Recorder::new();
    for event in sample_log().events {
      recorder.on_event(&event).await;
    }
    assert_eq!(recorder.log().call_order, vec!["A", "B"]);
  }
}

//! Run events and observers.
//!
//! Every transition of a run (preparing, building a vertex, queueing the
//! vertices it unblocked, marking a branch inactive, finishing) is announced
//! twice: once before it happens and once after, each time with a snapshot
//! of the run state. Observers receive the events by shared reference.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Whether an event precedes or follows its transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
  Before,
  After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
  Prepare,
  BuildVertex,
  QueueReady,
  MarkInactive,
  Finish,
}

/// The run state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
  /// Vertices ready to build, in the order they will be picked.
  pub queue: Vec<String>,
  pub built: Vec<String>,
  pub inactive: Vec<String>,
  /// In-scope predecessors each pending vertex still waits for.
  pub waiting: BTreeMap<String, Vec<String>>,
}

/// An observable run transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEvent {
  pub run_id: String,
  /// Position of the transition in the run. Before and after events of one
  /// transition share a step.
  pub step: u64,
  pub timing: Timing,
  pub event_type: EventType,
  pub vertex_id: Option<String>,
  /// What the transition changed (vertices queued, outputs built, ...).
  pub changes: Value,
  pub state_before: Option<RunSnapshot>,
  /// Only set on `after` events.
  pub state_after: Option<RunSnapshot>,
}

/// Receives run events.
#[async_trait]
pub trait Observer: Send + Sync {
  async fn on_event(&self, event: &GraphEvent);
}

/// Handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Observers {
  next_id: u64,
  entries: Vec<(ObserverId, Arc<dyn Observer>)>,
}

/// Observer list shared between an engine and its runs.
///
/// Registering or unregistering while a run is in progress takes effect from
/// the next dispatched event.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
  inner: Arc<Mutex<Observers>>,
}

impl ObserverRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverId {
    let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    let id = ObserverId(inner.next_id);
    inner.next_id += 1;
    inner.entries.push((id, observer));
    id
  }

  /// Returns whether the observer was registered.
  pub fn unregister(&self, id: ObserverId) -> bool {
    let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    let before = inner.entries.len();
    inner.entries.retain(|(entry, _)| *entry != id);
    inner.entries.len() != before
  }

  pub fn len(&self) -> usize {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Current observers, in registration order.
  pub fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
    let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.entries.iter().map(|(_, observer)| observer.clone()).collect()
  }

  /// Deliver `event` to every observer, one after the other.
  pub async fn notify(&self, event: &GraphEvent) {
    for observer in self.snapshot() {
      observer.on_event(event).await;
    }
  }
}

impl std::fmt::Debug for ObserverRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ObserverRegistry").field("len", &self.len()).finish()
  }
}

/// An observer that forwards events to an unbounded channel.
///
/// Unbounded so a slow consumer never holds up the run.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
  sender: mpsc::UnboundedSender<GraphEvent>,
}

impl ChannelObserver {
  pub fn new(sender: mpsc::UnboundedSender<GraphEvent>) -> Self {
    Self { sender }
  }

  /// Create an observer together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

#[async_trait]
impl Observer for ChannelObserver {
  async fn on_event(&self, event: &GraphEvent) {
    // Receiver dropped means nobody is listening anymore.
    let _ = self.sender.send(event.clone());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn event(step: u64, timing: Timing) -> GraphEvent {
    GraphEvent {
      run_id: "run-1".to_string(),
      step,
      timing,
      event_type: EventType::BuildVertex,
      vertex_id: Some("A".to_string()),
      changes: json!({}),
      state_before: Some(RunSnapshot::default()),
      state_after: None,
    }
  }

  struct Tagged {
    tag: &'static str,
    seen: Arc<Mutex<Vec<String>>>,
  }

  #[async_trait]
  impl Observer for Tagged {
    async fn on_event(&self, event: &GraphEvent) {
      self.seen.lock().unwrap().push(format!("{}:{}", self.tag, event.step));
    }
  }

  #[tokio::test]
  async fn test_notify_in_registration_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = ObserverRegistry::new();
    registry.register(Arc::new(Tagged {
      tag: "a",
      seen: seen.clone(),
    }));
    let b = registry.register(Arc::new(Tagged {
      tag: "b",
      seen: seen.clone(),
    }));

    registry.notify(&event(0, Timing::Before)).await;
    assert!(registry.unregister(b));
    assert!(!registry.unregister(b));
    registry.notify(&event(1, Timing::After)).await;

    assert_eq!(*seen.lock().unwrap(), vec!["a:0", "b:0", "a:1"]);
    assert_eq!(registry.len(), 1);
  }

  #[tokio::test]
  async fn test_channel_observer() {
    let (observer, mut rx) = ChannelObserver::channel();
    observer.on_event(&event(3, Timing::Before)).await;

    let received = rx.recv().await.unwrap();
    assert_eq!(received.step, 3);
    assert_eq!(received.timing, Timing::Before);
  }

  #[tokio::test]
  async fn test_channel_observer_ignores_closed_receiver() {
    let (observer, rx) = ChannelObserver::channel();
    drop(rx);
    observer.on_event(&event(0, Timing::Before)).await;
  }

  #[test]
  fn test_event_serde_names() {
    let value = serde_json::to_value(event(0, Timing::Before)).unwrap();
    assert_eq!(value["timing"], json!("before"));
    assert_eq!(value["event_type"], json!("build_vertex"));
  }
}

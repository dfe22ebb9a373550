//! Persistence backends the cache hooks talk to in remote mode.
//!
//! A backend offers per-table filtered select/insert/update/delete plus a
//! realtime change feed for a scope. Implementations:
//! - `RestBackend`: the hosted BaaS over its REST and event-stream endpoints
//! - `MemoryBackend`: in-process tables with fault injection
//! - `Unconfigured`: rejects everything (guest-only installs)

mod memory;
mod rest;
mod scope;
mod unconfigured;

pub use memory::{MemoryBackend, Operation};
pub use rest::RestBackend;
pub use scope::{ParentFilter, Scope};
pub use unconfigured::Unconfigured;

use color_eyre::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::identity::Identity;
use crate::model::Entity;

/// A row change pushed by the realtime feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
  Insert(T),
  Update(T),
  Delete { id: String },
}

impl<T> Change<T> {
  /// Convert a raw row change into a typed one.
  pub fn from_row(kind: ChangeKind, row: Value) -> serde_json::Result<Self>
  where
    T: Entity,
  {
    Ok(match kind {
      ChangeKind::Insert => Change::Insert(serde_json::from_value(row)?),
      ChangeKind::Update => Change::Update(serde_json::from_value(row)?),
      ChangeKind::Delete => Change::Delete {
        id: row
          .get("id")
          .and_then(Value::as_str)
          .map(String::from)
          .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("id"))?,
      },
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

/// Live change feed for one scope. Dropping it stops the feed.
pub struct Subscription<T> {
  rx: mpsc::UnboundedReceiver<Change<T>>,
  task: JoinHandle<()>,
}

impl<T> Subscription<T> {
  pub fn new(rx: mpsc::UnboundedReceiver<Change<T>>, task: JoinHandle<()>) -> Self {
    Self { rx, task }
  }

  /// Next change, or `None` once the feed has ended.
  pub async fn next(&mut self) -> Option<Change<T>> {
    self.rx.recv().await
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Trait for remote persistence backends.
pub trait Backend: Send + Sync + 'static {
  /// Rows of the scope, ordered by `created_at` in the type's list order.
  fn select<T: Entity>(&self, scope: &Scope) -> impl Future<Output = Result<Vec<T>>> + Send;

  /// Insert a row body and return the stored row with its assigned id and timestamps.
  fn insert<T: Entity>(&self, row: Value) -> impl Future<Output = Result<T>> + Send;

  /// Apply a patch to the row with `id`.
  fn update<T: Entity>(&self, id: &str, patch: &T::Patch)
    -> impl Future<Output = Result<()>> + Send;

  /// Delete the row with `id`.
  fn delete<T: Entity>(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

  /// Start a change feed for the scope.
  fn subscribe<T: Entity>(&self, scope: &Scope) -> Result<Subscription<T>>;

  /// Client for the same backend that acts as `identity` on every call.
  fn authenticate(self: &Arc<Self>, identity: &Identity) -> Result<Arc<Self>>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Note;
  use serde_json::json;

  #[test]
  fn test_delete_change_needs_only_id() {
    let change = Change::<Note>::from_row(ChangeKind::Delete, json!({ "id": "n-1" })).unwrap();
    assert_eq!(change, Change::Delete { id: "n-1".into() });

    assert!(Change::<Note>::from_row(ChangeKind::Delete, json!({})).is_err());
  }

  #[test]
  fn test_insert_change_parses_row() {
    let row = json!({
      "id": "n-1",
      "user_id": "u-1",
      "title": "t",
      "created_at": "2026-01-01T00:00:00Z",
      "updated_at": "2026-01-01T00:00:00Z",
    });
    match Change::<Note>::from_row(ChangeKind::Insert, row).unwrap() {
      Change::Insert(note) => {
        assert_eq!(note.id, "n-1");
        assert!(note.tags.is_empty());
      }
      other => panic!("unexpected change: {:?}", other),
    }
  }
}

//! Domain entities held by the caches.

mod habit;
mod note;
mod project;
mod task;
mod workspace;

pub use habit::{Frequency, Habit, HabitDraft, HabitLog, HabitLogDraft, HabitLogPatch, HabitPatch};
pub use note::{Note, NoteDraft, NotePatch};
pub use project::{Project, ProjectDraft, ProjectPatch, ProjectStatus};
pub use task::{Priority, Task, TaskDraft, TaskPatch, TaskStatus};
pub use workspace::{
  Collection, CollectionDraft, CollectionPatch, Workspace, WorkspaceDraft, WorkspacePatch,
};

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Columns the backend assigns on insert.
const SERVER_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Where newly created entities land in a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
  /// Newest first (lists ordered by `created_at desc`)
  Prepend,
  /// Oldest first (lists ordered by `created_at asc`)
  Append,
}

/// Trait for rows that a cache hook can hold.
///
/// Implementors describe the backend table they live in, how callers build a
/// new one (`Draft`) and how partial updates look (`Patch`).
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Domain fields supplied by the caller on create
  type Draft: Send;
  /// Sparse field changes, serialized as the update body
  type Patch: Clone + Send + Sync + Serialize;

  /// Backend table name (e.g., "tasks")
  fn table() -> &'static str;

  /// Singular name for user-facing messages (e.g., "task")
  fn label() -> &'static str;

  fn placement() -> Placement {
    Placement::Prepend
  }

  /// Column linking a row to its parent scope, if the type has one.
  fn parent_column() -> Option<&'static str> {
    None
  }

  fn id(&self) -> &str;

  fn owner(&self) -> &str;

  fn parent_id(&self) -> Option<&str> {
    None
  }

  fn created_at(&self) -> DateTime<Utc>;

  /// Build a pending entity from caller-supplied fields.
  fn from_draft(draft: Self::Draft, id: String, owner: &str, now: DateTime<Utc>) -> Self;

  /// Apply a patch in place and bump `updated_at`.
  fn apply_patch(&mut self, patch: &Self::Patch, now: DateTime<Utc>);

  /// Row body for an insert: the domain fields without server-assigned columns.
  fn insert_payload(&self) -> Result<Value> {
    let mut value = serde_json::to_value(self)
      .map_err(|e| eyre!("Failed to serialize {}: {}", Self::label(), e))?;
    if let Value::Object(map) = &mut value {
      for column in SERVER_COLUMNS {
        map.remove(*column);
      }
    }
    Ok(value)
  }

  /// Undo `patch`: the columns it sets take their value from `previous`,
  /// every other column keeps its current value.
  fn revert_patch(&mut self, previous: &Self, patch: &Self::Patch) -> Result<()> {
    let to_value = |value: Result<Value, serde_json::Error>| {
      value.map_err(|e| eyre!("Failed to serialize {}: {}", Self::label(), e))
    };
    let (Value::Object(touched), Value::Object(previous), Value::Object(mut current)) = (
      to_value(serde_json::to_value(patch))?,
      to_value(serde_json::to_value(previous))?,
      to_value(serde_json::to_value(&*self))?,
    ) else {
      return Err(eyre!("{} does not serialize to an object", Self::label()));
    };

    for column in touched.keys() {
      match previous.get(column) {
        Some(value) => current.insert(column.clone(), value.clone()),
        None => current.remove(column),
      };
    }
    *self = serde_json::from_value(Value::Object(current))
      .map_err(|e| eyre!("Failed to restore {}: {}", Self::label(), e))?;
    Ok(())
  }
}

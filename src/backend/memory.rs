//! In-process backend with the same filtering and ordering rules as the
//! hosted one. Supports fault injection and artificial latency.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use super::{Backend, Change, ChangeKind, Scope, Subscription};
use crate::identity::Identity;
use crate::model::{Entity, Placement};

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Select,
  Insert,
  Update,
  Delete,
  Subscribe,
}

#[derive(Debug, Clone)]
struct RowChange {
  table: &'static str,
  kind: ChangeKind,
  row: Value,
}

pub struct MemoryBackend {
  tables: Mutex<HashMap<&'static str, Vec<Value>>>,
  changes: broadcast::Sender<RowChange>,
  faults: Mutex<Vec<Operation>>,
  offline: AtomicBool,
  latency: Duration,
}

impl Default for MemoryBackend {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryBackend {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(256);
    Self {
      tables: Mutex::new(HashMap::new()),
      changes,
      faults: Mutex::new(Vec::new()),
      offline: AtomicBool::new(false),
      latency: Duration::ZERO,
    }
  }

  /// Delay every async call by `latency` before it touches any table.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Make the next call of `operation` fail.
  pub fn fail_next(&self, operation: Operation) {
    if let Ok(mut faults) = self.faults.lock() {
      faults.push(operation);
    }
  }

  /// Fail every call until switched back.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Rows of `T` currently stored, in insertion order, regardless of owner.
  pub fn rows<T: Entity>(&self) -> Vec<T> {
    match self.tables.lock() {
      Ok(tables) => tables
        .get(T::table())
        .map(|rows| {
          rows
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect()
        })
        .unwrap_or_default(),
      Err(_) => Vec::new(),
    }
  }

  fn check(&self, operation: Operation) -> Result<()> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Backend unreachable during {:?}", operation));
    }
    let mut faults = self
      .faults
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if let Some(index) = faults.iter().position(|f| *f == operation) {
      faults.remove(index);
      return Err(eyre!("Injected {:?} failure", operation));
    }
    Ok(())
  }

  async fn delay(&self) {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
  }

  fn publish(&self, table: &'static str, kind: ChangeKind, row: Value) {
    // No subscribers is fine
    let _ = self.changes.send(RowChange { table, kind, row });
  }

  fn select_rows<T: Entity>(&self, scope: &Scope) -> Result<Vec<T>> {
    self.check(Operation::Select)?;
    let tables = self
      .tables
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut rows: Vec<(usize, T)> = tables
      .get(T::table())
      .map(|rows| rows.as_slice())
      .unwrap_or_default()
      .iter()
      .filter(|row| scope.matches_row(row))
      .map(|row| serde_json::from_value(row.clone()))
      .collect::<serde_json::Result<Vec<T>>>()
      .map_err(|e| eyre!("Failed to parse {} row: {}", T::label(), e))?
      .into_iter()
      .enumerate()
      .collect();

    rows.sort_by(|(ia, a), (ib, b)| a.created_at().cmp(&b.created_at()).then(ia.cmp(ib)));
    if T::placement() == Placement::Prepend {
      rows.reverse();
    }

    Ok(rows.into_iter().map(|(_, row)| row).collect())
  }

  fn insert_row<T: Entity>(&self, row: Value) -> Result<T> {
    self.check(Operation::Insert)?;
    let Value::Object(mut fields) = row else {
      return Err(eyre!("Insert body for {} must be an object", T::table()));
    };

    let now = serde_json::to_value(Utc::now())
      .map_err(|e| eyre!("Failed to serialize timestamp: {}", e))?;
    fields.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    fields.insert("created_at".into(), now.clone());
    fields.insert("updated_at".into(), now);
    let row = Value::Object(fields);

    let stored: T = serde_json::from_value(row.clone())
      .map_err(|e| eyre!("Failed to parse inserted {}: {}", T::label(), e))?;

    self
      .tables
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .entry(T::table())
      .or_default()
      .push(row.clone());

    self.publish(T::table(), ChangeKind::Insert, row);
    Ok(stored)
  }

  fn update_row<T: Entity>(&self, id: &str, patch: &T::Patch) -> Result<()> {
    self.check(Operation::Update)?;
    let changes = match serde_json::to_value(patch)
      .map_err(|e| eyre!("Failed to serialize {} patch: {}", T::label(), e))?
    {
      Value::Object(changes) => changes,
      _ => Map::new(),
    };
    let now = serde_json::to_value(Utc::now())
      .map_err(|e| eyre!("Failed to serialize timestamp: {}", e))?;

    let updated = {
      let mut tables = self
        .tables
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      let row = tables
        .get_mut(T::table())
        .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
        .ok_or_else(|| eyre!("No {} with id {}", T::label(), id))?;

      if let Value::Object(fields) = row {
        for (column, value) in changes {
          fields.insert(column, value);
        }
        fields.insert("updated_at".into(), now);
      }
      row.clone()
    };

    self.publish(T::table(), ChangeKind::Update, updated);
    Ok(())
  }

  fn delete_row<T: Entity>(&self, id: &str) -> Result<()> {
    self.check(Operation::Delete)?;
    let removed = {
      let mut tables = self
        .tables
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      tables.get_mut(T::table()).and_then(|rows| {
        let index = rows.iter().position(|row| row_id(row) == Some(id))?;
        Some(rows.remove(index))
      })
    };

    // Deleting a missing row is not an error, matching the hosted API
    if let Some(row) = removed {
      self.publish(T::table(), ChangeKind::Delete, row);
    }
    Ok(())
  }
}

fn row_id(row: &Value) -> Option<&str> {
  row.get("id").and_then(Value::as_str)
}

impl Backend for MemoryBackend {
  async fn select<T: Entity>(&self, scope: &Scope) -> Result<Vec<T>> {
    self.delay().await;
    self.select_rows(scope)
  }

  async fn insert<T: Entity>(&self, row: Value) -> Result<T> {
    self.delay().await;
    self.insert_row(row)
  }

  async fn update<T: Entity>(&self, id: &str, patch: &T::Patch) -> Result<()> {
    self.delay().await;
    self.update_row::<T>(id, patch)
  }

  async fn delete<T: Entity>(&self, id: &str) -> Result<()> {
    self.delay().await;
    self.delete_row::<T>(id)
  }

  fn subscribe<T: Entity>(&self, scope: &Scope) -> Result<Subscription<T>> {
    self.check(Operation::Subscribe)?;
    let mut changes = self.changes.subscribe();
    let (tx, rx) = mpsc::unbounded_channel();
    let scope = scope.clone();

    let task = tokio::spawn(async move {
      loop {
        let change = match changes.recv().await {
          Ok(change) => change,
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!(skipped, "realtime subscriber lagged");
            continue;
          }
          Err(broadcast::error::RecvError::Closed) => break,
        };

        if change.table != scope.table {
          continue;
        }
        // Deletes carry the old row, so the scope check applies to them too.
        // Updates are forwarded even when the row left the scope so caches can drop it.
        if change.kind != ChangeKind::Update && !scope.matches_row(&change.row) {
          continue;
        }
        if change.kind == ChangeKind::Update
          && change.row.get("user_id").and_then(Value::as_str) != Some(scope.owner.as_str())
        {
          continue;
        }

        match Change::from_row(change.kind, change.row) {
          Ok(change) => {
            if tx.send(change).is_err() {
              break;
            }
          }
          Err(e) => debug!(error = %e, "skipping unparseable change"),
        }
      }
    });

    Ok(Subscription::new(rx, task))
  }

  /// Rows carry their owner, so every identity shares the same tables.
  fn authenticate(self: &Arc<Self>, _identity: &Identity) -> Result<Arc<Self>> {
    Ok(Arc::clone(self))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Habit, HabitDraft, Task, TaskDraft, TaskPatch, TaskStatus};

  fn task_row(owner: &str, title: &str) -> Value {
    Task::from_draft(TaskDraft::new(title), String::new(), owner, Utc::now())
      .insert_payload()
      .unwrap()
  }

  #[tokio::test]
  async fn test_insert_assigns_id_and_timestamps() {
    let backend = MemoryBackend::new();
    let task: Task = backend.insert(task_row("u-1", "a")).await.unwrap();

    assert!(!task.id.is_empty());
    assert!(!task.id.starts_with("temp-"));
    assert_eq!(task.user_id, "u-1");
    assert_eq!(backend.rows::<Task>().len(), 1);
  }

  #[tokio::test]
  async fn test_select_filters_owner_and_orders_newest_first() {
    let backend = MemoryBackend::new();
    let first: Task = backend.insert(task_row("u-1", "first")).await.unwrap();
    let _other: Task = backend.insert(task_row("u-2", "other")).await.unwrap();
    let second: Task = backend.insert(task_row("u-1", "second")).await.unwrap();

    let tasks: Vec<Task> = backend
      .select(&Scope::new::<Task>("u-1", None))
      .await
      .unwrap();
    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
  }

  #[tokio::test]
  async fn test_select_oldest_first_for_append_types() {
    let backend = MemoryBackend::new();
    let row = |name: &str| {
      Habit::from_draft(HabitDraft::new(name), String::new(), "u-1", Utc::now())
        .insert_payload()
        .unwrap()
    };
    let a: Habit = backend.insert(row("a")).await.unwrap();
    let b: Habit = backend.insert(row("b")).await.unwrap();

    let habits: Vec<Habit> = backend
      .select(&Scope::new::<Habit>("u-1", None))
      .await
      .unwrap();
    assert_eq!(habits, vec![a, b]);
  }

  #[tokio::test]
  async fn test_update_and_delete() {
    let backend = MemoryBackend::new();
    let task: Task = backend.insert(task_row("u-1", "a")).await.unwrap();

    backend
      .update::<Task>(&task.id, &TaskPatch::status(TaskStatus::Done))
      .await
      .unwrap();
    assert_eq!(backend.rows::<Task>()[0].status, TaskStatus::Done);

    assert!(backend
      .update::<Task>("missing", &TaskPatch::default())
      .await
      .is_err());

    backend.delete::<Task>(&task.id).await.unwrap();
    assert!(backend.rows::<Task>().is_empty());
    backend.delete::<Task>(&task.id).await.unwrap();
  }

  #[tokio::test]
  async fn test_fail_next_is_one_shot() {
    let backend = MemoryBackend::new();
    backend.fail_next(Operation::Insert);

    assert!(backend.insert::<Task>(task_row("u-1", "a")).await.is_err());
    assert!(backend.insert::<Task>(task_row("u-1", "a")).await.is_ok());
  }

  #[tokio::test]
  async fn test_offline_fails_everything() {
    let backend = MemoryBackend::new();
    backend.set_offline(true);

    assert!(backend
      .select::<Task>(&Scope::new::<Task>("u-1", None))
      .await
      .is_err());
    assert!(backend.subscribe::<Task>(&Scope::new::<Task>("u-1", None)).is_err());

    backend.set_offline(false);
    assert!(backend
      .select::<Task>(&Scope::new::<Task>("u-1", None))
      .await
      .is_ok());
  }

  #[tokio::test]
  async fn test_subscription_only_sees_its_scope() {
    let backend = MemoryBackend::new();
    let mut feed = backend
      .subscribe::<Task>(&Scope::new::<Task>("u-1", None))
      .unwrap();

    let _theirs: Task = backend.insert(task_row("u-2", "x")).await.unwrap();
    let mine: Task = backend.insert(task_row("u-1", "y")).await.unwrap();
    backend.delete::<Task>(&mine.id).await.unwrap();

    assert_eq!(feed.next().await, Some(Change::Insert(mine.clone())));
    assert_eq!(feed.next().await, Some(Change::Delete { id: mine.id }));
  }
}

//! In-memory list owned by a cache hook, with the reconciliation rules.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::backend::{Change, Scope};
use crate::model::{Entity, Placement};

/// Sync status of an entity in a remote-mode list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  /// Created locally, insert still in flight
  Pending,
  /// Confirmed by the backend (or stored locally in guest mode)
  Synced,
  /// Insert failed and the entity was kept locally
  Failed,
}

/// What to do with an optimistic entity whose insert failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
  /// Remove it again, restoring the list to its pre-create state
  #[default]
  Revert,
  /// Keep exactly one copy, marked `Failed`. Updates and deletes still revert.
  KeepPending,
}

/// Outcome of matching an insert response against the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
  /// The temporary entry now holds the confirmed entity
  Replaced,
  /// The entity was deleted locally while its insert was in flight
  Discarded,
}

pub struct ListState<T> {
  pub(crate) items: Vec<T>,
  unsynced: HashMap<String, SyncState>,
  discarded: HashSet<String>,
  pub(crate) loading: bool,
}

impl<T: Entity> ListState<T> {
  pub fn new() -> Self {
    Self {
      items: Vec::new(),
      unsynced: HashMap::new(),
      discarded: HashSet::new(),
      loading: true,
    }
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn position(&self, id: &str) -> Option<usize> {
    self.items.iter().position(|item| item.id() == id)
  }

  pub fn sync_state(&self, id: &str) -> SyncState {
    self
      .unsynced
      .get(id)
      .copied()
      .unwrap_or(SyncState::Synced)
  }

  pub fn mark(&mut self, id: &str, state: SyncState) {
    match state {
      SyncState::Synced => {
        self.unsynced.remove(id);
      }
      _ => {
        self.unsynced.insert(id.to_string(), state);
      }
    }
  }

  /// Add a new entity at the end its type's order dictates.
  pub fn place(&mut self, entity: T) {
    match T::placement() {
      Placement::Prepend => self.items.insert(0, entity),
      Placement::Append => self.items.push(entity),
    }
  }

  /// Replace by id in place, or place as new.
  pub fn upsert(&mut self, entity: T) {
    match self.position(entity.id()) {
      Some(index) => self.items[index] = entity,
      None => self.place(entity),
    }
  }

  pub fn remove(&mut self, id: &str) -> Option<(usize, T)> {
    let index = self.position(id)?;
    Some((index, self.items.remove(index)))
  }

  /// Put an entity back where it was removed from.
  pub fn restore(&mut self, index: usize, entity: T) {
    if self.position(entity.id()).is_some() {
      return;
    }
    let index = index.min(self.items.len());
    self.items.insert(index, entity);
  }

  /// Forget a pending entity whose insert is still in flight.
  pub fn discard(&mut self, id: &str) {
    self.unsynced.remove(id);
    self.discarded.insert(id.to_string());
  }

  /// Drop all bookkeeping for an id.
  pub fn forget(&mut self, id: &str) {
    self.unsynced.remove(id);
    self.discarded.remove(id);
  }

  /// Replace the list with a fresh backend read.
  ///
  /// Entities that are not yet synced are kept: a read issued before their
  /// insert landed cannot know about them.
  pub fn replace_all(&mut self, fresh: Vec<T>) {
    let unsynced: Vec<T> = self
      .items
      .drain(..)
      .filter(|item| self.unsynced.contains_key(item.id()))
      .collect();

    self.items = fresh;
    match T::placement() {
      Placement::Prepend => {
        self.items.splice(0..0, unsynced);
      }
      Placement::Append => self.items.extend(unsynced),
    }
  }

  /// Swap a temporary entity for the backend-confirmed one, keeping its slot.
  pub fn reconcile(&mut self, temp_id: &str, confirmed: T) -> Reconciled {
    self.unsynced.remove(temp_id);

    if self.discarded.remove(temp_id) {
      // A realtime insert may already have added it
      if let Some(index) = self.position(confirmed.id()) {
        self.items.remove(index);
      }
      return Reconciled::Discarded;
    }

    // The realtime feed may have delivered the confirmed row first
    if self.position(temp_id).is_some() {
      if let Some(index) = self.position(confirmed.id()) {
        self.items.remove(index);
      }
    }

    match self.position(temp_id) {
      Some(index) => self.items[index] = confirmed,
      None => self.upsert(confirmed),
    }
    Reconciled::Replaced
  }

  /// Apply one realtime change to the list.
  pub fn apply_change(&mut self, change: Change<T>, scope: &Scope) {
    match change {
      Change::Insert(entity) | Change::Update(entity) => {
        if scope.contains(&entity) {
          self.upsert(entity);
        } else {
          self.remove(entity.id());
        }
      }
      Change::Delete { id } => {
        self.remove(&id);
      }
    }
  }
}

impl<T: Entity> Default for ListState<T> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Habit, HabitDraft, Task, TaskDraft};
  use chrono::Utc;

  fn task(id: &str) -> Task {
    Task::from_draft(TaskDraft::new(id), id.to_string(), "u-1", Utc::now())
  }

  fn ids(state: &ListState<Task>) -> Vec<&str> {
    state.items().iter().map(|t| t.id.as_str()).collect()
  }

  #[test]
  fn test_place_follows_type_order() {
    let mut tasks = ListState::new();
    tasks.place(task("a"));
    tasks.place(task("b"));
    assert_eq!(ids(&tasks), vec!["b", "a"]);

    let mut habits = ListState::new();
    for name in ["a", "b"] {
      habits.place(Habit::from_draft(HabitDraft::new(name), name.into(), "u-1", Utc::now()));
    }
    let names: Vec<&str> = habits.items().iter().map(|h| h.id.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
  }

  #[test]
  fn test_reconcile_keeps_position() {
    let mut state = ListState::new();
    state.place(task("a"));
    state.place(task("temp-1"));
    state.place(task("c"));
    state.mark("temp-1", SyncState::Pending);

    let outcome = state.reconcile("temp-1", task("server-1"));

    assert_eq!(outcome, Reconciled::Replaced);
    assert_eq!(ids(&state), vec!["c", "server-1", "a"]);
    assert_eq!(state.sync_state("server-1"), SyncState::Synced);
    assert_eq!(state.sync_state("temp-1"), SyncState::Synced);
  }

  #[test]
  fn test_reconcile_after_realtime_insert_does_not_duplicate() {
    let scope = Scope::new::<Task>("u-1", None);
    let mut state = ListState::new();
    state.place(task("a"));
    state.place(task("temp-1"));
    state.mark("temp-1", SyncState::Pending);

    state.apply_change(Change::Insert(task("server-1")), &scope);
    assert_eq!(state.items().len(), 3);

    state.reconcile("temp-1", task("server-1"));
    assert_eq!(ids(&state), vec!["server-1", "a"]);
  }

  #[test]
  fn test_reconcile_discarded_drops_entity() {
    let scope = Scope::new::<Task>("u-1", None);
    let mut state = ListState::new();
    state.place(task("temp-1"));
    state.mark("temp-1", SyncState::Pending);
    state.remove("temp-1");
    state.discard("temp-1");
    state.apply_change(Change::Insert(task("server-1")), &scope);

    assert_eq!(state.reconcile("temp-1", task("server-1")), Reconciled::Discarded);
    assert!(state.items().is_empty());
  }

  #[test]
  fn test_replace_all_keeps_unsynced() {
    let mut state = ListState::new();
    state.place(task("old"));
    state.place(task("temp-1"));
    state.mark("temp-1", SyncState::Pending);

    state.replace_all(vec![task("x"), task("y")]);
    assert_eq!(ids(&state), vec!["temp-1", "x", "y"]);
  }

  #[test]
  fn test_apply_change_upserts_and_removes() {
    let scope = Scope::new::<Task>("u-1", Some("p-1"));
    let in_project = |id: &str| {
      Task::from_draft(TaskDraft::new(id).in_project("p-1"), id.into(), "u-1", Utc::now())
    };
    let mut state = ListState::new();
    state.place(in_project("a"));

    let mut renamed = in_project("a");
    renamed.title = "renamed".into();
    state.apply_change(Change::Update(renamed), &scope);
    assert_eq!(state.items()[0].title, "renamed");

    let mut moved = in_project("a");
    moved.project_id = Some("p-2".into());
    state.apply_change(Change::Update(moved), &scope);
    assert!(state.items().is_empty());

    state.apply_change(Change::Insert(in_project("b")), &scope);
    state.apply_change(Change::Delete { id: "b".into() }, &scope);
    assert!(state.items().is_empty());
  }

  #[test]
  fn test_restore_clamps_index() {
    let mut state = ListState::new();
    state.place(task("a"));
    let (index, removed) = state.remove("a").unwrap();
    state.restore(index + 5, removed);
    assert_eq!(ids(&state), vec!["a"]);
  }
}

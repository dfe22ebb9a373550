//! Cache hook that orchestrates optimistic mutations with persistence.

use chrono::Utc;
use color_eyre::{eyre::eyre, Report, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::state::{FailurePolicy, ListState, Reconciled, SyncState};
use crate::backend::{Backend, Scope};
use crate::event::{CacheEvent, EventSender, Notification};
use crate::identity::{Identity, StorageMode};
use crate::model::Entity;
use crate::store::{self, LocalStore};

/// Whether `row` still holds exactly what an earlier write left in it.
fn unchanged_since<T: Entity>(row: &T, written: &T) -> bool {
  matches!(
    (serde_json::to_value(row), serde_json::to_value(written)),
    (Ok(a), Ok(b)) if a == b
  )
}

/// Everything a hook needs besides its entity type and scope.
pub struct HookContext<B, S> {
  pub identity: Identity,
  pub backend: Arc<B>,
  pub store: Arc<S>,
  pub events: EventSender,
  pub policy: FailurePolicy,
}

impl<B, S> Clone for HookContext<B, S> {
  fn clone(&self) -> Self {
    Self {
      identity: self.identity.clone(),
      backend: Arc::clone(&self.backend),
      store: Arc::clone(&self.store),
      events: self.events.clone(),
      policy: self.policy,
    }
  }
}

/// Optimistic list of `T` for one identity and scope.
///
/// Clones share the same list, so every consumer sees the same optimistic
/// state. The storage mode is fixed at construction from the identity.
pub struct CacheHook<T, B, S> {
  inner: Arc<Inner<T, B, S>>,
}

struct Inner<T, B, S> {
  context: HookContext<B, S>,
  mode: StorageMode,
  scope: Scope,
  state: Arc<Mutex<ListState<T>>>,
  realtime: Mutex<Option<JoinHandle<()>>>,
}

impl<T, B, S> Drop for Inner<T, B, S> {
  fn drop(&mut self) {
    if let Some(task) = self.realtime.get_mut().ok().and_then(Option::take) {
      task.abort();
    }
  }
}

impl<T, B, S> Clone for CacheHook<T, B, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

fn lock<T>(state: &Mutex<ListState<T>>) -> MutexGuard<'_, ListState<T>> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn temp_id() -> String {
  format!("temp-{}", Uuid::new_v4())
}

impl<T: Entity, B: Backend, S: LocalStore> CacheHook<T, B, S> {
  /// Hook over every `T` row of the context's identity.
  pub fn new(context: &HookContext<B, S>) -> Self {
    Self::scoped(context, None)
  }

  /// Hook narrowed to the children of one parent row.
  pub fn scoped(context: &HookContext<B, S>, parent: Option<&str>) -> Self {
    let scope = Scope::new::<T>(context.identity.owner(), parent);
    Self {
      inner: Arc::new(Inner {
        context: context.clone(),
        mode: context.identity.storage_mode(),
        scope,
        state: Arc::new(Mutex::new(ListState::new())),
        realtime: Mutex::new(None),
      }),
    }
  }

  fn state(&self) -> MutexGuard<'_, ListState<T>> {
    lock(&self.inner.state)
  }

  pub fn items(&self) -> Vec<T> {
    self.state().items().to_vec()
  }

  pub fn get(&self, id: &str) -> Option<T> {
    self
      .state()
      .items()
      .iter()
      .find(|item| item.id() == id)
      .cloned()
  }

  pub fn len(&self) -> usize {
    self.state().items().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_loading(&self) -> bool {
    self.state().loading
  }

  pub fn sync_state(&self, id: &str) -> SyncState {
    self.state().sync_state(id)
  }

  pub fn mode(&self) -> StorageMode {
    self.inner.mode
  }

  pub fn scope(&self) -> &Scope {
    &self.inner.scope
  }

  pub fn identity(&self) -> &Identity {
    &self.inner.context.identity
  }

  fn changed(&self) {
    let _ = self
      .inner
      .context
      .events
      .send(CacheEvent::Changed { table: T::table() });
  }

  fn report(&self, action: &str, e: &Report) {
    let message = format!("Failed to {} {}", action, T::label());
    error!(table = T::table(), error = %e, "{}", message);
    let _ = self
      .inner
      .context
      .events
      .send(CacheEvent::Notice(Notification::error(message)));
  }

  fn persist_local(&self, state: &ListState<T>) -> Result<()> {
    store::save_list(
      &*self.inner.context.store,
      &self.inner.scope.local_key(),
      state.items(),
    )
  }

  /// Load the list for the current identity.
  ///
  /// A failed backend read leaves the current list untouched.
  pub async fn refresh(&self) {
    self.state().loading = true;

    match self.inner.mode {
      StorageMode::Local => {
        let items =
          store::load_list::<T>(&*self.inner.context.store, &self.inner.scope.local_key());
        self.state().items = items;
      }
      StorageMode::Remote => {
        let result = self
          .inner
          .context
          .backend
          .select::<T>(&self.inner.scope)
          .await;
        match result {
          Ok(rows) => self.state().replace_all(rows),
          Err(e) => warn!(
            scope = %self.inner.scope.description(),
            error = %e,
            "refresh failed, keeping current list"
          ),
        }
      }
    }

    self.state().loading = false;
    self.changed();
  }

  /// Add a new entity, optimistically.
  ///
  /// Returns the stored entity: the backend-confirmed one when signed in, the
  /// local one for guests.
  pub async fn create(&self, draft: T::Draft) -> Result<T> {
    let temp_id = temp_id();
    let pending = T::from_draft(draft, temp_id.clone(), &self.inner.scope.owner, Utc::now());
    if !self.inner.scope.contains(&pending) {
      return Err(eyre!(
        "New {} does not belong to {}",
        T::label(),
        self.inner.scope.description()
      ));
    }

    if self.inner.mode == StorageMode::Local {
      {
        let mut state = self.state();
        state.place(pending.clone());
        if let Err(e) = self.persist_local(&state) {
          state.remove(&temp_id);
          drop(state);
          self.report("create", &e);
          return Err(e);
        }
      }
      self.changed();
      return Ok(pending);
    }

    let row = pending.insert_payload()?;
    {
      let mut state = self.state();
      state.place(pending);
      state.mark(&temp_id, SyncState::Pending);
    }
    self.changed();

    let result = self.inner.context.backend.insert::<T>(row).await;
    match result {
      Ok(confirmed) => {
        let outcome = self.state().reconcile(&temp_id, confirmed.clone());
        if outcome == Reconciled::Discarded {
          debug!(id = confirmed.id(), "{} deleted before its insert landed", T::label());
          if let Err(e) = self.inner.context.backend.delete::<T>(confirmed.id()).await {
            warn!(id = confirmed.id(), error = %e, "failed to remove discarded {}", T::label());
          }
        }
        self.changed();
        Ok(confirmed)
      }
      Err(e) => {
        {
          let mut state = self.state();
          let still_listed = state.position(&temp_id).is_some();
          match self.inner.context.policy {
            FailurePolicy::KeepPending if still_listed => state.mark(&temp_id, SyncState::Failed),
            _ => {
              state.remove(&temp_id);
              state.forget(&temp_id);
            }
          }
        }
        self.report("create", &e);
        self.changed();
        Err(e)
      }
    }
  }

  /// Patch an entity in place, reverting if persistence fails.
  pub async fn update(&self, id: &str, patch: T::Patch) -> Result<T> {
    let remote = self.inner.mode == StorageMode::Remote;

    let (previous, updated) = {
      let mut state = self.state();
      let index = state
        .position(id)
        .ok_or_else(|| eyre!("No {} with id {}", T::label(), id))?;
      if remote && state.sync_state(id) != SyncState::Synced {
        return Err(eyre!("{} {} is not saved yet", T::label(), id));
      }

      let previous = state.items[index].clone();
      state.items[index].apply_patch(&patch, Utc::now());
      let updated = state.items[index].clone();

      if !remote {
        if let Err(e) = self.persist_local(&state) {
          state.items[index] = previous;
          drop(state);
          self.report("update", &e);
          return Err(e);
        }
      }
      (previous, updated)
    };
    self.changed();

    if remote {
      if let Err(e) = self.inner.context.backend.update::<T>(id, &patch).await {
        {
          let mut state = self.state();
          if let Some(index) = state.position(id) {
            let current = &mut state.items[index];
            if unchanged_since(current, &updated) {
              *current = previous;
            } else if let Err(revert) = current.revert_patch(&previous, &patch) {
              warn!(table = T::table(), id, error = %revert, "restoring whole row");
              *current = previous;
            }
          }
        }
        self.report("update", &e);
        self.changed();
        return Err(e);
      }
    }

    Ok(updated)
  }

  /// Remove an entity, restoring it if persistence fails.
  pub async fn delete(&self, id: &str) -> Result<()> {
    let (index, removed, remote) = {
      let mut state = self.state();
      let (index, removed) = state
        .remove(id)
        .ok_or_else(|| eyre!("No {} with id {}", T::label(), id))?;

      let remote = match self.inner.mode {
        StorageMode::Local => {
          if let Err(e) = self.persist_local(&state) {
            state.restore(index, removed);
            drop(state);
            self.report("delete", &e);
            return Err(e);
          }
          false
        }
        StorageMode::Remote => match state.sync_state(id) {
          SyncState::Synced => true,
          SyncState::Pending => {
            state.discard(id);
            false
          }
          SyncState::Failed => {
            state.forget(id);
            false
          }
        },
      };
      (index, removed, remote)
    };
    self.changed();

    if remote {
      if let Err(e) = self.inner.context.backend.delete::<T>(id).await {
        self.state().restore(index, removed);
        self.report("delete", &e);
        self.changed();
        return Err(e);
      }
    }

    Ok(())
  }

  /// Follow the realtime feed for this hook's scope. No-op for guests.
  pub fn watch(&self) -> Result<()> {
    if self.inner.mode == StorageMode::Local {
      return Ok(());
    }

    let mut subscription = self
      .inner
      .context
      .backend
      .subscribe::<T>(&self.inner.scope)?;
    let state = Arc::clone(&self.inner.state);
    let events = self.inner.context.events.clone();
    let scope = self.inner.scope.clone();

    let task = tokio::spawn(async move {
      while let Some(change) = subscription.next().await {
        lock(&state).apply_change(change, &scope);
        let _ = events.send(CacheEvent::Changed { table: T::table() });
      }
      debug!(scope = %scope.description(), "realtime feed ended");
    });

    let mut realtime = self
      .inner
      .realtime
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = realtime.replace(task) {
      previous.abort();
    }
    Ok(())
  }

  /// Stop following the realtime feed.
  pub fn unwatch(&self) {
    let task = self
      .inner
      .realtime
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(task) = task {
      task.abort();
    }
  }

  pub fn is_watching(&self) -> bool {
    self
      .inner
      .realtime
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|task| !task.is_finished())
  }
}

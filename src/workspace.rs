//! Active workspace selection and the collections scoped to it.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::{CacheHook, HookContext};
use crate::model::{Collection, Workspace};
use crate::store::LocalStore;

/// Shown when the user has no workspaces yet.
const PLACEHOLDERS: &[(&str, &str, &str)] = &[
  ("mock-workspace-personal", "Personal", "home"),
  ("mock-workspace-work", "Work", "briefcase"),
  ("mock-workspace-learning", "Learning", "book"),
];

fn placeholder_workspaces(owner: &str) -> Vec<Workspace> {
  PLACEHOLDERS
    .iter()
    .map(|(id, name, icon)| Workspace {
      id: id.to_string(),
      user_id: owner.to_string(),
      name: name.to_string(),
      icon: Some(icon.to_string()),
      created_at: DateTime::<Utc>::UNIX_EPOCH,
      updated_at: DateTime::<Utc>::UNIX_EPOCH,
    })
    .collect()
}

pub struct WorkspaceScope<B, S> {
  context: HookContext<B, S>,
  workspaces: CacheHook<Workspace, B, S>,
  active: Option<String>,
  collections: Option<CacheHook<Collection, B, S>>,
}

impl<B: Backend, S: LocalStore> WorkspaceScope<B, S> {
  pub fn new(context: &HookContext<B, S>) -> Self {
    Self {
      context: context.clone(),
      workspaces: CacheHook::new(context),
      active: None,
      collections: None,
    }
  }

  pub fn workspaces(&self) -> &CacheHook<Workspace, B, S> {
    &self.workspaces
  }

  /// Collections of the active workspace, once one is active.
  pub fn collections(&self) -> Option<&CacheHook<Collection, B, S>> {
    self.collections.as_ref()
  }

  /// Stored workspaces, or the placeholder set when there are none.
  pub fn available(&self) -> Vec<Workspace> {
    let workspaces = self.workspaces.items();
    if workspaces.is_empty() {
      placeholder_workspaces(self.context.identity.owner())
    } else {
      workspaces
    }
  }

  pub fn active_id(&self) -> Option<&str> {
    self.active.as_deref()
  }

  pub fn active(&self) -> Option<Workspace> {
    let id = self.active.as_deref()?;
    self.available().into_iter().find(|w| w.id == id)
  }

  /// Reload workspaces and keep the active one if it still exists.
  pub async fn refresh(&mut self) {
    self.workspaces.refresh().await;

    let available = self.available();
    let next = self
      .active
      .as_deref()
      .filter(|id| available.iter().any(|w| w.id == *id))
      .or_else(|| available.first().map(|w| w.id.as_str()))
      .map(String::from);

    if next != self.active || self.collections.is_none() {
      self.active = next;
      self.rescope().await;
    }
  }

  /// Make another available workspace active.
  pub async fn select(&mut self, id: &str) -> Result<()> {
    if self.active.as_deref() == Some(id) {
      return Ok(());
    }
    if !self.available().iter().any(|w| w.id == id) {
      return Err(eyre!("No workspace with id {}", id));
    }

    self.active = Some(id.to_string());
    self.rescope().await;
    Ok(())
  }

  pub async fn refresh_collections(&self) {
    if let Some(collections) = &self.collections {
      collections.refresh().await;
    }
  }

  pub fn watch(&self) -> Result<()> {
    self.workspaces.watch()?;
    if let Some(collections) = &self.collections {
      collections.watch()?;
    }
    Ok(())
  }

  pub fn unwatch(&self) {
    self.workspaces.unwatch();
    if let Some(collections) = &self.collections {
      collections.unwatch();
    }
  }

  async fn rescope(&mut self) {
    let previous = match self.active.as_deref() {
      Some(active) => {
        let collections: CacheHook<Collection, B, S> =
          CacheHook::scoped(&self.context, Some(active));
        collections.refresh().await;
        if self.workspaces.is_watching() {
          if let Err(e) = collections.watch() {
            warn!(workspace = active, error = %e, "collections realtime unavailable");
          }
        }
        debug!(workspace = active, count = collections.len(), "collections re-scoped");
        self.collections.replace(collections)
      }
      None => self.collections.take(),
    };

    if let Some(previous) = previous {
      previous.unwatch();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::MemoryBackend;
  use crate::cache::FailurePolicy;
  use crate::event::EventHandler;
  use crate::identity::Identity;
  use crate::model::{CollectionDraft, WorkspaceDraft};
  use crate::store::MemoryStore;
  use std::sync::Arc;

  fn context(identity: Identity, events: &EventHandler) -> HookContext<MemoryBackend, MemoryStore> {
    HookContext {
      identity,
      backend: Arc::new(MemoryBackend::new()),
      store: Arc::new(MemoryStore::new()),
      events: events.sender(),
      policy: FailurePolicy::Revert,
    }
  }

  fn draft(name: &str) -> WorkspaceDraft {
    WorkspaceDraft {
      name: name.to_string(),
      icon: None,
    }
  }

  #[tokio::test]
  async fn test_guest_without_workspaces_sees_placeholders() {
    let events = EventHandler::new();
    let mut scope = WorkspaceScope::new(&context(Identity::Guest, &events));
    scope.refresh().await;

    let names: Vec<String> = scope.available().into_iter().map(|w| w.name).collect();
    assert_eq!(names, vec!["Personal", "Work", "Learning"]);
    assert_eq!(scope.active_id(), Some("mock-workspace-personal"));
    assert_eq!(scope.active().map(|w| w.name), Some("Personal".to_string()));
    assert!(scope.collections().is_some_and(|c| c.is_empty()));
  }

  #[tokio::test]
  async fn test_active_workspace_is_sticky() {
    let events = EventHandler::new();
    let ctx = context(Identity::user("u-1", "t"), &events);
    let mut scope = WorkspaceScope::new(&ctx);
    let home = scope.workspaces().create(draft("Home")).await.unwrap();
    let office = scope.workspaces().create(draft("Office")).await.unwrap();

    scope.refresh().await;
    assert_eq!(scope.active_id(), Some(home.id.as_str()));

    scope.select(&office.id).await.unwrap();
    scope.workspaces().create(draft("Garden")).await.unwrap();
    scope.refresh().await;
    assert_eq!(scope.active_id(), Some(office.id.as_str()));

    scope.workspaces().delete(&office.id).await.unwrap();
    scope.refresh().await;
    assert_eq!(scope.active_id(), Some(home.id.as_str()));
  }

  #[tokio::test]
  async fn test_select_rescopes_collections() {
    let events = EventHandler::new();
    let ctx = context(Identity::Guest, &events);
    let mut scope = WorkspaceScope::new(&ctx);
    scope.refresh().await;

    let work: CacheHook<Collection, _, _> = CacheHook::scoped(&ctx, Some("mock-workspace-work"));
    work.refresh().await;
    work
      .create(CollectionDraft {
        workspace_id: "mock-workspace-work".into(),
        name: "Reading list".into(),
        icon: None,
      })
      .await
      .unwrap();

    assert!(scope.collections().is_some_and(|c| c.is_empty()));

    scope.select("mock-workspace-work").await.unwrap();
    let names: Vec<String> = scope
      .collections()
      .map(|c| c.items().into_iter().map(|c| c.name).collect())
      .unwrap_or_default();
    assert_eq!(names, vec!["Reading list"]);
  }

  #[tokio::test]
  async fn test_select_unknown_workspace_fails() {
    let events = EventHandler::new();
    let mut scope = WorkspaceScope::new(&context(Identity::Guest, &events));
    scope.refresh().await;

    assert!(scope.select("nope").await.is_err());
    assert_eq!(scope.active_id(), Some("mock-workspace-personal"));
  }
}

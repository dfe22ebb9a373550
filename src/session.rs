//! Per-identity bundle of every cache the dashboard shows.

use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::cache::{CacheHook, HookContext};
use crate::habits::HabitTracker;
use crate::identity::Identity;
use crate::model::{Entity, Habit, HabitLog, Note, Project, Task};
use crate::store::LocalStore;
use crate::workspace::WorkspaceScope;

fn watch_or_warn<T: Entity, B: Backend, S: LocalStore>(hook: &CacheHook<T, B, S>) {
  if let Err(e) = hook.watch() {
    warn!(table = T::table(), error = %e, "realtime unavailable");
  }
}

/// All caches for one identity.
///
/// Rebuilt from scratch whenever the identity changes, so no list ever mixes
/// rows from two identities.
pub struct Session<B, S> {
  context: HookContext<B, S>,
  tasks: CacheHook<Task, B, S>,
  habits: CacheHook<Habit, B, S>,
  habit_logs: CacheHook<HabitLog, B, S>,
  projects: CacheHook<Project, B, S>,
  notes: CacheHook<Note, B, S>,
  workspaces: WorkspaceScope<B, S>,
  tracker: HabitTracker<B, S>,
}

impl<B: Backend, S: LocalStore> Session<B, S> {
  fn build(context: HookContext<B, S>) -> Self {
    let habits = CacheHook::new(&context);
    let habit_logs = CacheHook::new(&context);
    Self {
      tasks: CacheHook::new(&context),
      tracker: HabitTracker::new(CacheHook::clone(&habits), CacheHook::clone(&habit_logs)),
      habits,
      habit_logs,
      projects: CacheHook::new(&context),
      notes: CacheHook::new(&context),
      workspaces: WorkspaceScope::new(&context),
      context,
    }
  }

  /// Build every cache for the context's identity, load it and follow the
  /// realtime feeds.
  pub async fn start(context: HookContext<B, S>) -> Self {
    let mut session = Self::build(context);
    session.load().await;
    session
  }

  /// Like `start`, without realtime. For one-shot reads and writes.
  pub async fn open(context: HookContext<B, S>) -> Self {
    let mut session = Self::build(context);
    session.refresh().await;
    session
  }

  async fn load(&mut self) {
    self.refresh().await;

    watch_or_warn(&self.tasks);
    watch_or_warn(&self.habits);
    watch_or_warn(&self.habit_logs);
    watch_or_warn(&self.projects);
    watch_or_warn(&self.notes);
    if let Err(e) = self.workspaces.watch() {
      warn!(error = %e, "workspace realtime unavailable");
    }
  }

  fn unwatch(&self) {
    self.tasks.unwatch();
    self.habits.unwatch();
    self.habit_logs.unwatch();
    self.projects.unwatch();
    self.notes.unwatch();
    self.workspaces.unwatch();
  }

  pub fn identity(&self) -> &Identity {
    &self.context.identity
  }

  pub fn tasks(&self) -> &CacheHook<Task, B, S> {
    &self.tasks
  }

  pub fn habits(&self) -> &CacheHook<Habit, B, S> {
    &self.habits
  }

  pub fn habit_logs(&self) -> &CacheHook<HabitLog, B, S> {
    &self.habit_logs
  }

  pub fn projects(&self) -> &CacheHook<Project, B, S> {
    &self.projects
  }

  pub fn notes(&self) -> &CacheHook<Note, B, S> {
    &self.notes
  }

  pub fn workspaces(&self) -> &WorkspaceScope<B, S> {
    &self.workspaces
  }

  pub fn workspaces_mut(&mut self) -> &mut WorkspaceScope<B, S> {
    &mut self.workspaces
  }

  pub fn habit_tracker(&self) -> HabitTracker<B, S> {
    self.tracker.clone()
  }

  /// Re-read every list for the current identity.
  pub async fn refresh(&mut self) {
    tokio::join!(
      self.tasks.refresh(),
      self.habits.refresh(),
      self.habit_logs.refresh(),
      self.projects.refresh(),
      self.notes.refresh(),
    );
    self.workspaces.refresh().await;
  }

  /// Drop every list and load fresh ones for `identity`, with a backend
  /// client acting as that identity.
  ///
  /// Returns whether anything changed. When no client can be built for the
  /// new identity the session is left as it was.
  pub async fn switch_identity(&mut self, identity: Identity) -> Result<bool> {
    if identity == self.context.identity {
      return Ok(false);
    }

    let backend = self
      .context
      .backend
      .authenticate(&identity)
      .map_err(|e| eyre!("Failed to connect as {:?}: {}", identity, e))?;

    self.unwatch();
    info!(from = ?self.context.identity, to = ?identity, "switching identity");

    let context = HookContext {
      identity,
      backend,
      ..self.context.clone()
    };
    *self = Self::build(context);
    self.load().await;
    Ok(true)
  }

  /// Wait for the next auth change and switch to it.
  ///
  /// Returns `false` once the auth source is gone.
  pub async fn follow(&mut self, auth: &mut watch::Receiver<Identity>) -> Result<bool> {
    if auth.changed().await.is_err() {
      return Ok(false);
    }
    let identity = auth.borrow_and_update().clone();
    self.switch_identity(identity).await?;
    Ok(true)
  }

  /// Check that the backend answers for this identity. Always passes for guests.
  pub async fn ping(&self) -> Result<()> {
    if self.context.identity.is_guest() {
      return Ok(());
    }
    self
      .context
      .backend
      .select::<Project>(self.projects.scope())
      .await
      .map(|_| ())
  }
}

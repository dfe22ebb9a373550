use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;

use super::{Backend, Scope, Subscription};
use crate::identity::Identity;
use crate::model::Entity;

/// Backend used when no backend settings exist.
/// Guest sessions never call it; every call fails.
pub struct Unconfigured;

impl Backend for Unconfigured {
  async fn select<T: Entity>(&self, _scope: &Scope) -> Result<Vec<T>> {
    Err(eyre!("No backend configured"))
  }

  async fn insert<T: Entity>(&self, _row: Value) -> Result<T> {
    Err(eyre!("No backend configured"))
  }

  async fn update<T: Entity>(&self, _id: &str, _patch: &T::Patch) -> Result<()> {
    Err(eyre!("No backend configured"))
  }

  async fn delete<T: Entity>(&self, _id: &str) -> Result<()> {
    Err(eyre!("No backend configured"))
  }

  fn subscribe<T: Entity>(&self, _scope: &Scope) -> Result<Subscription<T>> {
    Err(eyre!("No backend configured"))
  }

  fn authenticate(self: &Arc<Self>, _identity: &Identity) -> Result<Arc<Self>> {
    Ok(Arc::clone(self))
  }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Placement};

/// Top-level container the collections view is scoped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
  pub id: String,
  pub user_id: String,
  pub name: String,
  #[serde(default)]
  pub icon: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceDraft {
  pub name: String,
  pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspacePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

impl Entity for Workspace {
  type Draft = WorkspaceDraft;
  type Patch = WorkspacePatch;

  fn table() -> &'static str {
    "workspaces"
  }

  fn label() -> &'static str {
    "workspace"
  }

  fn placement() -> Placement {
    Placement::Append
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn owner(&self) -> &str {
    &self.user_id
  }

  fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  fn from_draft(draft: WorkspaceDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      name: draft.name,
      icon: draft.icon,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &WorkspacePatch, now: DateTime<Utc>) {
    if let Some(name) = &patch.name {
      self.name = name.clone();
    }
    if let Some(icon) = &patch.icon {
      self.icon = Some(icon.clone());
    }
    self.updated_at = now;
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
  pub id: String,
  pub user_id: String,
  pub workspace_id: String,
  pub name: String,
  #[serde(default)]
  pub icon: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionDraft {
  pub workspace_id: String,
  pub name: String,
  pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

impl Entity for Collection {
  type Draft = CollectionDraft;
  type Patch = CollectionPatch;

  fn table() -> &'static str {
    "collections"
  }

  fn label() -> &'static str {
    "collection"
  }

  fn placement() -> Placement {
    Placement::Append
  }

  fn parent_column() -> Option<&'static str> {
    Some("workspace_id")
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn owner(&self) -> &str {
    &self.user_id
  }

  fn parent_id(&self) -> Option<&str> {
    Some(self.workspace_id.as_str())
  }

  fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  fn from_draft(draft: CollectionDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      workspace_id: draft.workspace_id,
      name: draft.name,
      icon: draft.icon,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &CollectionPatch, now: DateTime<Utc>) {
    if let Some(name) = &patch.name {
      self.name = name.clone();
    }
    if let Some(icon) = &patch.icon {
      self.icon = Some(icon.clone());
    }
    self.updated_at = now;
  }
}

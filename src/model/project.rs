use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
  #[default]
  Active,
  OnHold,
  Completed,
  Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub user_id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub color: Option<String>,
  #[serde(default)]
  pub status: ProjectStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectDraft {
  pub name: String,
  pub description: Option<String>,
  pub color: Option<String>,
  pub status: Option<ProjectStatus>,
}

impl ProjectDraft {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ProjectStatus>,
}

impl Entity for Project {
  type Draft = ProjectDraft;
  type Patch = ProjectPatch;

  fn table() -> &'static str {
    "projects"
  }

  fn label() -> &'static str {
    "project"
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

  fn from_draft(draft: ProjectDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      name: draft.name,
      description: draft.description,
      color: draft.color,
      status: draft.status.unwrap_or_default(),
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &ProjectPatch, now: DateTime<Utc>) {
    if let Some(name) = &patch.name {
      self.name = name.clone();
    }
    if let Some(description) = &patch.description {
      self.description = Some(description.clone());
    }
    if let Some(color) = &patch.color {
      self.color = Some(color.clone());
    }
    if let Some(status) = patch.status {
      self.status = status;
    }
    self.updated_at = now;
  }
}

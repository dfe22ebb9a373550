use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
  pub id: String,
  pub user_id: String,
  pub title: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub pinned: bool,
  #[serde(default)]
  pub tags: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
  pub title: String,
  pub content: String,
  pub pinned: bool,
  pub tags: Vec<String>,
}

impl NoteDraft {
  pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      content: content.into(),
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NotePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pinned: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
}

impl Entity for Note {
  type Draft = NoteDraft;
  type Patch = NotePatch;

  fn table() -> &'static str {
    "notes"
  }

  fn label() -> &'static str {
    "note"
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

  fn from_draft(draft: NoteDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      title: draft.title,
      content: draft.content,
      pinned: draft.pinned,
      tags: draft.tags,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &NotePatch, now: DateTime<Utc>) {
    if let Some(title) = &patch.title {
      self.title = title.clone();
    }
    if let Some(content) = &patch.content {
      self.content = content.clone();
    }
    if let Some(pinned) = patch.pinned {
      self.pinned = pinned;
    }
    if let Some(tags) = &patch.tags {
      self.tags = tags.clone();
    }
    self.updated_at = now;
  }
}

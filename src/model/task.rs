use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Placement};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Todo,
  InProgress,
  Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

/// A task on the board, optionally filed under a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  pub user_id: String,
  #[serde(default)]
  pub project_id: Option<String>,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub status: TaskStatus,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default)]
  pub due_date: Option<NaiveDate>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
  pub title: String,
  pub description: Option<String>,
  pub project_id: Option<String>,
  pub status: Option<TaskStatus>,
  pub priority: Option<Priority>,
  pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      ..Default::default()
    }
  }

  pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
    self.project_id = Some(project_id.into());
    self
  }

  pub fn with_priority(mut self, priority: Priority) -> Self {
    self.priority = Some(priority);
    self
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<TaskStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
  pub fn status(status: TaskStatus) -> Self {
    Self {
      status: Some(status),
      ..Default::default()
    }
  }
}

impl Entity for Task {
  type Draft = TaskDraft;
  type Patch = TaskPatch;

  fn table() -> &'static str {
    "tasks"
  }

  fn label() -> &'static str {
    "task"
  }

  fn placement() -> Placement {
    Placement::Prepend
  }

  fn parent_column() -> Option<&'static str> {
    Some("project_id")
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn owner(&self) -> &str {
    &self.user_id
  }

  fn parent_id(&self) -> Option<&str> {
    self.project_id.as_deref()
  }

  fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  fn from_draft(draft: TaskDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      project_id: draft.project_id,
      title: draft.title,
      description: draft.description,
      status: draft.status.unwrap_or_default(),
      priority: draft.priority.unwrap_or_default(),
      due_date: draft.due_date,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
    if let Some(title) = &patch.title {
      self.title = title.clone();
    }
    if let Some(description) = &patch.description {
      self.description = Some(description.clone());
    }
    if let Some(status) = patch.status {
      self.status = status;
    }
    if let Some(priority) = patch.priority {
      self.priority = priority;
    }
    if let Some(due_date) = patch.due_date {
      self.due_date = Some(due_date);
    }
    self.updated_at = now;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_draft_defaults() {
    let task = Task::from_draft(TaskDraft::new("a"), "temp-1".into(), "u", Utc::now());
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.created_at, task.updated_at);
  }

  #[test]
  fn test_patch_only_touches_given_fields() {
    let created = Utc::now();
    let mut task = Task::from_draft(
      TaskDraft::new("a").with_priority(Priority::High),
      "t".into(),
      "u",
      created,
    );
    let later = created + chrono::Duration::seconds(5);
    task.apply_patch(&TaskPatch::status(TaskStatus::Done), later);

    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.title, "a");
    assert_eq!(task.updated_at, later);
  }

  #[test]
  fn test_patch_serializes_sparse() {
    let body = serde_json::to_value(TaskPatch::status(TaskStatus::InProgress)).unwrap();
    assert_eq!(body, serde_json::json!({ "status": "in_progress" }));
  }
}

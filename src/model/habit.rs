use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Placement};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
  #[default]
  Daily,
  Weekly,
}

fn default_goal() -> f64 {
  1.0
}

fn default_unit() -> String {
  "times".to_string()
}

/// A habit with a per-day goal (e.g., 2000 ml of water).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
  pub id: String,
  pub user_id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default = "default_goal")]
  pub goal: f64,
  #[serde(default = "default_unit")]
  pub unit: String,
  #[serde(default)]
  pub frequency: Frequency,
  #[serde(default)]
  pub color: Option<String>,
  #[serde(default)]
  pub archived: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct HabitDraft {
  pub name: String,
  pub description: Option<String>,
  pub goal: Option<f64>,
  pub unit: Option<String>,
  pub frequency: Option<Frequency>,
  pub color: Option<String>,
}

impl HabitDraft {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn with_goal(mut self, goal: f64, unit: impl Into<String>) -> Self {
    self.goal = Some(goal);
    self.unit = Some(unit.into());
    self
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HabitPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub goal: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unit: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub archived: Option<bool>,
}

impl Entity for Habit {
  type Draft = HabitDraft;
  type Patch = HabitPatch;

  fn table() -> &'static str {
    "habits"
  }

  fn label() -> &'static str {
    "habit"
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

  fn from_draft(draft: HabitDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      name: draft.name,
      description: draft.description,
      goal: draft.goal.unwrap_or_else(default_goal),
      unit: draft.unit.unwrap_or_else(default_unit),
      frequency: draft.frequency.unwrap_or_default(),
      color: draft.color,
      archived: false,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &HabitPatch, now: DateTime<Utc>) {
    if let Some(name) = &patch.name {
      self.name = name.clone();
    }
    if let Some(goal) = patch.goal {
      self.goal = goal;
    }
    if let Some(unit) = &patch.unit {
      self.unit = unit.clone();
    }
    if let Some(color) = &patch.color {
      self.color = Some(color.clone());
    }
    if let Some(archived) = patch.archived {
      self.archived = archived;
    }
    self.updated_at = now;
  }
}

/// Amount logged against a habit on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitLog {
  pub id: String,
  pub user_id: String,
  pub habit_id: String,
  pub date: NaiveDate,
  pub value: f64,
  #[serde(default)]
  pub note: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HabitLogDraft {
  pub habit_id: String,
  pub date: NaiveDate,
  pub value: f64,
  pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HabitLogPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

impl Entity for HabitLog {
  type Draft = HabitLogDraft;
  type Patch = HabitLogPatch;

  fn table() -> &'static str {
    "habit_logs"
  }

  fn label() -> &'static str {
    "habit log"
  }

  fn parent_column() -> Option<&'static str> {
    Some("habit_id")
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn owner(&self) -> &str {
    &self.user_id
  }

  fn parent_id(&self) -> Option<&str> {
    Some(self.habit_id.as_str())
  }

  fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  fn from_draft(draft: HabitLogDraft, id: String, owner: &str, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id: owner.to_string(),
      habit_id: draft.habit_id,
      date: draft.date,
      value: draft.value,
      note: draft.note,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: &HabitLogPatch, now: DateTime<Utc>) {
    if let Some(value) = patch.value {
      self.value = value;
    }
    if let Some(note) = &patch.note {
      self.note = Some(note.clone());
    }
    self.updated_at = now;
  }
}

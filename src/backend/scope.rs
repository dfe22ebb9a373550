use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::Entity;

/// Rows of one table visible to one cache: an owner, optionally narrowed to a
/// parent row (e.g., tasks of one project).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
  pub table: &'static str,
  pub owner: String,
  pub parent: Option<ParentFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentFilter {
  pub column: &'static str,
  pub id: String,
}

impl Scope {
  /// Scope for `T` rows owned by `owner`.
  ///
  /// A parent id is ignored for types without a parent column.
  pub fn new<T: Entity>(owner: &str, parent: Option<&str>) -> Self {
    let parent = match (T::parent_column(), parent) {
      (Some(column), Some(id)) => Some(ParentFilter {
        column,
        id: id.to_string(),
      }),
      _ => None,
    };

    Self {
      table: T::table(),
      owner: owner.to_string(),
      parent,
    }
  }

  /// Whether an entity belongs to this scope.
  pub fn contains<T: Entity>(&self, entity: &T) -> bool {
    if entity.owner() != self.owner {
      return false;
    }
    match &self.parent {
      Some(parent) => entity.parent_id() == Some(parent.id.as_str()),
      None => true,
    }
  }

  /// Whether a raw backend row belongs to this scope.
  pub fn matches_row(&self, row: &Value) -> bool {
    if row.get("user_id").and_then(Value::as_str) != Some(self.owner.as_str()) {
      return false;
    }
    match &self.parent {
      Some(parent) => row.get(parent.column).and_then(Value::as_str) == Some(parent.id.as_str()),
      None => true,
    }
  }

  /// Equality filters as `(column, "eq.value")` query pairs.
  pub fn filters(&self) -> Vec<(String, String)> {
    let mut filters = vec![("user_id".to_string(), format!("eq.{}", self.owner))];
    if let Some(parent) = &self.parent {
      filters.push((parent.column.to_string(), format!("eq.{}", parent.id)));
    }
    filters
  }

  /// Local store key for guest lists of this scope.
  pub fn local_key(&self) -> String {
    match &self.parent {
      Some(parent) => format!("kiden.{}.{}", self.table, parent.id),
      None => format!("kiden.{}", self.table),
    }
  }

  /// Stable realtime channel name for this scope.
  pub fn channel(&self) -> String {
    // SHA256 hash for stable, fixed-length names
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    match &self.parent {
      Some(parent) => format!(
        "{} of {} where {} = {}",
        self.table, self.owner, parent.column, parent.id
      ),
      None => format!("{} of {}", self.table, self.owner),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Project, ProjectDraft, Task, TaskDraft};
  use chrono::Utc;
  use serde_json::json;

  #[test]
  fn test_unscoped_contains_by_owner() {
    let scope = Scope::new::<Task>("u-1", None);
    let mine = Task::from_draft(TaskDraft::new("a"), "1".into(), "u-1", Utc::now());
    let theirs = Task::from_draft(TaskDraft::new("a"), "2".into(), "u-2", Utc::now());

    assert!(scope.contains(&mine));
    assert!(!scope.contains(&theirs));
    assert_eq!(scope.local_key(), "kiden.tasks");
  }

  #[test]
  fn test_parent_scope_filters_rows() {
    let scope = Scope::new::<Task>("u-1", Some("p-1"));
    let inside = Task::from_draft(TaskDraft::new("a").in_project("p-1"), "1".into(), "u-1", Utc::now());
    let outside = Task::from_draft(TaskDraft::new("a").in_project("p-2"), "2".into(), "u-1", Utc::now());

    assert!(scope.contains(&inside));
    assert!(!scope.contains(&outside));
    assert!(scope.matches_row(&json!({ "user_id": "u-1", "project_id": "p-1" })));
    assert!(!scope.matches_row(&json!({ "user_id": "u-1", "project_id": null })));
    assert_eq!(scope.local_key(), "kiden.tasks.p-1");
    assert_eq!(
      scope.filters(),
      vec![
        ("user_id".to_string(), "eq.u-1".to_string()),
        ("project_id".to_string(), "eq.p-1".to_string()),
      ]
    );
  }

  #[test]
  fn test_parent_ignored_without_parent_column() {
    let scope = Scope::new::<Project>("u-1", Some("p-1"));
    assert_eq!(scope.parent, None);

    let project = Project::from_draft(ProjectDraft::new("x"), "1".into(), "u-1", Utc::now());
    assert!(scope.contains(&project));
  }

  #[test]
  fn test_channel_is_stable_hex() {
    let a = Scope::new::<Task>("u-1", Some("p-1"));
    let b = Scope::new::<Task>("u-1", Some("p-1"));
    let c = Scope::new::<Task>("u-1", None);

    assert_eq!(a.channel(), b.channel());
    assert_ne!(a.channel(), c.channel());
    assert_eq!(a.channel().len(), 64);
  }
}

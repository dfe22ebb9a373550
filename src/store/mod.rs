//! Local fallback store used while no one is signed in.
//!
//! The store is a synchronous key-value area holding one JSON-serialized list
//! per entity type (and parent scope). In guest mode it is the only copy of
//! the data, so hooks rewrite the whole list on every mutation.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use color_eyre::{eyre::eyre, Result};
use tracing::debug;

use crate::model::Entity;

/// Trait for local key-value storage backends.
pub trait LocalStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// Load a stored list. Missing, unreadable or malformed data reads as empty.
pub fn load_list<T: Entity>(store: &impl LocalStore, key: &str) -> Vec<T> {
  let raw = match store.get(key) {
    Ok(Some(raw)) => raw,
    Ok(None) => return Vec::new(),
    Err(e) => {
      debug!(key, error = %e, "local store read failed, treating as empty");
      return Vec::new();
    }
  };

  match serde_json::from_str(&raw) {
    Ok(items) => items,
    Err(e) => {
      debug!(key, error = %e, "malformed local list, treating as empty");
      Vec::new()
    }
  }
}

/// Overwrite a stored list.
pub fn save_list<T: Entity>(store: &impl LocalStore, key: &str, items: &[T]) -> Result<()> {
  let raw = serde_json::to_string(items)
    .map_err(|e| eyre!("Failed to serialize {} list: {}", T::label(), e))?;
  store.set(key, &raw)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Note, NoteDraft};
  use chrono::Utc;

  fn note(id: &str) -> Note {
    Note::from_draft(NoteDraft::new(id, "body"), id.to_string(), "guest", Utc::now())
  }

  #[test]
  fn test_missing_key_is_empty() {
    let store = MemoryStore::new();
    assert!(load_list::<Note>(&store, "kiden.notes").is_empty());
  }

  #[test]
  fn test_malformed_list_is_empty() {
    let store = MemoryStore::new();
    store.set("kiden.notes", "{not json").unwrap();
    assert!(load_list::<Note>(&store, "kiden.notes").is_empty());

    store.set("kiden.notes", r#"[{"id": 1}]"#).unwrap();
    assert!(load_list::<Note>(&store, "kiden.notes").is_empty());
  }

  #[test]
  fn test_save_then_load_keeps_order() {
    let store = MemoryStore::new();
    let notes = vec![note("b"), note("a"), note("c")];
    save_list(&store, "kiden.notes", &notes).unwrap();

    let loaded: Vec<Note> = load_list(&store, "kiden.notes");
    assert_eq!(loaded, notes);
  }
}

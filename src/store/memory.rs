use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::LocalStore;

/// Process-local store. Contents vanish with the process.
///
/// Writes can be switched off to simulate a full or broken disk.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  read_only: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent write fail (or succeed again).
  pub fn set_read_only(&self, read_only: bool) {
    self.read_only.store(read_only, Ordering::SeqCst);
  }

  fn check_writable(&self) -> Result<()> {
    if self.read_only.load(Ordering::SeqCst) {
      return Err(eyre!("Local store is read-only"));
    }
    Ok(())
  }
}

impl LocalStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.check_writable()?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.check_writable()?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }
}

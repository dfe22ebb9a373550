//! Daily habit logging and completion stats over the habit caches.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::CacheHook;
use crate::model::{Habit, HabitLog, HabitLogDraft, HabitLogPatch};
use crate::store::LocalStore;

/// Habit operations that span the habit and habit-log lists.
///
/// Clones share one write lock: logs and deletes through any of them run one
/// at a time.
pub struct HabitTracker<B, S> {
  habits: CacheHook<Habit, B, S>,
  logs: CacheHook<HabitLog, B, S>,
  writes: Arc<Mutex<()>>,
}

impl<B, S> Clone for HabitTracker<B, S> {
  fn clone(&self) -> Self {
    Self {
      habits: self.habits.clone(),
      logs: self.logs.clone(),
      writes: Arc::clone(&self.writes),
    }
  }
}

impl<B: Backend, S: LocalStore> HabitTracker<B, S> {
  pub fn new(habits: CacheHook<Habit, B, S>, logs: CacheHook<HabitLog, B, S>) -> Self {
    Self {
      habits,
      logs,
      writes: Arc::new(Mutex::new(())),
    }
  }

  pub fn habits(&self) -> &CacheHook<Habit, B, S> {
    &self.habits
  }

  pub fn logs(&self) -> &CacheHook<HabitLog, B, S> {
    &self.logs
  }

  fn habit(&self, habit_id: &str) -> Result<Habit> {
    self
      .habits
      .get(habit_id)
      .ok_or_else(|| eyre!("No habit with id {}", habit_id))
  }

  pub fn logs_for(&self, habit_id: &str, date: NaiveDate) -> Vec<HabitLog> {
    self
      .logs
      .items()
      .into_iter()
      .filter(|log| log.habit_id == habit_id && log.date == date)
      .collect()
  }

  /// Add `value` to the habit's log for `date`, creating the log if needed.
  ///
  /// A log issued while an earlier one is still saving waits for it and then
  /// adds to the saved row.
  pub async fn log(&self, habit_id: &str, value: f64, date: NaiveDate) -> Result<HabitLog> {
    self.habit(habit_id)?;
    let _writes = self.writes.lock().await;

    match self.logs_for(habit_id, date).into_iter().next() {
      Some(existing) => {
        debug!(habit = habit_id, %date, "adding to existing log");
        let patch = HabitLogPatch {
          value: Some(existing.value + value),
          note: None,
        };
        self.logs.update(&existing.id, patch).await
      }
      None => {
        self
          .logs
          .create(HabitLogDraft {
            habit_id: habit_id.to_string(),
            date,
            value,
            note: None,
          })
          .await
      }
    }
  }

  pub fn total_for(&self, habit_id: &str, date: NaiveDate) -> f64 {
    self
      .logs_for(habit_id, date)
      .iter()
      .map(|log| log.value)
      .sum()
  }

  pub fn is_completed(&self, habit_id: &str, date: NaiveDate) -> bool {
    match self.habits.get(habit_id) {
      Some(habit) => habit.goal > 0.0 && self.total_for(habit_id, date) >= habit.goal,
      None => false,
    }
  }

  /// Share of the day's goal reached, in `[0, 1]`.
  pub fn progress(&self, habit_id: &str, date: NaiveDate) -> f64 {
    match self.habits.get(habit_id) {
      Some(habit) if habit.goal > 0.0 => {
        (self.total_for(habit_id, date) / habit.goal).clamp(0.0, 1.0)
      }
      _ => 0.0,
    }
  }

  /// Consecutive completed days ending today, or yesterday while today is
  /// still open.
  pub fn streak(&self, habit_id: &str, today: NaiveDate) -> u32 {
    let Some(habit) = self.habits.get(habit_id) else {
      return 0;
    };
    if habit.goal <= 0.0 {
      return 0;
    }

    let mut totals: HashMap<NaiveDate, f64> = HashMap::new();
    for log in self.logs.items().into_iter().filter(|l| l.habit_id == habit_id) {
      *totals.entry(log.date).or_default() += log.value;
    }
    let completed = |day: &NaiveDate| totals.get(day).is_some_and(|total| *total >= habit.goal);

    let mut day = today;
    if !completed(&day) {
      match day.pred_opt() {
        Some(yesterday) => day = yesterday,
        None => return 0,
      }
    }

    let mut streak = 0;
    while completed(&day) {
      streak += 1;
      match day.pred_opt() {
        Some(previous) => day = previous,
        None => break,
      }
    }
    streak
  }

  /// Delete a habit along with its logs.
  ///
  /// Logs go first. If any of them stays, so does the habit, and the error
  /// lists every log that could not be deleted.
  pub async fn delete_habit(&self, habit_id: &str) -> Result<()> {
    self.habit(habit_id)?;
    let _writes = self.writes.lock().await;

    let logs: Vec<HabitLog> = self
      .logs
      .items()
      .into_iter()
      .filter(|log| log.habit_id == habit_id)
      .collect();
    let total = logs.len();

    let mut failures = Vec::new();
    for log in logs {
      if let Err(e) = self.logs.delete(&log.id).await {
        warn!(habit = habit_id, log = %log.id, error = %e, "habit log not deleted");
        failures.push(format!("{}: {}", log.id, e));
      }
    }
    if !failures.is_empty() {
      return Err(eyre!(
        "Failed to delete {} of {} logs of habit {}: {}",
        failures.len(),
        total,
        habit_id,
        failures.join("; ")
      ));
    }

    self.habits.delete(habit_id).await
  }
}

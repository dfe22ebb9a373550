use tokio::sync::mpsc;

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Error,
}

/// Transient message for the user (a toast in the dashboard)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: Level,
  pub message: String,
}

impl Notification {
  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: Level::Info,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: Level::Error,
      message: message.into(),
    }
  }
}

/// Events emitted by cache hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// The in-memory list for a table changed
  Changed { table: &'static str },
  /// Something the user should be told about
  Notice(Notification),
}

pub type EventSender = mpsc::UnboundedSender<CacheEvent>;

/// Receiving end for cache events; hooks get clones of its sender
pub struct EventHandler {
  tx: EventSender,
  rx: mpsc::UnboundedReceiver<CacheEvent>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  pub fn sender(&self) -> EventSender {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<CacheEvent> {
    self.rx.recv().await
  }

  /// Drain everything queued so far without waiting
  pub fn drain(&mut self) -> Vec<CacheEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.rx.try_recv() {
      events.push(event);
    }
    events
  }

  /// Queued notices only, in arrival order
  pub fn notices(&mut self) -> Vec<Notification> {
    self
      .drain()
      .into_iter()
      .filter_map(|event| match event {
        CacheEvent::Notice(notice) => Some(notice),
        CacheEvent::Changed { .. } => None,
      })
      .collect()
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

//! Active identity and the reactive auth state the caches follow.

use std::fmt;
use tokio::sync::watch;

/// Owner marker stored on rows created without a signed-in user.
pub const GUEST_OWNER: &str = "guest";

/// Who the caches are working for.
#[derive(Clone, PartialEq, Eq)]
pub enum Identity {
  /// Nobody is signed in; data lives in the local store only
  Guest,
  /// Authenticated user with a backend access token
  User { id: String, access_token: String },
}

/// Where a cache persists its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
  /// Persist to the backend, reconcile through the realtime feed
  Remote,
  /// Persist to the local fallback store
  Local,
}

impl Identity {
  pub fn user(id: impl Into<String>, access_token: impl Into<String>) -> Self {
    Identity::User {
      id: id.into(),
      access_token: access_token.into(),
    }
  }

  /// Value written to the `user_id` column of rows owned by this identity.
  pub fn owner(&self) -> &str {
    match self {
      Identity::Guest => GUEST_OWNER,
      Identity::User { id, .. } => id,
    }
  }

  pub fn storage_mode(&self) -> StorageMode {
    match self {
      Identity::Guest => StorageMode::Local,
      Identity::User { .. } => StorageMode::Remote,
    }
  }

  pub fn access_token(&self) -> Option<&str> {
    match self {
      Identity::Guest => None,
      Identity::User { access_token, .. } => Some(access_token),
    }
  }

  pub fn is_guest(&self) -> bool {
    matches!(self, Identity::Guest)
  }
}

impl fmt::Debug for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Identity::Guest => f.write_str("Guest"),
      Identity::User { id, .. } => f
        .debug_struct("User")
        .field("id", id)
        .field("access_token", &"<redacted>")
        .finish(),
    }
  }
}

/// Reactive current identity.
///
/// Sessions subscribe to this and rebuild their caches whenever it changes.
pub struct AuthState {
  tx: watch::Sender<Identity>,
}

impl AuthState {
  pub fn new(initial: Identity) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  pub fn current(&self) -> Identity {
    self.tx.borrow().clone()
  }

  pub fn sign_in(&self, identity: Identity) {
    self.tx.send_replace(identity);
  }

  pub fn sign_out(&self) {
    self.tx.send_replace(Identity::Guest);
  }

  pub fn subscribe(&self) -> watch::Receiver<Identity> {
    self.tx.subscribe()
  }
}

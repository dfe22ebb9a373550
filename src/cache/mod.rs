//! Optimistic caching layer for the dashboard's domain lists.
//!
//! Each `CacheHook` owns one in-memory list for an entity type, scope and
//! identity and:
//! - Applies create/update/delete to the list before any I/O
//! - Persists to the backend (signed in) or the local store (guest)
//! - Swaps temporary ids for server ids in place once an insert lands
//! - Reverts failed mutations and reports them as notices
//! - Merges realtime changes by id instead of refetching

mod hook;
mod state;

pub use hook::{CacheHook, HookContext};
pub use state::{FailurePolicy, ListState, Reconciled, SyncState};

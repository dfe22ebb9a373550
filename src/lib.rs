//! Optimistic local cache for the Kiden productivity dashboard.
//!
//! Lists of tasks, habits, projects, notes, workspaces and collections are
//! held in memory and mutated before persistence completes. Signed-in users
//! persist to a hosted backend with a realtime change feed; guests persist to
//! a local store.

pub mod backend;
pub mod cache;
pub mod config;
pub mod event;
pub mod habits;
pub mod identity;
pub mod logging;
pub mod model;
pub mod session;
pub mod store;
pub mod workspace;

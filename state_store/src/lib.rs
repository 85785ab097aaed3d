#![cfg_attr(feature = "strict", deny(warnings))]

//! Filesystem-backed storage for named state blobs and their lock markers.
//!
//! Every entry `name` maps to two independent artifacts inside the storage root:
//! `{name}.tfstate` holding the content and, while the entry is checked out,
//! an empty `{name}.lock` marker. The filesystem is the only source of truth;
//! nothing about entries is cached in memory between calls.

pub mod error;
mod name_locks;
mod roster;
mod store;

pub use error::{Result, StoreError};
pub use name_locks::NameLocks;
pub use roster::{Roster, StateStatus};
pub use store::{validate_name, StateStore, LOCK_FILE_EXT, STATE_FILE_EXT};

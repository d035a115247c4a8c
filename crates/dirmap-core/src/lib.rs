//! # dirmap-core
//!
//! Backend contract for directory-backed user identity resolution.
//!
//! This crate defines the seams between a host user-management runtime and a
//! directory-backed user backend:
//!
//! - Narrow collaborator traits ([`DirectoryClient`], [`ConfigSource`],
//!   [`UserValueStore`]) that the host wires in at construction time.
//! - The error taxonomy ([`BackendError`], [`DirectoryError`]) separating
//!   soft negatives (plain `Ok(false)`/`Ok(None)` returns) from raised
//!   conditions (offline identities, fatal lookups, policy rejections).
//! - The plugin contract ([`UserPlugin`], [`PluginRegistry`]) that lets an
//!   external component override individual backend actions, declared
//!   through the [`Actions`] bitmask.
//!
//! ## Example
//!
//! ```ignore
//! use dirmap_core::{Actions, PluginRegistry};
//!
//! let registry = PluginRegistry::new();
//! assert!(!registry.implements(Actions::CHECK_PASSWORD));
//! ```

pub mod actions;
pub mod error;
pub mod plugin;
pub mod traits;
pub mod types;

// Re-exports
pub use actions::Actions;
pub use error::{BackendError, BackendResult, DirectoryError, DirectoryResult};
pub use plugin::{PluginRegistry, UserPlugin};
pub use traits::{ConfigSource, DirectoryClient, UserValueStore};
pub use types::{CacheValue, DirectoryEntry, StableId};

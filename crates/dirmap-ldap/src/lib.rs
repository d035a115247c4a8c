//! LDAP-backed user identity backend.
//!
//! Resolves directory entries to stable internal usernames, caches lookup
//! results per connection, and distinguishes live identities from offline
//! ones whose directory entry has vanished. Individual backend actions can
//! be overridden by plugins registered with the
//! [`PluginRegistry`](dirmap_core::PluginRegistry).
//!
//! Wiring order: load [`Settings`] from the host's config source, build a
//! transport ([`Ldap3Client`] in production, a fake in tests), wrap both in
//! a [`Connection`], layer [`Access`] and an [`IdentityManager`] on top,
//! and hand everything to [`UserBackend`].

pub mod access;
pub mod backend;
pub mod client;
pub mod connection;
pub mod identity;
pub mod mapping;
pub mod settings;

pub use access::{combine_filter_with_and, escape_filter_part, string_resembles_dn, Access};
pub use backend::UserBackend;
pub use client::{ClientConfig, Ldap3Client};
pub use connection::Connection;
pub use identity::{Identity, IdentityManager, OfflineUser, User};
pub use mapping::{MappingRecord, UserMapping};
pub use settings::{AvatarRule, HomeFolderRule, Settings, SettingsError};

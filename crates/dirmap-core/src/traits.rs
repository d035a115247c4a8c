//! Collaborator traits.
//!
//! The backend never reaches for globals: the host injects one
//! implementation of each of these seams at wiring time. Production
//! implementations live elsewhere (the LDAP transport adapter, the host's
//! config and per-user stores); tests inject in-memory fakes.

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::types::DirectoryEntry;

/// Wire-level directory protocol client.
///
/// Calls are blocking network I/O awaited end-to-end; no retries are
/// performed here or above. A failed search or bind is terminal for the
/// current backend call.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Run a search under `base` with the given filter.
    ///
    /// `attrs` lists the attributes to return (empty means DN only).
    /// `offset` entries are skipped and at most `limit` entries returned,
    /// applied in that order.
    async fn search(
        &self,
        base: &str,
        filter: &str,
        attrs: &[String],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> DirectoryResult<Vec<DirectoryEntry>>;

    /// Attempt a bind as `dn`. Returns `Ok(false)` for wrong credentials;
    /// errors are reserved for transport faults.
    async fn bind(&self, dn: &str, password: &str) -> DirectoryResult<bool>;

    /// Replace the password of `dn`.
    ///
    /// Directory-side policy rejections surface as
    /// [`DirectoryError::PasswordPolicy`](crate::DirectoryError::PasswordPolicy)
    /// with the server's message and code.
    async fn modify_password(&self, dn: &str, new_password: &str) -> DirectoryResult<()>;

    /// Whether a bound connection currently exists.
    fn is_connected(&self) -> bool;
}

/// Per-connection configuration lookup.
///
/// Keys are enumerated by the backend's settings loader; unset keys return
/// `None` and fall back to documented defaults.
pub trait ConfigSource: Send + Sync {
    /// Look up a configuration value by key.
    fn value(&self, key: &str) -> Option<String>;
}

/// Host-owned per-user key/value store.
///
/// Holds the soft-deletion marker and the snapshot values (home path, last
/// DN, display name) that keep an offline identity addressable after its
/// directory entry has vanished. The host namespaces keys per backend.
pub trait UserValueStore: Send + Sync {
    /// Read a value for a user; `None` when unset.
    fn get_user_value(&self, uid: &str, key: &str) -> Option<String>;

    /// Write a value for a user.
    fn set_user_value(&self, uid: &str, key: &str, value: &str);

    /// Remove a value for a user.
    fn delete_user_value(&self, uid: &str, key: &str);
}

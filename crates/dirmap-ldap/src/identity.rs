//! Identity objects and their manager.
//!
//! Identities come in two flavors with distinct capabilities: a live
//! [`User`] backed by a directory entry, and an [`OfflineUser`] snapshot
//! for identities whose entry has vanished or that carry the soft-deletion
//! marker. The [`Identity`] enum makes the distinction explicit at every
//! call site; there is no shared interface to downcast from.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, instrument};

use dirmap_core::{BackendResult, UserValueStore};

use crate::access::{string_resembles_dn, Access};
use crate::settings::{AvatarRule, HomeFolderRule};

/// Per-user store keys.
pub mod store_keys {
    /// Soft-deletion marker; `"1"` flags the identity for cleanup.
    pub const DELETED: &str = "deleted";
    /// Last resolved home path.
    pub const HOME: &str = "home";
    /// Last known DN.
    pub const DN: &str = "dn";
    /// Last composed display name.
    pub const DISPLAY_NAME: &str = "display_name";
}

const JPEG_MAGIC: &[u8] = &[0xff, 0xd8, 0xff];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4e, 0x47];

/// A live identity backed by a resolvable directory entry.
pub struct User {
    username: String,
    dn: String,
    access: Arc<Access>,
    store: Arc<dyn UserValueStore>,
}

impl User {
    fn new(
        username: String,
        dn: String,
        access: Arc<Access>,
        store: Arc<dyn UserValueStore>,
    ) -> Self {
        store.set_user_value(&username, store_keys::DN, &dn);
        Self {
            username,
            dn,
            access,
            store,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Home path per the configured rule.
    ///
    /// With no rule configured the host applies its own default and the
    /// backend reports nothing. With an attribute rule, absolute values are
    /// taken as-is and relative ones joined under the base data directory;
    /// the result is persisted so it survives the entry's disappearance.
    pub async fn home_path(&self) -> BackendResult<Option<PathBuf>> {
        let settings = self.access.connection().settings();
        let attr = match &settings.home_folder_rule {
            HomeFolderRule::HostDefault => return Ok(None),
            HomeFolderRule::Attribute(attr) => attr.clone(),
        };

        let Some(value) = self
            .access
            .read_attribute(&self.dn, &attr)
            .await
            .and_then(|values| values.into_iter().next())
        else {
            return Ok(None);
        };

        let path = if value.starts_with('/') {
            PathBuf::from(value)
        } else {
            settings.base_data_dir.join(value)
        };
        self.store.set_user_value(
            &self.username,
            store_keys::HOME,
            &path.to_string_lossy(),
        );
        Ok(Some(path))
    }

    /// Avatar image bytes per the configured rule, `None` when the rule is
    /// `none` or no photo attribute is populated.
    pub async fn avatar_image(&self) -> Option<Vec<u8>> {
        let rule = self.access.connection().settings().avatar_rule.clone();
        match rule {
            AvatarRule::None => None,
            AvatarRule::Data(attr) => self.access.read_binary_attribute(&self.dn, &attr).await,
            AvatarRule::Default => {
                if let Some(data) = self.access.read_binary_attribute(&self.dn, "jpegPhoto").await
                {
                    return Some(data);
                }
                self.access
                    .read_binary_attribute(&self.dn, "thumbnailPhoto")
                    .await
            }
        }
    }

    /// Whether `data` is a usable avatar image (JPEG or PNG).
    pub fn update_avatar(&self, data: &[u8]) -> bool {
        let valid = data.starts_with(JPEG_MAGIC) || data.starts_with(PNG_MAGIC);
        if !valid {
            debug!(username = %self.username, "avatar data rejected, unknown format");
        }
        valid
    }

    /// Compose the display name, appending the secondary value in
    /// parentheses when present, and persist it.
    pub fn compose_and_store_display_name(&self, name: &str, name2: Option<&str>) -> String {
        let composed = match name2 {
            Some(second) if !second.is_empty() && second != name => {
                format!("{name} ({second})")
            }
            _ => name.to_string(),
        };
        self.store
            .set_user_value(&self.username, store_keys::DISPLAY_NAME, &composed);
        composed
    }
}

/// Snapshot of an identity whose directory entry is gone (or flagged for
/// deletion). Serves only persisted values; nothing here touches the
/// directory.
pub struct OfflineUser {
    username: String,
    dn: Option<String>,
    home: Option<PathBuf>,
    display_name: Option<String>,
    has_deletion_flag: bool,
}

impl OfflineUser {
    fn load(username: &str, store: &dyn UserValueStore) -> Self {
        Self {
            username: username.to_string(),
            dn: store.get_user_value(username, store_keys::DN),
            home: store
                .get_user_value(username, store_keys::HOME)
                .map(PathBuf::from),
            display_name: store.get_user_value(username, store_keys::DISPLAY_NAME),
            has_deletion_flag: store
                .get_user_value(username, store_keys::DELETED)
                .as_deref()
                == Some("1"),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    pub fn home(&self) -> Option<&PathBuf> {
        self.home.as_ref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn has_deletion_flag(&self) -> bool {
        self.has_deletion_flag
    }
}

/// An identity in either state.
#[derive(Clone)]
pub enum Identity {
    Online(Arc<User>),
    Offline(Arc<OfflineUser>),
}

impl Identity {
    /// The live user, if this identity is online.
    pub fn as_online(&self) -> Option<&Arc<User>> {
        match self {
            Identity::Online(user) => Some(user),
            Identity::Offline(_) => None,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Identity::Online(user) => user.username(),
            Identity::Offline(user) => user.username(),
        }
    }
}

/// Builds, caches and invalidates identity objects.
///
/// Accepts either a username or a DN; repeated lookups for the same
/// identity return the same cached object until invalidated.
pub struct IdentityManager {
    access: Arc<Access>,
    store: Arc<dyn UserValueStore>,
    cache: DashMap<String, Identity>,
}

impl IdentityManager {
    pub fn new(access: Arc<Access>, store: Arc<dyn UserValueStore>) -> Self {
        Self {
            access,
            store,
            cache: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserValueStore> {
        &self.store
    }

    /// Identity for a username or DN; `None` when nothing is known about
    /// the identifier at all.
    #[instrument(skip(self))]
    pub async fn get(&self, identifier: &str) -> Option<Identity> {
        let username = if string_resembles_dn(identifier) {
            self.access.dn_to_username(identifier).await?
        } else {
            identifier.to_string()
        };

        if let Some(cached) = self.cache.get(&username) {
            return Some(cached.clone());
        }

        let deleted = self
            .store
            .get_user_value(&username, store_keys::DELETED)
            .as_deref()
            == Some("1");
        if deleted {
            let identity =
                Identity::Offline(Arc::new(OfflineUser::load(&username, self.store.as_ref())));
            self.cache.insert(username, identity.clone());
            return Some(identity);
        }

        if let Some(dn) = self.access.username_to_dn(&username).await {
            let identity = Identity::Online(Arc::new(User::new(
                username.clone(),
                dn,
                Arc::clone(&self.access),
                Arc::clone(&self.store),
            )));
            self.cache.insert(username, identity.clone());
            return Some(identity);
        }

        // Known once (a snapshot survives) but gone from the directory.
        if self
            .store
            .get_user_value(&username, store_keys::DN)
            .is_some()
        {
            let identity =
                Identity::Offline(Arc::new(OfflineUser::load(&username, self.store.as_ref())));
            self.cache.insert(username, identity.clone());
            return Some(identity);
        }

        None
    }

    /// Drop the cached identity so the next lookup rebuilds it.
    pub fn invalidate(&self, username: &str) {
        self.cache.remove(username);
    }

    /// Flag an identity for cleanup and drop its cached object, so the
    /// next lookup sees the offline state.
    pub async fn mark_deleted(&self, username: &str) {
        self.store
            .set_user_value(username, store_keys::DELETED, "1");
        self.invalidate(username);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryStore(Mutex<HashMap<(String, String), String>>);

    impl MemoryStore {
        fn new() -> Self {
            Self(Mutex::new(HashMap::new()))
        }
    }

    impl UserValueStore for MemoryStore {
        fn get_user_value(&self, uid: &str, key: &str) -> Option<String> {
            self.0
                .lock()
                .unwrap()
                .get(&(uid.to_string(), key.to_string()))
                .cloned()
        }

        fn set_user_value(&self, uid: &str, key: &str, value: &str) {
            self.0
                .lock()
                .unwrap()
                .insert((uid.to_string(), key.to_string()), value.to_string());
        }

        fn delete_user_value(&self, uid: &str, key: &str) {
            self.0
                .lock()
                .unwrap()
                .remove(&(uid.to_string(), key.to_string()));
        }
    }

    #[test]
    fn test_offline_user_loads_snapshot() {
        let store = MemoryStore::new();
        store.set_user_value("jake", store_keys::DN, "uid=jake,dc=test");
        store.set_user_value("jake", store_keys::HOME, "/srv/data/jake");
        store.set_user_value("jake", store_keys::DELETED, "1");

        let offline = OfflineUser::load("jake", &store);
        assert_eq!(offline.username(), "jake");
        assert_eq!(offline.dn(), Some("uid=jake,dc=test"));
        assert_eq!(offline.home(), Some(&PathBuf::from("/srv/data/jake")));
        assert!(offline.has_deletion_flag());
        assert_eq!(offline.display_name(), None);
    }

    #[test]
    fn test_offline_user_without_flag() {
        let store = MemoryStore::new();
        let offline = OfflineUser::load("eddie", &store);
        assert!(!offline.has_deletion_flag());
        assert_eq!(offline.dn(), None);
        assert_eq!(offline.home(), None);
    }
}

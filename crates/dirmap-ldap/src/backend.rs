//! The user backend: the operations the host calls.
//!
//! Every operation first checks the plugin registry; when a registered
//! plugin declares the action, the call is delegated and the plugin's
//! result returned verbatim, bypassing the native logic entirely.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use dirmap_core::{Actions, BackendError, BackendResult, CacheValue, PluginRegistry};

use crate::access::Access;
use crate::identity::{store_keys, Identity, IdentityManager, User};
use crate::settings::AvatarRule;

const CACHE_KEY_USER_EXISTS: &str = "userExists";
const CACHE_KEY_DISPLAY_NAME: &str = "getDisplayName";
const CACHE_KEY_LOGIN_TO_USERNAME: &str = "loginName2UserName-";

/// Directory-backed user backend.
pub struct UserBackend {
    access: Arc<Access>,
    manager: IdentityManager,
    plugins: PluginRegistry,
    /// Home paths of identities removed this process lifetime, kept so the
    /// host's cleanup can still ask where their data lived.
    homes_to_kill: DashMap<String, PathBuf>,
}

impl UserBackend {
    pub fn new(access: Arc<Access>, manager: IdentityManager, plugins: PluginRegistry) -> Self {
        Self {
            access,
            manager,
            plugins,
            homes_to_kill: DashMap::new(),
        }
    }

    pub fn access(&self) -> &Arc<Access> {
        &self.access
    }

    /// Actions available natively under the current settings.
    fn native_actions(&self) -> Actions {
        let settings = self.access.connection().settings();
        let mut actions = Actions::CHECK_PASSWORD
            | Actions::GET_HOME
            | Actions::GET_DISPLAYNAME
            | Actions::COUNT_USERS;
        if settings.password_change_enabled {
            actions |= Actions::SET_PASSWORD;
        }
        if settings.avatar_rule != AvatarRule::None {
            actions |= Actions::PROVIDE_AVATAR;
        }
        actions
    }

    /// Whether any of the queried actions is available, natively or through
    /// a plugin.
    pub fn implements_actions(&self, actions: Actions) -> bool {
        (self.native_actions() | self.plugins.implemented_actions()).intersects(actions)
    }

    /// Validate a login name and password against the directory.
    ///
    /// Wrong credentials and unknown logins are a plain `Ok(None)`; only
    /// transport faults while locating candidate entries surface as errors.
    #[instrument(skip(self, password))]
    pub async fn check_password(
        &self,
        login: &str,
        password: &str,
    ) -> BackendResult<Option<String>> {
        if let Some(plugin) = self.plugins.which(Actions::CHECK_PASSWORD) {
            return plugin.check_password(login, password).await;
        }

        let entries = self.access.fetch_users_by_login_name(login).await?;
        for entry in &entries {
            if !self.access.are_credentials_valid(&entry.dn, password).await {
                continue;
            }
            let Some(user) = self.live_user(&entry.dn).await else {
                warn!(dn = %entry.dn, "bind succeeded but no usable identity");
                continue;
            };
            if user.username().is_empty() {
                continue;
            }
            info!(login, username = %user.username(), "login validated");
            return Ok(Some(user.username().to_string()));
        }
        debug!(login, "login rejected");
        Ok(None)
    }

    /// Whether a username denotes a current directory user.
    ///
    /// A mapped identity whose entry has vanished is neither a yes nor a
    /// no: it surfaces as [`BackendError::Offline`] so the host can route
    /// it to cleanup instead of silently dropping the account.
    pub async fn user_exists(&self, uid: &str) -> BackendResult<bool> {
        let connection = self.access.connection();
        let cache_key = format!("{CACHE_KEY_USER_EXISTS}{uid}");
        if let Some(cached) = connection.get_from_cache(&cache_key).await {
            if let Some(exists) = cached.as_bool() {
                return Ok(exists);
            }
        }

        let identity = match self.manager.get(uid).await {
            None => {
                connection
                    .write_to_cache(&cache_key, CacheValue::Bool(false))
                    .await;
                return Ok(false);
            }
            Some(Identity::Offline(_)) => return Err(BackendError::offline(uid)),
            Some(Identity::Online(user)) => user,
        };

        // Mapped, but the entry itself must still be readable.
        if self
            .access
            .read_attribute(identity.dn(), "objectClass")
            .await
            .is_none()
        {
            warn!(uid, dn = %identity.dn(), "mapped entry no longer readable");
            self.manager.mark_deleted(uid).await;
            return Err(BackendError::offline(uid));
        }

        connection
            .write_to_cache(&cache_key, CacheValue::Bool(true))
            .await;
        Ok(true)
    }

    /// Usernames matching a substring search, windowed by limit/offset.
    #[instrument(skip(self))]
    pub async fn get_users(
        &self,
        search: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> BackendResult<Vec<String>> {
        let settings = self.access.connection().settings();
        let filter = self.access.filter_for_user_search(search);

        let mut attrs = vec![
            settings.username_attr.clone(),
            settings.uuid_attr.clone(),
            settings.display_name_attr.clone(),
        ];
        if let Some(attr2) = &settings.display_name_attr_secondary {
            attrs.push(attr2.clone());
        }

        let entries = self
            .access
            .fetch_list_of_users(&filter, &attrs, limit, offset)
            .await?;
        let usernames = self.access.resolve_to_usernames(&entries).await;
        debug!(search, count = usernames.len(), "user search completed");
        Ok(usernames)
    }

    /// Home path for a user.
    ///
    /// Identities removed via [`delete_user`](Self::delete_user) keep
    /// answering from the captured path so cleanup can find their data.
    pub async fn get_home(&self, uid: &str) -> BackendResult<Option<PathBuf>> {
        if let Some(plugin) = self.plugins.which(Actions::GET_HOME) {
            return plugin.get_home(uid).await;
        }

        if let Some(home) = self.homes_to_kill.get(uid) {
            return Ok(Some(home.clone()));
        }

        match self.manager.get(uid).await {
            Some(Identity::Online(user)) => user.home_path().await,
            Some(Identity::Offline(offline)) => match offline.home() {
                Some(home) => Ok(Some(home.clone())),
                None => Err(BackendError::fatal(format!(
                    "could not get home for offline uid {uid}"
                ))),
            },
            None => Err(BackendError::fatal(format!(
                "could not get user object for uid {uid}"
            ))),
        }
    }

    /// Display name for a user, composed from the configured attributes.
    ///
    /// Before trusting the mapped DN, the entry's stable id is checked
    /// against the directory; a moved entry refreshes the mapping and the
    /// caller gets `None` for this round.
    pub async fn get_display_name(&self, uid: &str) -> BackendResult<Option<String>> {
        if let Some(plugin) = self.plugins.which(Actions::GET_DISPLAYNAME) {
            return plugin.get_display_name(uid).await;
        }

        let connection = self.access.connection();
        let cache_key = format!("{CACHE_KEY_DISPLAY_NAME}{uid}");
        if let Some(cached) = connection.get_from_cache(&cache_key).await {
            if let Some(name) = cached.as_text() {
                return Ok(Some(name.to_string()));
            }
        }

        let Some(user) = self.live_user(uid).await else {
            return Ok(None);
        };

        let Some(stable_id) = self.access.mapper().stable_id_by_dn(user.dn()) else {
            return Ok(None);
        };
        match self.access.get_user_dn_by_stable_id(stable_id).await {
            Some(current_dn) if current_dn.eq_ignore_ascii_case(user.dn()) => {}
            Some(current_dn) => {
                debug!(uid, %current_dn, "entry moved, mapping refreshed");
                self.access.mapper().update_dn(stable_id, &current_dn);
                return Ok(None);
            }
            None => return Ok(None),
        }

        let settings = connection.settings();
        let Some(name) = self
            .access
            .read_attribute(user.dn(), &settings.display_name_attr)
            .await
            .and_then(|values| values.into_iter().next())
        else {
            return Ok(None);
        };

        let name2 = match &settings.display_name_attr_secondary {
            Some(attr2) => self
                .access
                .read_attribute(user.dn(), attr2)
                .await
                .and_then(|values| values.into_iter().next()),
            None => None,
        };

        let composed = user.compose_and_store_display_name(&name, name2.as_deref());
        connection
            .write_to_cache(&cache_key, CacheValue::Text(composed.clone()))
            .await;
        Ok(Some(composed))
    }

    /// Number of users, `None` when the directory cannot be counted.
    pub async fn count_users(&self) -> BackendResult<Option<u64>> {
        if let Some(plugin) = self.plugins.which(Actions::COUNT_USERS) {
            return plugin.count_users().await;
        }
        Ok(self.access.count_users().await)
    }

    /// Username a login name resolves to, with negative results cached.
    pub async fn login_name_to_username(&self, login: &str) -> BackendResult<Option<String>> {
        let connection = self.access.connection();
        let cache_key = format!("{CACHE_KEY_LOGIN_TO_USERNAME}{login}");
        if let Some(cached) = connection.get_from_cache(&cache_key).await {
            if let Some(name) = cached.as_text() {
                return Ok(Some(name.to_string()));
            }
            if cached.as_bool() == Some(false) {
                return Ok(None);
            }
        }

        let entries = self.access.fetch_users_by_login_name(login).await?;
        let resolved = match entries.first() {
            Some(entry) => self
                .live_user(&entry.dn)
                .await
                .map(|user| user.username().to_string())
                .filter(|name| !name.is_empty()),
            None => None,
        };

        match &resolved {
            Some(username) => {
                connection
                    .write_to_cache(&cache_key, CacheValue::Text(username.clone()))
                    .await;
            }
            None => {
                connection
                    .write_to_cache(&cache_key, CacheValue::Bool(false))
                    .await;
            }
        }
        Ok(resolved)
    }

    /// Change a user's directory password.
    #[instrument(skip(self, password))]
    pub async fn set_password(&self, uid: &str, password: &str) -> BackendResult<bool> {
        if let Some(plugin) = self.plugins.which(Actions::SET_PASSWORD) {
            return plugin.set_password(uid, password).await;
        }

        let user = match self.manager.get(uid).await {
            None => {
                return Err(BackendError::fatal(format!(
                    "could not get user object for uid {uid}"
                )))
            }
            Some(Identity::Offline(_)) => return Ok(false),
            Some(Identity::Online(user)) => user,
        };

        if user.username().is_empty() {
            return Ok(false);
        }
        if !self.access.connection().settings().password_change_enabled {
            debug!(uid, "password change disabled by configuration");
            return Ok(false);
        }

        self.access.set_password(user.dn(), password).await
    }

    /// Remove a flagged identity from the mapping.
    ///
    /// Only identities carrying the soft-deletion marker are removed; a
    /// live account is never deleted through this path. The home path is
    /// captured first so [`get_home`](Self::get_home) keeps answering.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, uid: &str) -> BackendResult<bool> {
        if let Some(plugin) = self.plugins.deleting_plugin() {
            return plugin.delete_user(uid).await;
        }

        let marked = self
            .manager
            .store()
            .get_user_value(uid, store_keys::DELETED)
            .as_deref()
            == Some("1");
        if !marked {
            debug!(uid, "deletion refused, identity not flagged");
            return Ok(false);
        }

        let Some(Identity::Offline(offline)) = self.manager.get(uid).await else {
            return Ok(false);
        };

        if let Some(home) = offline.home() {
            self.homes_to_kill.insert(uid.to_string(), home.clone());
        }

        let removed = self.access.mapper().unmap(uid);
        let store = self.manager.store();
        for key in [
            store_keys::DELETED,
            store_keys::DN,
            store_keys::HOME,
            store_keys::DISPLAY_NAME,
        ] {
            store.delete_user_value(uid, key);
        }
        self.manager.invalidate(uid);
        self.access
            .connection()
            .invalidate_cache(&format!("{CACHE_KEY_USER_EXISTS}{uid}"))
            .await;

        info!(uid, removed, "flagged identity removed");
        Ok(removed)
    }

    /// Whether the user may manage their avatar in the host.
    ///
    /// True only when the directory actually serves usable image data for
    /// the user; an absent or unparseable photo leaves avatar management
    /// with the host.
    pub async fn can_change_avatar(&self, uid: &str) -> BackendResult<bool> {
        if let Some(plugin) = self.plugins.which(Actions::PROVIDE_AVATAR) {
            return plugin.can_change_avatar(uid).await;
        }

        let Some(user) = self.live_user(uid).await else {
            return Ok(false);
        };
        match user.avatar_image().await {
            Some(image) => Ok(user.update_avatar(&image)),
            None => Ok(false),
        }
    }

    /// Display names are directory-owned; only a plugin can change them.
    pub async fn set_display_name(&self, uid: &str, display_name: &str) -> BackendResult<bool> {
        if let Some(plugin) = self.plugins.which(Actions::SET_DISPLAYNAME) {
            return plugin.set_display_name(uid, display_name).await;
        }
        Ok(false)
    }

    /// User creation is directory-owned; only a plugin can create.
    pub async fn create_user(&self, uid: &str, password: &str) -> BackendResult<bool> {
        if let Some(plugin) = self.plugins.which(Actions::CREATE_USER) {
            return plugin.create_user(uid, password).await;
        }
        Ok(false)
    }

    async fn live_user(&self, identifier: &str) -> Option<Arc<User>> {
        self.manager
            .get(identifier)
            .await?
            .as_online()
            .map(Arc::clone)
    }
}

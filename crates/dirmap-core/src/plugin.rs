//! Plugin contract and registry.
//!
//! A plugin declares the actions it overrides through an [`Actions`]
//! bitmask and supplies one method per action. When the registry reports an
//! action as implemented, the backend delegates that call to the plugin and
//! returns its result verbatim; the native logic is bypassed entirely.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::Actions;
use crate::error::{BackendError, BackendResult};

/// External override for individual backend actions.
///
/// Default method bodies report [`BackendError::Unsupported`]; a plugin
/// only overrides the methods matching its declared mask. Deletion support
/// is gated separately via [`can_delete_user`](UserPlugin::can_delete_user)
/// and is deliberately not part of the action bitmask.
#[async_trait]
pub trait UserPlugin: Send + Sync {
    /// The actions this plugin overrides.
    fn implemented_actions(&self) -> Actions;

    async fn check_password(&self, _login: &str, _password: &str) -> BackendResult<Option<String>> {
        Err(BackendError::Unsupported)
    }

    async fn get_home(&self, _uid: &str) -> BackendResult<Option<PathBuf>> {
        Err(BackendError::Unsupported)
    }

    async fn get_display_name(&self, _uid: &str) -> BackendResult<Option<String>> {
        Err(BackendError::Unsupported)
    }

    async fn set_display_name(&self, _uid: &str, _display_name: &str) -> BackendResult<bool> {
        Err(BackendError::Unsupported)
    }

    async fn set_password(&self, _uid: &str, _password: &str) -> BackendResult<bool> {
        Err(BackendError::Unsupported)
    }

    async fn create_user(&self, _uid: &str, _password: &str) -> BackendResult<bool> {
        Err(BackendError::Unsupported)
    }

    async fn count_users(&self) -> BackendResult<Option<u64>> {
        Err(BackendError::Unsupported)
    }

    async fn can_change_avatar(&self, _uid: &str) -> BackendResult<bool> {
        Err(BackendError::Unsupported)
    }

    /// Whether this plugin takes over identity deletion.
    fn can_delete_user(&self) -> bool {
        false
    }

    async fn delete_user(&self, _uid: &str) -> BackendResult<bool> {
        Err(BackendError::Unsupported)
    }
}

/// Holds the registered plugins and answers per-action dispatch queries.
///
/// When several plugins declare the same action, the first registered one
/// wins; registration order is the host's choice.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn UserPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Later registrations lose ties on overlapping
    /// action masks.
    pub fn register(&mut self, plugin: Arc<dyn UserPlugin>) {
        self.plugins.push(plugin);
    }

    /// Union of all plugin-declared action masks.
    pub fn implemented_actions(&self) -> Actions {
        self.plugins
            .iter()
            .fold(Actions::NONE, |acc, p| acc | p.implemented_actions())
    }

    /// Whether any plugin declares `action`.
    pub fn implements(&self, action: Actions) -> bool {
        self.implemented_actions().intersects(action)
    }

    /// The plugin responsible for `action`, if any.
    pub fn which(&self, action: Actions) -> Option<&Arc<dyn UserPlugin>> {
        self.plugins
            .iter()
            .find(|p| p.implemented_actions().intersects(action))
    }

    /// The plugin taking over deletion, if any.
    pub fn deleting_plugin(&self) -> Option<&Arc<dyn UserPlugin>> {
        self.plugins.iter().find(|p| p.can_delete_user())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPlugin;

    #[async_trait]
    impl UserPlugin for CountingPlugin {
        fn implemented_actions(&self) -> Actions {
            Actions::COUNT_USERS
        }

        async fn count_users(&self) -> BackendResult<Option<u64>> {
            Ok(Some(42))
        }
    }

    struct HomePlugin;

    #[async_trait]
    impl UserPlugin for HomePlugin {
        fn implemented_actions(&self) -> Actions {
            Actions::GET_HOME
        }

        async fn get_home(&self, uid: &str) -> BackendResult<Option<PathBuf>> {
            Ok(Some(PathBuf::from(format!("/home/{uid}"))))
        }
    }

    #[test]
    fn test_empty_registry_implements_nothing() {
        let registry = PluginRegistry::new();
        assert!(registry.implemented_actions().is_empty());
        assert!(!registry.implements(Actions::CHECK_PASSWORD));
        assert!(registry.which(Actions::GET_HOME).is_none());
        assert!(registry.deleting_plugin().is_none());
    }

    #[test]
    fn test_masks_are_combined() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(CountingPlugin));
        registry.register(Arc::new(HomePlugin));

        assert!(registry.implements(Actions::COUNT_USERS));
        assert!(registry.implements(Actions::GET_HOME));
        assert!(!registry.implements(Actions::SET_PASSWORD));
        assert_eq!(
            registry.implemented_actions(),
            Actions::COUNT_USERS | Actions::GET_HOME
        );
    }

    #[tokio::test]
    async fn test_dispatch_goes_to_declaring_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(CountingPlugin));
        registry.register(Arc::new(HomePlugin));

        let plugin = registry.which(Actions::GET_HOME).expect("home plugin");
        let home = plugin.get_home("jake").await.unwrap();
        assert_eq!(home, Some(PathBuf::from("/home/jake")));
    }

    #[tokio::test]
    async fn test_undeclared_action_is_unsupported() {
        let plugin = CountingPlugin;
        let err = plugin.check_password("a", "b").await.unwrap_err();
        assert!(matches!(err, BackendError::Unsupported));
    }
}

//! Per-connection state: transport handle, settings and result cache.

use std::sync::Arc;

use moka::future::Cache;
use tracing::debug;

use dirmap_core::{CacheValue, DirectoryClient};

use crate::settings::Settings;

const CACHE_CAPACITY: u64 = 8192;

/// One configured directory connection.
///
/// Settings are immutable for the lifetime of the value; a configuration
/// change means building a fresh `Connection`, which starts with an empty
/// cache. The cache stores negatives (`CacheValue::Bool(false)`) as real
/// entries, distinct from a miss.
pub struct Connection {
    client: Arc<dyn DirectoryClient>,
    settings: Settings,
    cache: Cache<String, CacheValue>,
}

impl Connection {
    pub fn new(client: Arc<dyn DirectoryClient>, settings: Settings) -> Self {
        Self {
            client,
            settings,
            cache: Cache::new(CACHE_CAPACITY),
        }
    }

    pub fn client(&self) -> &Arc<dyn DirectoryClient> {
        &self.client
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Cached value for a key, `None` on miss.
    pub async fn get_from_cache(&self, key: &str) -> Option<CacheValue> {
        self.cache.get(key).await
    }

    /// Store a value under a key.
    pub async fn write_to_cache(&self, key: &str, value: CacheValue) {
        self.cache.insert(key.to_string(), value).await;
    }

    /// Drop a single cached key.
    pub async fn invalidate_cache(&self, key: &str) {
        debug!(key, "cache entry invalidated");
        self.cache.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dirmap_core::{DirectoryEntry, DirectoryResult};

    struct NullClient;

    #[async_trait]
    impl DirectoryClient for NullClient {
        async fn search(
            &self,
            _base: &str,
            _filter: &str,
            _attrs: &[String],
            _limit: Option<usize>,
            _offset: Option<usize>,
        ) -> DirectoryResult<Vec<DirectoryEntry>> {
            Ok(Vec::new())
        }

        async fn bind(&self, _dn: &str, _password: &str) -> DirectoryResult<bool> {
            Ok(false)
        }

        async fn modify_password(&self, _dn: &str, _new_password: &str) -> DirectoryResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn connection() -> Connection {
        let settings = Settings {
            base_dn: "dc=test".to_string(),
            user_filter: "(objectClass=person)".to_string(),
            login_filter: "(uid=%uid)".to_string(),
            display_name_attr: "displayName".to_string(),
            display_name_attr_secondary: None,
            username_attr: "uid".to_string(),
            uuid_attr: "entryUUID".to_string(),
            avatar_rule: crate::settings::AvatarRule::Default,
            password_change_enabled: false,
            home_folder_rule: crate::settings::HomeFolderRule::HostDefault,
            base_data_dir: "/srv/data".into(),
        };
        Connection::new(Arc::new(NullClient), settings)
    }

    #[tokio::test]
    async fn test_cache_roundtrip_and_invalidation() {
        let conn = connection();

        assert!(conn.get_from_cache("userExistsjake").await.is_none());

        conn.write_to_cache("userExistsjake", CacheValue::Bool(true))
            .await;
        assert_eq!(
            conn.get_from_cache("userExistsjake").await,
            Some(CacheValue::Bool(true))
        );

        conn.invalidate_cache("userExistsjake").await;
        assert!(conn.get_from_cache("userExistsjake").await.is_none());
    }

    #[tokio::test]
    async fn test_cached_negative_is_distinct_from_miss() {
        let conn = connection();

        conn.write_to_cache("loginName2UserName-nobody", CacheValue::Bool(false))
            .await;
        let cached = conn
            .get_from_cache("loginName2UserName-nobody")
            .await
            .unwrap();
        assert_eq!(cached.as_bool(), Some(false));
    }
}

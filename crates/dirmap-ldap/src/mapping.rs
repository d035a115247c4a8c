//! Username / DN / stable-id mapping table.
//!
//! The bijection between internal usernames and directory entries is
//! anchored on the directory's stable identifier, never the DN: a renamed
//! entry keeps its username, only the stored DN is refreshed. DN lookups
//! are case-insensitive.

use dashmap::DashMap;
use tracing::debug;

use dirmap_core::StableId;

/// One mapped identity.
#[derive(Debug, Clone)]
pub struct MappingRecord {
    pub stable_id: StableId,
    pub username: String,
    pub dn: String,
}

/// Concurrent bidirectional mapping between usernames, DNs and stable ids.
#[derive(Default)]
pub struct UserMapping {
    by_id: DashMap<StableId, MappingRecord>,
    name_index: DashMap<String, StableId>,
    dn_index: DashMap<String, StableId>,
}

impl UserMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping. Returns `false` without modifying anything when
    /// the username, DN or stable id is already taken.
    pub fn map(&self, stable_id: StableId, username: &str, dn: &str) -> bool {
        let dn_key = dn.to_lowercase();
        if self.by_id.contains_key(&stable_id)
            || self.name_index.contains_key(username)
            || self.dn_index.contains_key(&dn_key)
        {
            debug!(%stable_id, username, "mapping rejected, identifier already taken");
            return false;
        }

        self.by_id.insert(
            stable_id,
            MappingRecord {
                stable_id,
                username: username.to_string(),
                dn: dn.to_string(),
            },
        );
        self.name_index.insert(username.to_string(), stable_id);
        self.dn_index.insert(dn_key, stable_id);
        true
    }

    /// Point an existing mapping at a new DN (entry rename). Returns `false`
    /// when the stable id is unknown.
    pub fn update_dn(&self, stable_id: StableId, new_dn: &str) -> bool {
        let Some(mut record) = self.by_id.get_mut(&stable_id) else {
            return false;
        };
        let old_key = record.dn.to_lowercase();
        record.dn = new_dn.to_string();
        drop(record);

        self.dn_index.remove(&old_key);
        self.dn_index.insert(new_dn.to_lowercase(), stable_id);
        debug!(%stable_id, new_dn, "mapping DN refreshed");
        true
    }

    /// Stable id mapped to a DN, if any.
    pub fn stable_id_by_dn(&self, dn: &str) -> Option<StableId> {
        self.dn_index.get(&dn.to_lowercase()).map(|r| *r.value())
    }

    /// Current DN for a username, if mapped.
    pub fn dn_by_username(&self, username: &str) -> Option<String> {
        let stable_id = *self.name_index.get(username)?.value();
        self.by_id.get(&stable_id).map(|r| r.dn.clone())
    }

    /// Username for a stable id, if mapped.
    pub fn username_by_stable_id(&self, stable_id: StableId) -> Option<String> {
        self.by_id.get(&stable_id).map(|r| r.username.clone())
    }

    /// Username mapped to a DN, if any.
    pub fn username_by_dn(&self, dn: &str) -> Option<String> {
        self.stable_id_by_dn(dn)
            .and_then(|id| self.username_by_stable_id(id))
    }

    /// Whether a username is mapped.
    pub fn has_username(&self, username: &str) -> bool {
        self.name_index.contains_key(username)
    }

    /// Remove the mapping for a username. Returns `false` when it was not
    /// mapped; repeat removals are not an error.
    pub fn unmap(&self, username: &str) -> bool {
        let Some((_, stable_id)) = self.name_index.remove(username) else {
            return false;
        };
        if let Some((_, record)) = self.by_id.remove(&stable_id) {
            self.dn_index.remove(&record.dn.to_lowercase());
        }
        debug!(username, "mapping removed");
        true
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_lookup() {
        let mapping = UserMapping::new();
        let id = StableId::new();
        assert!(mapping.map(id, "gunslinger", "uid=roland,dc=test"));

        assert_eq!(
            mapping.dn_by_username("gunslinger").as_deref(),
            Some("uid=roland,dc=test")
        );
        assert_eq!(mapping.stable_id_by_dn("uid=roland,dc=test"), Some(id));
        assert_eq!(
            mapping.username_by_stable_id(id).as_deref(),
            Some("gunslinger")
        );
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_dn_lookup_is_case_insensitive() {
        let mapping = UserMapping::new();
        let id = StableId::new();
        mapping.map(id, "gunslinger", "uid=Roland,DC=Test");

        assert_eq!(mapping.stable_id_by_dn("UID=roland,dc=test"), Some(id));
        assert_eq!(
            mapping.username_by_dn("uid=ROLAND,dc=TEST").as_deref(),
            Some("gunslinger")
        );
    }

    #[test]
    fn test_conflicting_map_is_rejected() {
        let mapping = UserMapping::new();
        let id = StableId::new();
        assert!(mapping.map(id, "gunslinger", "uid=roland,dc=test"));

        assert!(!mapping.map(StableId::new(), "gunslinger", "uid=other,dc=test"));
        assert!(!mapping.map(StableId::new(), "other", "uid=roland,dc=test"));
        assert!(!mapping.map(id, "other", "uid=other,dc=test"));
        assert_eq!(mapping.len(), 1);
        assert_eq!(
            mapping.dn_by_username("gunslinger").as_deref(),
            Some("uid=roland,dc=test")
        );
    }

    #[test]
    fn test_update_dn_keeps_username() {
        let mapping = UserMapping::new();
        let id = StableId::new();
        mapping.map(id, "gunslinger", "uid=roland,ou=old,dc=test");

        assert!(mapping.update_dn(id, "uid=roland,ou=new,dc=test"));
        assert_eq!(
            mapping.dn_by_username("gunslinger").as_deref(),
            Some("uid=roland,ou=new,dc=test")
        );
        assert_eq!(mapping.stable_id_by_dn("uid=roland,ou=old,dc=test"), None);
        assert_eq!(
            mapping.stable_id_by_dn("uid=roland,ou=new,dc=test"),
            Some(id)
        );

        assert!(!mapping.update_dn(StableId::new(), "uid=x,dc=test"));
    }

    #[test]
    fn test_unmap_is_idempotent() {
        let mapping = UserMapping::new();
        let id = StableId::new();
        mapping.map(id, "gunslinger", "uid=roland,dc=test");

        assert!(mapping.unmap("gunslinger"));
        assert!(!mapping.unmap("gunslinger"));
        assert!(mapping.is_empty());
        assert_eq!(mapping.stable_id_by_dn("uid=roland,dc=test"), None);
    }
}

//! Directory access layer.
//!
//! Sits between the backend operations and the raw transport: builds and
//! escapes filters, reads attributes, resolves DNs to internal usernames
//! through the mapping table, and derives usernames for entries seen for
//! the first time.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use dirmap_core::{
    BackendError, BackendResult, DirectoryEntry, DirectoryError, DirectoryResult, StableId,
};

use crate::connection::Connection;
use crate::mapping::UserMapping;

/// Query and resolution operations over one directory connection.
pub struct Access {
    connection: Arc<Connection>,
    mapper: Arc<UserMapping>,
}

/// Escape a value for embedding in a search filter (RFC 4515).
pub fn escape_filter_part(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// AND-combine filters, wrapping bare terms in parentheses.
pub fn combine_filter_with_and(filters: &[String]) -> String {
    let inner: String = filters
        .iter()
        .filter(|f| !f.is_empty())
        .map(|f| {
            if f.starts_with('(') {
                f.clone()
            } else {
                format!("({f})")
            }
        })
        .collect();
    format!("(&{inner})")
}

/// Heuristic for telling DNs apart from usernames: every comma-separated
/// part of a DN carries an `=`.
pub fn string_resembles_dn(value: &str) -> bool {
    if !value.contains('=') {
        return false;
    }
    value.split(',').all(|part| part.contains('='))
}

impl Access {
    pub fn new(connection: Arc<Connection>, mapper: Arc<UserMapping>) -> Self {
        Self { connection, mapper }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn mapper(&self) -> &Arc<UserMapping> {
        &self.mapper
    }

    /// Substring filter matching `search` against the username and display
    /// name attributes; empty search matches everything.
    pub fn filter_for_user_search(&self, search: &str) -> String {
        let settings = self.connection.settings();
        if search.is_empty() {
            return settings.user_filter.clone();
        }

        let term = escape_filter_part(search);
        let mut alternatives = vec![
            format!("({}=*{term}*)", settings.username_attr),
            format!("({}=*{term}*)", settings.display_name_attr),
        ];
        if let Some(attr2) = &settings.display_name_attr_secondary {
            alternatives.push(format!("({attr2}=*{term}*)"));
        }
        let by_name = format!("(|{})", alternatives.concat());

        combine_filter_with_and(&[settings.user_filter.clone(), by_name])
    }

    /// All values of one attribute of an entry, or `None` when the entry is
    /// unreadable or lacks the attribute.
    pub async fn read_attribute(&self, dn: &str, attr: &str) -> Option<Vec<String>> {
        let entry = self.read_entry(dn, attr).await?;
        entry.values(attr).map(|v| v.to_vec())
    }

    /// First binary value of one attribute of an entry.
    pub async fn read_binary_attribute(&self, dn: &str, attr: &str) -> Option<Vec<u8>> {
        let entry = self.read_entry(dn, attr).await?;
        entry.first_binary(attr).map(|v| v.to_vec())
    }

    async fn read_entry(&self, dn: &str, attr: &str) -> Option<DirectoryEntry> {
        let result = self
            .connection
            .client()
            .search(dn, "(objectClass=*)", &[attr.to_string()], Some(1), None)
            .await;
        match result {
            Ok(mut entries) if !entries.is_empty() => Some(entries.remove(0)),
            Ok(_) => None,
            Err(DirectoryError::NoSuchEntry { .. }) => None,
            Err(e) => {
                warn!(dn, attr, error = %e, "attribute read failed");
                None
            }
        }
    }

    /// Run a user search under the configured base.
    pub async fn fetch_list_of_users(
        &self,
        filter: &str,
        attrs: &[String],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let settings = self.connection.settings();
        self.connection
            .client()
            .search(&settings.base_dn, filter, attrs, limit, offset)
            .await
    }

    /// Entries matching the login filter for a raw login name.
    pub async fn fetch_users_by_login_name(
        &self,
        login: &str,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let settings = self.connection.settings();
        let filter = combine_filter_with_and(&[
            settings.user_filter.clone(),
            settings.login_filter_for(&escape_filter_part(login)),
        ]);
        let attrs = vec![settings.username_attr.clone(), settings.uuid_attr.clone()];
        self.fetch_list_of_users(&filter, &attrs, None, None).await
    }

    /// Verify credentials by binding as the entry. Empty passwords are
    /// rejected without contacting the directory; transport faults during
    /// the bind count as a failed check, never an error.
    #[instrument(skip(self, password))]
    pub async fn are_credentials_valid(&self, dn: &str, password: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        match self.connection.client().bind(dn, password).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(dn, error = %e, "credential check failed against directory");
                false
            }
        }
    }

    /// Number of entries matching the user filter, `None` when the
    /// directory cannot be queried.
    pub async fn count_users(&self) -> Option<u64> {
        let settings = self.connection.settings();
        let filter = settings.user_filter.clone();
        match self
            .fetch_list_of_users(&filter, &[settings.uuid_attr.clone()], None, None)
            .await
        {
            Ok(entries) => Some(entries.len() as u64),
            Err(e) => {
                warn!(error = %e, "user count failed");
                None
            }
        }
    }

    /// Change an entry's password, translating directory-side policy
    /// rejections into a policy error the host can show verbatim.
    pub async fn set_password(&self, dn: &str, password: &str) -> BackendResult<bool> {
        match self
            .connection
            .client()
            .modify_password(dn, password)
            .await
        {
            Ok(()) => Ok(true),
            Err(DirectoryError::PasswordPolicy { message, code }) => {
                Err(BackendError::policy_rejected(message, code))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// DN for an internal username: mapping first, then a directory search
    /// on the username attribute.
    pub async fn username_to_dn(&self, username: &str) -> Option<String> {
        if let Some(dn) = self.mapper.dn_by_username(username) {
            return Some(dn);
        }

        let settings = self.connection.settings();
        let filter = combine_filter_with_and(&[
            settings.user_filter.clone(),
            format!(
                "({}={})",
                settings.username_attr,
                escape_filter_part(username)
            ),
        ]);
        let attrs = vec![settings.username_attr.clone(), settings.uuid_attr.clone()];
        let entries = self
            .fetch_list_of_users(&filter, &attrs, Some(1), None)
            .await
            .ok()?;
        let entry = entries.first()?;
        self.register_entry(entry).await?;
        Some(entry.dn.clone())
    }

    /// Internal username for a DN.
    ///
    /// Known DNs come straight from the mapping. Otherwise the entry's
    /// stable id decides: a known id under a new DN is a rename and the
    /// mapping is refreshed; an unknown id gets a fresh username derived
    /// from the configured attribute.
    #[instrument(skip(self))]
    pub async fn dn_to_username(&self, dn: &str) -> Option<String> {
        if let Some(username) = self.mapper.username_by_dn(dn) {
            return Some(username);
        }

        let settings = self.connection.settings();
        let attrs = vec![settings.username_attr.clone(), settings.uuid_attr.clone()];
        let entry = {
            let mut entries = self
                .connection
                .client()
                .search(dn, "(objectClass=*)", &attrs, Some(1), None)
                .await
                .ok()?;
            if entries.is_empty() {
                return None;
            }
            entries.remove(0)
        };

        let stable_id = self.stable_id_of(&entry)?;

        if let Some(username) = self.mapper.username_by_stable_id(stable_id) {
            // Same entry under a new DN: refresh and keep the username.
            self.mapper.update_dn(stable_id, &entry.dn);
            debug!(username, dn, "entry rename detected, mapping refreshed");
            return Some(username);
        }

        let username = self.derive_username(&entry)?;
        if !self.mapper.map(stable_id, &username, &entry.dn) {
            warn!(dn, username, "mapping registration failed");
            return None;
        }
        Some(username)
    }

    /// Current DN of the entry carrying a stable id, straight from the
    /// directory.
    pub async fn get_user_dn_by_stable_id(&self, stable_id: StableId) -> Option<String> {
        let settings = self.connection.settings();
        let filter = format!(
            "({}={})",
            settings.uuid_attr,
            escape_filter_part(&stable_id.to_string())
        );
        let entries = self
            .fetch_list_of_users(&filter, &[settings.uuid_attr.clone()], Some(1), None)
            .await
            .ok()?;
        entries.first().map(|e| e.dn.clone())
    }

    /// Resolve search results to usernames, dropping entries that cannot
    /// be resolved.
    pub async fn resolve_to_usernames(&self, entries: &[DirectoryEntry]) -> Vec<String> {
        let mut usernames = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(username) = self.resolve_entry(entry).await {
                usernames.push(username);
            } else {
                debug!(dn = %entry.dn, "search result skipped, no username");
            }
        }
        usernames
    }

    async fn resolve_entry(&self, entry: &DirectoryEntry) -> Option<String> {
        if let Some(username) = self.mapper.username_by_dn(&entry.dn) {
            return Some(username);
        }
        if self.register_entry(entry).await.is_some() {
            return self.mapper.username_by_dn(&entry.dn);
        }
        self.dn_to_username(&entry.dn).await
    }

    /// Map an already-fetched entry, provided it carries the attributes
    /// needed. Returns the username on success.
    async fn register_entry(&self, entry: &DirectoryEntry) -> Option<String> {
        if let Some(username) = self.mapper.username_by_dn(&entry.dn) {
            return Some(username);
        }
        let stable_id = self.stable_id_of(entry)?;
        if let Some(username) = self.mapper.username_by_stable_id(stable_id) {
            self.mapper.update_dn(stable_id, &entry.dn);
            return Some(username);
        }
        let username = self.derive_username(entry)?;
        self.mapper
            .map(stable_id, &username, &entry.dn)
            .then_some(username)
    }

    fn stable_id_of(&self, entry: &DirectoryEntry) -> Option<StableId> {
        let settings = self.connection.settings();
        let raw = entry.first(&settings.uuid_attr)?;
        match StableId::parse(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(dn = %entry.dn, raw, error = %e, "unparseable stable identifier");
                None
            }
        }
    }

    /// Derive an internal username from the configured attribute,
    /// sanitized and made unique against the mapping.
    fn derive_username(&self, entry: &DirectoryEntry) -> Option<String> {
        let settings = self.connection.settings();
        let raw = entry.first(&settings.username_attr)?;
        let base = sanitize_username(raw)?;

        if !self.mapper.has_username(&base) {
            return Some(base);
        }
        for n in 2..10_000u32 {
            let candidate = format!("{base}_{n}");
            if !self.mapper.has_username(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Restrict a raw attribute value to username-safe characters.
fn sanitize_username(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_part() {
        assert_eq!(escape_filter_part("plain"), "plain");
        assert_eq!(escape_filter_part("a*b"), "a\\2ab");
        assert_eq!(escape_filter_part("(uid=x)"), "\\28uid=x\\29");
        assert_eq!(escape_filter_part("back\\slash"), "back\\5cslash");
        assert_eq!(escape_filter_part("nul\0byte"), "nul\\00byte");
    }

    #[test]
    fn test_combine_filter_with_and() {
        assert_eq!(
            combine_filter_with_and(&[
                "(objectClass=person)".to_string(),
                "uid=roland".to_string()
            ]),
            "(&(objectClass=person)(uid=roland))"
        );
        assert_eq!(
            combine_filter_with_and(&["(a=1)".to_string(), String::new()]),
            "(&(a=1))"
        );
    }

    #[test]
    fn test_string_resembles_dn() {
        assert!(string_resembles_dn("uid=roland,ou=users,dc=test"));
        assert!(string_resembles_dn("cn=admin"));
        assert!(!string_resembles_dn("gunslinger"));
        assert!(!string_resembles_dn("uid=roland,users"));
    }

    #[test]
    fn test_sanitize_username() {
        assert_eq!(sanitize_username("roland").as_deref(), Some("roland"));
        assert_eq!(
            sanitize_username("roland deschain!").as_deref(),
            Some("rolanddeschain")
        );
        assert_eq!(
            sanitize_username("r.o-l_a@nd").as_deref(),
            Some("r.o-l_a@nd")
        );
        assert_eq!(sanitize_username("  !! "), None);
    }
}

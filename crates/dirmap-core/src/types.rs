//! Shared types for directory results and caching.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory-assigned identifier that stays invariant across entry renames.
///
/// Anchors identity persistence: every mapping record is keyed by a
/// `StableId`, never by the (mutable) DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    /// Create a new random StableId (used by fakes and tests).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a StableId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from the string form a directory serves (e.g. `entryUUID`).
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for StableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StableId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for StableId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<StableId> for Uuid {
    fn from(id: StableId) -> Self {
        id.0
    }
}

/// A raw directory search result: the entry's DN plus its attribute values.
///
/// Attribute names are compared case-insensitively on lookup, matching
/// directory semantics; the map keeps whatever casing the server returned.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,

    /// String-valued attributes.
    pub attrs: HashMap<String, Vec<String>>,

    /// Binary-valued attributes (e.g. photos).
    pub bin_attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    /// Create an entry with the given DN and no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
            bin_attrs: HashMap::new(),
        }
    }

    /// Add a string attribute (builder style).
    pub fn with_attr(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.attrs
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Add a binary attribute (builder style).
    pub fn with_bin_attr(mut self, name: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        self.bin_attrs.insert(name.into(), values);
        self
    }

    /// All values of an attribute, matched case-insensitively.
    pub fn values(&self, attr: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .map(|(_, values)| values.as_slice())
    }

    /// First value of an attribute, matched case-insensitively.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr).and_then(|v| v.first()).map(String::as_str)
    }

    /// First binary value of an attribute, matched case-insensitively.
    pub fn first_binary(&self, attr: &str) -> Option<&[u8]> {
        self.bin_attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .and_then(|(_, values)| values.first())
            .map(Vec::as_slice)
    }
}

/// A value held in the per-connection result cache.
///
/// The cache distinguishes a stored negative (`Bool(false)`) from a miss
/// (`None` from the lookup), so negative results can be cached like any
/// other value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl CacheValue {
    /// The boolean value, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CacheValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The text value, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CacheValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The list value, if this is a `List`.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            CacheValue::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        CacheValue::Bool(b)
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Text(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_roundtrip() {
        let id = StableId::new();
        let parsed = StableId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_stable_id_rejects_garbage() {
        assert!(StableId::parse("not-a-uuid").is_err());
        assert!(StableId::parse("").is_err());
    }

    #[test]
    fn test_entry_attribute_lookup_is_case_insensitive() {
        let entry = DirectoryEntry::new("uid=roland,dc=test")
            .with_attr("displayName", ["Roland Deschain"]);

        assert_eq!(entry.first("displayname"), Some("Roland Deschain"));
        assert_eq!(entry.first("DISPLAYNAME"), Some("Roland Deschain"));
        assert_eq!(entry.first("mail"), None);
    }

    #[test]
    fn test_entry_binary_attribute() {
        let entry = DirectoryEntry::new("uid=roland,dc=test")
            .with_bin_attr("jpegPhoto", vec![vec![0xff, 0xd8, 0xff]]);

        assert_eq!(entry.first_binary("jpegphoto"), Some(&[0xff, 0xd8, 0xff][..]));
        assert_eq!(entry.first_binary("thumbnailPhoto"), None);
    }

    #[test]
    fn test_cache_value_negative_is_not_a_miss() {
        let cached = CacheValue::Bool(false);
        assert_eq!(cached.as_bool(), Some(false));
        assert_eq!(cached.as_text(), None);
    }

    #[test]
    fn test_cache_value_conversions() {
        assert_eq!(CacheValue::from("alice").as_text(), Some("alice"));
        assert_eq!(CacheValue::from(true).as_bool(), Some(true));
    }
}

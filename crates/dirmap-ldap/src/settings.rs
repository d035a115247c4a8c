//! Backend settings.
//!
//! Configuration is read once from the host's [`ConfigSource`] into an
//! explicit, validated struct. There is no by-name attribute access at
//! runtime; every key the backend understands is enumerated in [`keys`]
//! and checked at load time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dirmap_core::ConfigSource;

/// Configuration keys understood by the settings loader.
pub mod keys {
    /// Search base for all user operations (required).
    pub const BASE_DN: &str = "base_dn";
    /// Filter selecting user entries.
    pub const USER_FILTER: &str = "user_filter";
    /// Login filter template; `%uid` is replaced by the escaped login name.
    pub const LOGIN_FILTER: &str = "login_filter";
    /// Attribute holding the display name.
    pub const DISPLAY_NAME_ATTR: &str = "display_name_attr";
    /// Optional secondary attribute appended in parentheses.
    pub const DISPLAY_NAME_ATTR_SECONDARY: &str = "display_name_attr_secondary";
    /// Attribute internal usernames are derived from.
    pub const USERNAME_ATTR: &str = "username_attr";
    /// Attribute carrying the directory's stable identifier.
    pub const UUID_ATTR: &str = "uuid_attr";
    /// Avatar rule: `default`, `none`, or `data:ATTRIBUTE`.
    pub const AVATAR_RULE: &str = "avatar_rule";
    /// Whether directory-side password changes are allowed (`1`/`0`).
    pub const PASSWORD_CHANGE_ENABLED: &str = "password_change_enabled";
    /// Home folder rule: empty for the host default, or `attr:ATTRIBUTE`.
    pub const HOME_FOLDER_RULE: &str = "home_folder_rule";
    /// Base directory relative home paths are joined under.
    pub const BASE_DATA_DIR: &str = "base_data_dir";
}

const LOGIN_PLACEHOLDER: &str = "%uid";

/// Error raised when configuration is missing or malformed.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required setting '{key}'")]
    Missing { key: &'static str },

    #[error("invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Where avatar image data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvatarRule {
    /// Standard photo attributes (`jpegPhoto`, then `thumbnailPhoto`).
    Default,
    /// A specific attribute named by the administrator.
    Data(String),
    /// The directory provides no avatars.
    None,
}

impl AvatarRule {
    fn parse(raw: &str) -> Result<Self, SettingsError> {
        match raw {
            "" | "default" => Ok(AvatarRule::Default),
            "none" => Ok(AvatarRule::None),
            other => match other.strip_prefix("data:") {
                Some(attr) if !attr.is_empty() => Ok(AvatarRule::Data(attr.to_string())),
                _ => Err(SettingsError::Invalid {
                    key: keys::AVATAR_RULE,
                    message: format!("expected 'default', 'none' or 'data:ATTRIBUTE', got '{other}'"),
                }),
            },
        }
    }
}

/// How a user's home path is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HomeFolderRule {
    /// The host applies its own default; the backend reports no path.
    HostDefault,
    /// Read the named attribute; absolute values are used as-is, relative
    /// values are joined under the base data directory.
    Attribute(String),
}

impl HomeFolderRule {
    fn parse(raw: &str) -> Result<Self, SettingsError> {
        if raw.is_empty() {
            return Ok(HomeFolderRule::HostDefault);
        }
        match raw.strip_prefix("attr:") {
            Some(attr) if !attr.is_empty() => Ok(HomeFolderRule::Attribute(attr.to_string())),
            _ => Err(SettingsError::Invalid {
                key: keys::HOME_FOLDER_RULE,
                message: format!("expected '' or 'attr:ATTRIBUTE', got '{raw}'"),
            }),
        }
    }
}

/// Validated per-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub base_dn: String,
    pub user_filter: String,
    pub login_filter: String,
    pub display_name_attr: String,
    pub display_name_attr_secondary: Option<String>,
    pub username_attr: String,
    pub uuid_attr: String,
    pub avatar_rule: AvatarRule,
    pub password_change_enabled: bool,
    pub home_folder_rule: HomeFolderRule,
    pub base_data_dir: PathBuf,
}

impl Settings {
    /// Load and validate settings from a configuration source.
    pub fn load(source: &dyn ConfigSource) -> Result<Self, SettingsError> {
        let base_dn = source
            .value(keys::BASE_DN)
            .filter(|v| !v.is_empty())
            .ok_or(SettingsError::Missing { key: keys::BASE_DN })?;

        let login_filter = source
            .value(keys::LOGIN_FILTER)
            .unwrap_or_else(|| format!("(uid={LOGIN_PLACEHOLDER})"));
        if !login_filter.contains(LOGIN_PLACEHOLDER) {
            return Err(SettingsError::Invalid {
                key: keys::LOGIN_FILTER,
                message: format!("template must contain '{LOGIN_PLACEHOLDER}'"),
            });
        }

        let avatar_rule = AvatarRule::parse(&source.value(keys::AVATAR_RULE).unwrap_or_default())?;
        let home_folder_rule =
            HomeFolderRule::parse(&source.value(keys::HOME_FOLDER_RULE).unwrap_or_default())?;

        let password_change_enabled = match source
            .value(keys::PASSWORD_CHANGE_ENABLED)
            .as_deref()
            .unwrap_or("0")
        {
            "1" | "true" => true,
            "0" | "false" | "" => false,
            other => {
                return Err(SettingsError::Invalid {
                    key: keys::PASSWORD_CHANGE_ENABLED,
                    message: format!("expected '0' or '1', got '{other}'"),
                })
            }
        };

        Ok(Self {
            base_dn,
            user_filter: source
                .value(keys::USER_FILTER)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "(objectClass=inetOrgPerson)".to_string()),
            login_filter,
            display_name_attr: source
                .value(keys::DISPLAY_NAME_ATTR)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "displayName".to_string()),
            display_name_attr_secondary: source
                .value(keys::DISPLAY_NAME_ATTR_SECONDARY)
                .filter(|v| !v.is_empty()),
            username_attr: source
                .value(keys::USERNAME_ATTR)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "uid".to_string()),
            uuid_attr: source
                .value(keys::UUID_ATTR)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "entryUUID".to_string()),
            avatar_rule,
            password_change_enabled,
            home_folder_rule,
            base_data_dir: source
                .value(keys::BASE_DATA_DIR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/srv/data")),
        })
    }

    /// Substitute a (pre-escaped) login name into the login filter template.
    pub fn login_filter_for(&self, escaped_login: &str) -> String {
        self.login_filter.replace(LOGIN_PLACEHOLDER, escaped_login)
    }
}

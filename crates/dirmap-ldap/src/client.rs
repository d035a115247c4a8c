//! ldap3-backed implementation of the directory transport.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use dirmap_core::{DirectoryClient, DirectoryEntry, DirectoryError, DirectoryResult};

const RC_SUCCESS: u32 = 0;
const RC_CONSTRAINT_VIOLATION: u32 = 19;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Connection parameters for [`Ldap3Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full server URL, e.g. `ldap://directory.example.com:389`.
    pub url: String,
    /// DN the service account binds as.
    pub bind_dn: String,
    /// Service account password.
    pub bind_password: String,
    /// Connect timeout.
    pub timeout: Duration,
}

/// Directory transport backed by `ldap3`.
///
/// Holds one lazily established, service-bound connection for searches and
/// modifications. Credential checks bind on a throwaway connection so the
/// service bind is never disturbed.
pub struct Ldap3Client {
    config: ClientConfig,
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl Ldap3Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the service connection, creating and binding it if necessary.
    async fn get_connection(&self) -> DirectoryResult<Ldap> {
        {
            let guard = self.connection.read().await;
            if let Some(ref conn) = *guard {
                return Ok(conn.clone());
            }
        }

        let mut ldap = self.open().await?;

        let result = ldap
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .map_err(|e| {
                DirectoryError::unavailable_with_source(
                    format!("bind failed for {}", self.config.bind_dn),
                    e,
                )
            })?;
        if result.rc != RC_SUCCESS {
            return Err(DirectoryError::unavailable(format!(
                "service bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(url = %self.config.url, "directory connection established");

        {
            let mut guard = self.connection.write().await;
            *guard = Some(ldap.clone());
        }

        Ok(ldap)
    }

    /// Open a raw, unbound connection to the configured server.
    async fn open(&self) -> DirectoryResult<Ldap> {
        debug!(url = %self.config.url, "connecting to directory server");

        let settings = LdapConnSettings::new().set_conn_timeout(self.config.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| {
                DirectoryError::unavailable_with_source(
                    format!("failed to connect to {}", self.config.url),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver error");
            }
        });

        Ok(ldap)
    }

    /// Close the service connection, if one exists. The next call
    /// reconnects lazily.
    pub async fn disconnect(&self) {
        let conn = {
            let mut guard = self.connection.write().await;
            guard.take()
        };
        if let Some(mut ldap) = conn {
            let _ = ldap.unbind().await;
        }
    }
}

#[async_trait]
impl DirectoryClient for Ldap3Client {
    async fn search(
        &self,
        base: &str,
        filter: &str,
        attrs: &[String],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let mut ldap = self.get_connection().await?;

        let (entries, result) = ldap
            .search(base, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| {
                self.connection.try_write().map(|mut g| *g = None).ok();
                DirectoryError::search_failed_with_source(
                    format!("search under '{base}' failed"),
                    e,
                )
            })?
            .success()
            .map_err(|e| match e {
                ldap3::LdapError::LdapResult { result } if result.rc == RC_NO_SUCH_OBJECT => {
                    DirectoryError::NoSuchEntry {
                        dn: base.to_string(),
                    }
                }
                other => DirectoryError::search_failed_with_source(
                    format!("search under '{base}' rejected"),
                    other,
                ),
            })?;

        debug!(base, filter, rc = result.rc, count = entries.len(), "search completed");

        let mut out: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(|raw| {
                let parsed = SearchEntry::construct(raw);
                DirectoryEntry {
                    dn: parsed.dn,
                    attrs: parsed.attrs,
                    bin_attrs: parsed.bin_attrs,
                }
            })
            .collect();

        if let Some(skip) = offset {
            out = out.into_iter().skip(skip).collect();
        }
        if let Some(max) = limit {
            out.truncate(max);
        }
        Ok(out)
    }

    async fn bind(&self, dn: &str, password: &str) -> DirectoryResult<bool> {
        // Throwaway connection: a user bind must not replace the service bind.
        let mut ldap = self.open().await?;

        let result = ldap.simple_bind(dn, password).await.map_err(|e| {
            DirectoryError::unavailable_with_source(format!("bind attempt for {dn} failed"), e)
        })?;
        let _ = ldap.unbind().await;

        match result.rc {
            RC_SUCCESS => Ok(true),
            RC_INVALID_CREDENTIALS => {
                debug!(dn, "bind rejected, invalid credentials");
                Ok(false)
            }
            rc => Err(DirectoryError::unavailable(format!(
                "bind for {dn} failed with code {rc}: {}",
                result.text
            ))),
        }
    }

    async fn modify_password(&self, dn: &str, new_password: &str) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;

        let mods = vec![Mod::Replace(
            "userPassword".to_string(),
            HashSet::from([new_password.to_string()]),
        )];
        let result = ldap.modify(dn, mods).await.map_err(|e| {
            DirectoryError::unavailable_with_source(
                format!("password modification for {dn} failed"),
                e,
            )
        })?;

        match result.rc {
            RC_SUCCESS => Ok(()),
            RC_CONSTRAINT_VIOLATION => Err(DirectoryError::PasswordPolicy {
                message: result.text.clone(),
                code: result.rc,
            }),
            RC_NO_SUCH_OBJECT => Err(DirectoryError::NoSuchEntry { dn: dn.to_string() }),
            rc => Err(DirectoryError::search_failed(format!(
                "password modification for {dn} failed with code {rc}: {}",
                result.text
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_starts_disconnected() {
        let client = Ldap3Client::new(ClientConfig {
            url: "ldap://localhost:389".to_string(),
            bind_dn: "cn=service,dc=test".to_string(),
            bind_password: "secret".to_string(),
            timeout: Duration::from_secs(5),
        });
        assert!(!client.is_connected());
    }
}

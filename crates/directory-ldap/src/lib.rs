//! LDAP adapter for the dirstress connection traits, built on `ldap3`.
//!
//! Every dial, bind and operation is bounded by the run's operation timeout.
//! Result codes are classified through
//! [`AuthError::from_result_code`](directory_client::AuthError::from_result_code)
//! and [`OperationError::from_result_code`](directory_client::OperationError::from_result_code),
//! so `invalidCredentials` (49) and `insufficientAccessRights` (50) reach the
//! engine as distinct variants.

use directory_client::{
    AuthError, DialError, DirectoryConnection, DirectoryConnector, OperationError, SearchEntry,
};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::Duration;
use stress_core::{SearchRequest, SearchScope};
use tracing::debug;

/// Opens plain `ldap://` (or `ldaps://`) connections.
#[derive(Debug, Clone)]
pub struct LdapConnector {
    timeout: Duration,
}

impl LdapConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl DirectoryConnector for LdapConnector {
    type Connection = LdapConnection;

    async fn open(&self, address: &str) -> Result<LdapConnection, DialError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, address)
            .await
            .map_err(|e| DialError::new(address, e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!("LDAP connection driver stopped: {}", e);
            }
        });

        Ok(LdapConnection {
            ldap,
            timeout: self.timeout,
            closed: false,
        })
    }
}

/// One LDAP session.
pub struct LdapConnection {
    ldap: Ldap,
    timeout: Duration,
    closed: bool,
}

impl LdapConnection {
    async fn bounded<T, F>(&self, operation: F) -> Result<T, OperationError>
    where
        F: Future<Output = Result<T, LdapError>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(operation_error),
            Err(_) => Err(OperationError::Timeout),
        }
    }
}

fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::One => Scope::OneLevel,
        SearchScope::Sub => Scope::Subtree,
    }
}

fn auth_error(error: LdapError) -> AuthError {
    match error {
        LdapError::LdapResult { result } => AuthError::from_result_code(result.rc, result.text),
        LdapError::Timeout { .. } => AuthError::Timeout,
        other => AuthError::Transport(other.to_string()),
    }
}

fn operation_error(error: LdapError) -> OperationError {
    match error {
        LdapError::LdapResult { result } => {
            OperationError::from_result_code(result.rc, result.text)
        }
        LdapError::Timeout { .. } => OperationError::Timeout,
        other => OperationError::Transport(other.to_string()),
    }
}

fn into_entry(entry: ldap3::SearchEntry) -> SearchEntry {
    SearchEntry {
        dn: entry.dn,
        attributes: entry.attrs.into_iter().collect::<BTreeMap<_, _>>(),
        binary_attributes: entry.bin_attrs.into_iter().collect::<BTreeMap<_, _>>(),
    }
}

#[async_trait::async_trait]
impl DirectoryConnection for LdapConnection {
    async fn bind(&mut self, dn: &str, secret: &str) -> Result<(), AuthError> {
        let mut ldap = self.ldap.clone();
        let bind = async { ldap.simple_bind(dn, secret).await?.success() };
        match tokio::time::timeout(self.timeout, bind).await {
            Ok(result) => result.map(|_| ()).map_err(auth_error),
            Err(_) => Err(AuthError::Timeout),
        }
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Vec<SearchEntry>, OperationError> {
        let mut ldap = self.ldap.clone();
        let (entries, _) = self
            .bounded(async {
                ldap.search(
                    &request.base_dn,
                    scope(request.scope),
                    &request.filter,
                    request.attributes.clone(),
                )
                .await?
                .success()
            })
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| into_entry(ldap3::SearchEntry::construct(entry)))
            .collect())
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> Result<(), OperationError> {
        let attributes: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
            .collect();
        let mut ldap = self.ldap.clone();
        self.bounded(async { ldap.add(dn, attributes).await?.success() })
            .await
            .map(|_| ())
    }

    async fn delete(&mut self, dn: &str) -> Result<(), OperationError> {
        let mut ldap = self.ldap.clone();
        self.bounded(async { ldap.delete(dn).await?.success() })
            .await
            .map(|_| ())
    }

    async fn close(&mut self) -> Result<(), OperationError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut ldap = self.ldap.clone();
        self.bounded(async { ldap.unbind().await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap3::LdapResult;

    fn ldap_result(rc: u32, text: &str) -> LdapError {
        LdapError::LdapResult {
            result: LdapResult {
                rc,
                matched: String::new(),
                text: text.to_string(),
                refs: Vec::new(),
                ctrls: Vec::new(),
            },
        }
    }

    #[test]
    fn test_invalid_credentials_mapped() {
        assert_eq!(
            auth_error(ldap_result(49, "80090308: LdapErr: DSID-0C09042A")),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            auth_error(ldap_result(53, "unwilling")),
            AuthError::Rejected { code: 53, .. }
        ));
    }

    #[test]
    fn test_insufficient_access_mapped() {
        assert!(operation_error(ldap_result(50, "00002098: SecErr")).is_insufficient_access());
        assert!(matches!(
            operation_error(ldap_result(32, "no such object")),
            OperationError::Rejected { code: 32, .. }
        ));
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(scope(SearchScope::Base), Scope::Base));
        assert!(matches!(scope(SearchScope::One), Scope::OneLevel));
        assert!(matches!(scope(SearchScope::Sub), Scope::Subtree));
    }

    #[tokio::test]
    async fn test_dial_refused_is_dial_error() {
        let connector = LdapConnector::new(Duration::from_millis(500));
        let err = connector.open("ldap://127.0.0.1:1").await.err().unwrap();
        assert_eq!(err.address, "ldap://127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_bad_url_is_dial_error() {
        let connector = LdapConnector::new(Duration::from_millis(500));
        assert!(connector.open("not a url").await.is_err());
    }
}

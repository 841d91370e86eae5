//! In-memory directory for tests and dry runs.
//!
//! [`MemoryDirectory`] implements [`DirectoryConnector`] without any network.
//! Failure behaviour is configured with builder methods and every connection
//! lifecycle event is counted, so tests can assert that each opened
//! connection was closed exactly once.

use crate::connection::{DirectoryConnection, DirectoryConnector, SearchEntry};
use crate::error::{result_code, AuthError, DialError, OperationError};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stress_core::{SearchRequest, SearchScope};

/// Attributes answered with synthetic binary payloads.
const BINARY_ATTRIBUTES: [&str; 4] = [
    "thumbnailPhoto",
    "userCertificate",
    "nTSecurityDescriptor",
    "jpegPhoto",
];

const BINARY_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone, Default)]
struct Behavior {
    users: HashMap<String, String>,
    unreachable: bool,
    read_only: bool,
    failing_searches: bool,
    accept_any_secret: bool,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    closed: AtomicU64,
    close_calls: AtomicU64,
    open_now: AtomicU64,
    peak_open: AtomicU64,
    binds_accepted: AtomicU64,
    binds_rejected: AtomicU64,
    searches: AtomicU64,
    adds: AtomicU64,
    deletes: AtomicU64,
}

/// Snapshot of a [`MemoryDirectory`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub opened: u64,
    /// Connections actually released
    pub closed: u64,
    /// Calls to `close`, including repeated ones
    pub close_calls: u64,
    pub open_now: u64,
    pub peak_open: u64,
    pub binds_accepted: u64,
    pub binds_rejected: u64,
    pub searches: u64,
    pub adds: u64,
    pub deletes: u64,
}

/// A directory server that lives in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    behavior: Arc<Behavior>,
    counters: Arc<Counters>,
    entries: Arc<Mutex<BTreeSet<String>>>,
    search_log: Arc<Mutex<Vec<SearchRequest>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bindable identity.
    pub fn with_user(mut self, dn: impl Into<String>, secret: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.behavior)
            .users
            .insert(dn.into(), secret.into());
        self
    }

    /// Every dial fails.
    pub fn unreachable(mut self) -> Self {
        Arc::make_mut(&mut self.behavior).unreachable = true;
        self
    }

    /// Adds and deletes fail with insufficient access.
    pub fn read_only(mut self) -> Self {
        Arc::make_mut(&mut self.behavior).read_only = true;
        self
    }

    /// Every search is rejected by the server.
    pub fn with_failing_searches(mut self) -> Self {
        Arc::make_mut(&mut self.behavior).failing_searches = true;
        self
    }

    /// Binds succeed whatever the secret.
    pub fn accept_any_secret(mut self) -> Self {
        Arc::make_mut(&mut self.behavior).accept_any_secret = true;
        self
    }

    /// Delay applied to every bind, search, add and delete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.behavior).latency = latency;
        self
    }

    pub fn stats(&self) -> MemoryStats {
        let c = &self.counters;
        MemoryStats {
            opened: c.opened.load(Ordering::SeqCst),
            closed: c.closed.load(Ordering::SeqCst),
            close_calls: c.close_calls.load(Ordering::SeqCst),
            open_now: c.open_now.load(Ordering::SeqCst),
            peak_open: c.peak_open.load(Ordering::SeqCst),
            binds_accepted: c.binds_accepted.load(Ordering::SeqCst),
            binds_rejected: c.binds_rejected.load(Ordering::SeqCst),
            searches: c.searches.load(Ordering::SeqCst),
            adds: c.adds.load(Ordering::SeqCst),
            deletes: c.deletes.load(Ordering::SeqCst),
        }
    }

    /// DNs added through connections and not yet deleted.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).iter().cloned().collect()
    }

    /// Every search request received, in arrival order.
    pub fn search_log(&self) -> Vec<SearchRequest> {
        lock(&self.search_log).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl DirectoryConnector for MemoryDirectory {
    type Connection = MemoryConnection;

    async fn open(&self, address: &str) -> Result<MemoryConnection, DialError> {
        if self.behavior.unreachable {
            return Err(DialError::new(address, "connection refused"));
        }
        let c = &self.counters;
        c.opened.fetch_add(1, Ordering::SeqCst);
        let now = c.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak_open.fetch_max(now, Ordering::SeqCst);

        Ok(MemoryConnection {
            directory: self.clone(),
            bound: false,
            closed: false,
        })
    }
}

/// Connection handed out by [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryConnection {
    directory: MemoryDirectory,
    bound: bool,
    closed: bool,
}

impl MemoryConnection {
    async fn simulate_latency(&self) {
        let latency = self.directory.behavior.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_ready(&self) -> Result<(), OperationError> {
        if self.closed {
            return Err(OperationError::Transport("connection closed".to_string()));
        }
        if !self.bound {
            return Err(OperationError::Rejected {
                code: result_code::OPERATIONS_ERROR,
                message: "a successful bind is required".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), OperationError> {
        self.ensure_ready()?;
        if self.directory.behavior.read_only {
            return Err(OperationError::InsufficientAccess(
                "write access denied".to_string(),
            ));
        }
        Ok(())
    }

    fn entry_for(dn: &str, request: &SearchRequest) -> SearchEntry {
        let cn = dn
            .split(',')
            .next()
            .and_then(|rdn| rdn.split_once('='))
            .map(|(_, value)| value.to_string())
            .unwrap_or_default();
        let mut entry = SearchEntry::new(dn);
        for attribute in &request.attributes {
            if BINARY_ATTRIBUTES.contains(&attribute.as_str()) {
                entry
                    .binary_attributes
                    .insert(attribute.clone(), vec![vec![0u8; BINARY_PAYLOAD_BYTES]]);
            } else if attribute == "cn" {
                entry.attributes.insert(attribute.clone(), vec![cn.clone()]);
            }
        }
        entry
    }
}

#[async_trait::async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn bind(&mut self, dn: &str, secret: &str) -> Result<(), AuthError> {
        if self.closed {
            return Err(AuthError::Transport("connection closed".to_string()));
        }
        self.simulate_latency().await;

        let behavior = &self.directory.behavior;
        let accepted = behavior.accept_any_secret
            || behavior.users.get(dn).is_some_and(|known| known == secret);
        let counters = &self.directory.counters;
        if accepted {
            counters.binds_accepted.fetch_add(1, Ordering::SeqCst);
            self.bound = true;
            Ok(())
        } else {
            counters.binds_rejected.fetch_add(1, Ordering::SeqCst);
            self.bound = false;
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Vec<SearchEntry>, OperationError> {
        self.ensure_ready()?;
        self.simulate_latency().await;
        self.directory
            .counters
            .searches
            .fetch_add(1, Ordering::SeqCst);
        lock(&self.directory.search_log).push(request.clone());

        if self.directory.behavior.failing_searches {
            return Err(OperationError::Rejected {
                code: result_code::UNWILLING_TO_PERFORM,
                message: "search refused".to_string(),
            });
        }

        let entries = match request.scope {
            SearchScope::Base => vec![Self::entry_for(&request.base_dn, request)],
            SearchScope::One | SearchScope::Sub => self
                .directory
                .behavior
                .users
                .keys()
                .filter(|dn| dn.ends_with(&request.base_dn))
                .map(|dn| Self::entry_for(dn, request))
                .collect(),
        };
        Ok(entries)
    }

    async fn add(
        &mut self,
        dn: &str,
        _attributes: &[(String, Vec<String>)],
    ) -> Result<(), OperationError> {
        self.ensure_writable()?;
        self.simulate_latency().await;
        self.directory.counters.adds.fetch_add(1, Ordering::SeqCst);

        if !lock(&self.directory.entries).insert(dn.to_string()) {
            return Err(OperationError::Rejected {
                code: result_code::ENTRY_ALREADY_EXISTS,
                message: format!("{dn} already exists"),
            });
        }
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<(), OperationError> {
        self.ensure_writable()?;
        self.simulate_latency().await;
        self.directory
            .counters
            .deletes
            .fetch_add(1, Ordering::SeqCst);

        if !lock(&self.directory.entries).remove(dn) {
            return Err(OperationError::Rejected {
                code: result_code::NO_SUCH_OBJECT,
                message: format!("{dn} does not exist"),
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), OperationError> {
        let counters = &self.directory.counters;
        counters.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed {
            self.closed = true;
            self.bound = false;
            counters.closed.fetch_add(1, Ordering::SeqCst);
            counters.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "cn=alice,ou=Staff,dc=corp";

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new()
            .with_user(ALICE, "pw")
            .with_user("cn=bob,ou=Staff,dc=corp", "pw2")
    }

    #[tokio::test]
    async fn test_bind_checks_secret() {
        let directory = directory();
        let mut conn = directory.open("ldap://memory").await.unwrap();
        assert_eq!(
            conn.bind(ALICE, "nope").await,
            Err(AuthError::InvalidCredentials)
        );
        conn.bind(ALICE, "pw").await.unwrap();

        let stats = directory.stats();
        assert_eq!(stats.binds_accepted, 1);
        assert_eq!(stats.binds_rejected, 1);
    }

    #[tokio::test]
    async fn test_accept_any_secret() {
        let directory = directory().accept_any_secret();
        let mut conn = directory.open("ldap://memory").await.unwrap();
        conn.bind(ALICE, "WrongPassword123!").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable() {
        let err = directory()
            .unreachable()
            .open("ldap://10.255.255.1:389")
            .await
            .unwrap_err();
        assert_eq!(err.address, "ldap://10.255.255.1:389");
    }

    #[tokio::test]
    async fn test_search_requires_bind() {
        let directory = directory();
        let mut conn = directory.open("ldap://memory").await.unwrap();
        let request = SearchRequest::new("dc=corp", "(cn=*a*)", SearchScope::Sub, &["cn"]);
        assert!(matches!(
            conn.search(&request).await,
            Err(OperationError::Rejected { code: 1, .. })
        ));

        conn.bind(ALICE, "pw").await.unwrap();
        let entries = conn.search(&request).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(directory.search_log().len(), 1);
    }

    #[tokio::test]
    async fn test_binary_attributes_have_payload() {
        let directory = directory();
        let mut conn = directory.open("ldap://memory").await.unwrap();
        conn.bind(ALICE, "pw").await.unwrap();
        let request = SearchRequest::new(
            "dc=corp",
            "(objectClass=user)",
            SearchScope::Sub,
            &["cn", "jpegPhoto"],
        );
        let entries = conn.search(&request).await.unwrap();
        assert!(entries
            .iter()
            .all(|e| e.payload_bytes() > BINARY_PAYLOAD_BYTES));
    }

    #[tokio::test]
    async fn test_add_delete_and_read_only() {
        let directory = directory();
        let mut conn = directory.open("ldap://memory").await.unwrap();
        conn.bind(ALICE, "pw").await.unwrap();
        let dn = "ou=tmp,dc=corp";
        conn.add(dn, &[]).await.unwrap();
        assert_eq!(directory.entries(), vec![dn.to_string()]);
        assert!(conn.add(dn, &[]).await.is_err());
        conn.delete(dn).await.unwrap();
        assert!(directory.entries().is_empty());

        let read_only = self::directory().read_only();
        let mut conn = read_only.open("ldap://memory").await.unwrap();
        conn.bind(ALICE, "pw").await.unwrap();
        assert!(conn.add(dn, &[]).await.unwrap_err().is_insufficient_access());
    }

    #[tokio::test]
    async fn test_open_and_close_counters() {
        let directory = directory();
        let mut a = directory.open("ldap://memory").await.unwrap();
        let mut b = directory.open("ldap://memory").await.unwrap();
        assert_eq!(directory.stats().open_now, 2);

        a.close().await.unwrap();
        a.close().await.unwrap();
        b.close().await.unwrap();

        let stats = directory.stats();
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.closed, 2);
        assert_eq!(stats.close_calls, 3);
        assert_eq!(stats.open_now, 0);
        assert_eq!(stats.peak_open, 2);
    }
}

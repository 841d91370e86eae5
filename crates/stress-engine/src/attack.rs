//! Per-mode operation sequences and their check classification.

use crate::random::RandomSource;
use crate::recorder::{lock, Anomaly, FailureKind};
use directory_client::{DirectoryConnection, SearchEntry};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stress_core::{AttackMode, CheckResult, Credential, RunConfig, SearchRequest, SearchScope};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Matching rule for transitive group membership.
pub const LDAP_MATCHING_RULE_IN_CHAIN: &str = "1.2.840.113556.1.4.1941";

const SEARCH_COMPLEX_ATTRIBUTES: [&str; 3] = ["cn", "mail", "description"];
const TITAN_ATTRIBUTES: [&str; 5] = [
    "cn",
    "thumbnailPhoto",
    "userCertificate",
    "nTSecurityDescriptor",
    "jpegPhoto",
];
const THROWAWAY_PREFIX: &str = "dirstress_";

/// What one iteration's operation sequence produced.
#[derive(Debug, Clone)]
pub struct AttackOutcome {
    /// The single check this iteration records
    pub check: CheckResult,
    pub failure: Option<FailureKind>,
    pub anomaly: Option<Anomaly>,
    /// Write stress fell back to a read for lack of privilege
    pub write_fallback: bool,
    /// Bind plus operation latency
    pub response_time: Duration,
    pub bytes_received: u64,
}

impl AttackOutcome {
    fn passed(mode: AttackMode, started: Instant) -> Self {
        Self {
            check: CheckResult::new(mode.check_name(), true),
            failure: None,
            anomaly: None,
            write_fallback: false,
            response_time: started.elapsed(),
            bytes_received: 0,
        }
    }

    fn failed(mode: AttackMode, failure: Option<FailureKind>, started: Instant) -> Self {
        Self {
            check: CheckResult::new(mode.check_name(), false),
            failure,
            ..Self::passed(mode, started)
        }
    }

    fn with_entries(mut self, entries: &[SearchEntry]) -> Self {
        self.bytes_received = entries.iter().map(|e| e.payload_bytes() as u64).sum();
        self
    }
}

/// A throwaway entry between its add and its delete.
///
/// Dropped without [`PendingEntry::settle`] means the iteration was abandoned
/// mid-write and the entry is still on the server.
struct PendingEntry<'a> {
    dn: &'a str,
    orphaned: &'a Mutex<Vec<String>>,
    settled: bool,
}

impl PendingEntry<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(dn = %self.dn, "Iteration interrupted before its throwaway entry was deleted");
            lock(self.orphaned).push(self.dn.to_string());
        }
    }
}

/// Runs the run's fixed attack mode against one connection.
#[derive(Debug, Clone)]
pub struct AttackDispatcher {
    mode: AttackMode,
    base_dn: String,
    spray_password: String,
    orphaned: Arc<Mutex<Vec<String>>>,
}

impl AttackDispatcher {
    pub fn new(
        mode: AttackMode,
        base_dn: impl Into<String>,
        spray_password: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            base_dn: base_dn.into(),
            spray_password: spray_password.into(),
            orphaned: Arc::default(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.mode, &config.base_dn, &config.spray_password)
    }

    pub fn mode(&self) -> AttackMode {
        self.mode
    }

    /// Throwaway entries whose iteration was interrupted between add and delete.
    pub fn orphaned_entries(&self) -> Vec<String> {
        lock(&self.orphaned).clone()
    }

    /// Wildcard substring search on `cn` around one letter.
    pub fn search_complex_request(&self, letter: char) -> SearchRequest {
        SearchRequest::new(
            &self.base_dn,
            format!("(cn=*{letter}*)"),
            SearchScope::Sub,
            &SEARCH_COMPLEX_ATTRIBUTES,
        )
    }

    fn membership_filter(&self) -> String {
        format!(
            "(&(objectClass=user)(memberOf:{}:={}))",
            LDAP_MATCHING_RULE_IN_CHAIN, self.base_dn
        )
    }

    pub fn membership_request(&self) -> SearchRequest {
        SearchRequest::new(
            &self.base_dn,
            self.membership_filter(),
            SearchScope::Sub,
            &["cn"],
        )
    }

    pub fn titan_request(&self) -> SearchRequest {
        SearchRequest::new(
            &self.base_dn,
            self.membership_filter(),
            SearchScope::Sub,
            &TITAN_ATTRIBUTES,
        )
    }

    /// Harmless read of the bound entry itself.
    pub fn fallback_request(bind_dn: &str) -> SearchRequest {
        SearchRequest::new(bind_dn, "(objectClass=*)", SearchScope::Base, &["description"])
    }

    /// DN and attributes of a throwaway organizational unit under the base.
    pub fn throwaway_entry(&self, token: &str) -> (String, Vec<(String, Vec<String>)>) {
        let ou = format!("{THROWAWAY_PREFIX}{token}");
        let dn = format!("ou={},{}", ou, self.base_dn);
        let attributes = vec![
            (
                "objectClass".to_string(),
                vec!["top".to_string(), "organizationalUnit".to_string()],
            ),
            ("ou".to_string(), vec![ou]),
            (
                "description".to_string(),
                vec!["dirstress throwaway entry".to_string()],
            ),
        ];
        (dn, attributes)
    }

    /// Bind as `credential`, then run the mode's operation sequence.
    ///
    /// Never fails: every fault becomes a failed check on the outcome.
    pub async fn execute<C: DirectoryConnection>(
        &self,
        conn: &mut C,
        credential: &Credential,
        random: &mut RandomSource,
    ) -> AttackOutcome {
        let started = Instant::now();

        if let Err(e) = conn.bind(&credential.dn, &credential.secret).await {
            debug!(mode = %self.mode, dn = %credential.dn, "Bind failed: {}", e);
            return AttackOutcome::failed(self.mode, Some(FailureKind::Auth), started);
        }

        match self.mode {
            AttackMode::SearchComplex => {
                let request = self.search_complex_request(random.lowercase_letter());
                self.search(conn, &request, started).await
            }
            AttackMode::Membership => {
                self.search(conn, &self.membership_request(), started).await
            }
            AttackMode::TitanStress => self.search(conn, &self.titan_request(), started).await,
            AttackMode::WriteStress => {
                self.write_stress(conn, credential, &random.token(), started)
                    .await
            }
            AttackMode::PasswordSpray => self.password_spray(conn, credential, started).await,
            AttackMode::LoginStorm => AttackOutcome::passed(self.mode, started),
        }
    }

    async fn search<C: DirectoryConnection>(
        &self,
        conn: &mut C,
        request: &SearchRequest,
        started: Instant,
    ) -> AttackOutcome {
        match conn.search(request).await {
            Ok(entries) => AttackOutcome::passed(self.mode, started).with_entries(&entries),
            Err(e) => {
                debug!(mode = %self.mode, filter = %request.filter, "Search failed: {}", e);
                AttackOutcome::failed(self.mode, Some(FailureKind::Operation), started)
            }
        }
    }

    async fn write_stress<C: DirectoryConnection>(
        &self,
        conn: &mut C,
        credential: &Credential,
        token: &str,
        started: Instant,
    ) -> AttackOutcome {
        let (dn, attributes) = self.throwaway_entry(token);

        match conn.add(&dn, &attributes).await {
            Ok(()) => {
                let pending = PendingEntry {
                    dn: &dn,
                    orphaned: &self.orphaned,
                    settled: false,
                };
                let deleted = conn.delete(&dn).await;
                pending.settle();
                match deleted {
                    Ok(()) => AttackOutcome::passed(self.mode, started),
                    Err(e) => {
                        warn!("Throwaway entry {} was added but not removed: {}", dn, e);
                        AttackOutcome::failed(self.mode, Some(FailureKind::Operation), started)
                    }
                }
            }
            Err(e) if e.is_insufficient_access() => {
                debug!(dn = %credential.dn, "No write privilege, reading the bound entry instead");
                let request = Self::fallback_request(&credential.dn);
                match conn.search(&request).await {
                    Ok(entries) => {
                        let mut outcome =
                            AttackOutcome::passed(self.mode, started).with_entries(&entries);
                        outcome.write_fallback = true;
                        outcome
                    }
                    Err(e) => {
                        debug!(dn = %credential.dn, "Fallback read failed: {}", e);
                        AttackOutcome::failed(self.mode, Some(FailureKind::Operation), started)
                    }
                }
            }
            Err(e) => {
                debug!(dn = %dn, "Add failed: {}", e);
                AttackOutcome::failed(self.mode, Some(FailureKind::Operation), started)
            }
        }
    }

    async fn password_spray<C: DirectoryConnection>(
        &self,
        conn: &mut C,
        credential: &Credential,
        started: Instant,
    ) -> AttackOutcome {
        match conn.bind(&credential.dn, &self.spray_password).await {
            Err(e) if e.is_rejection() => AttackOutcome::passed(self.mode, started),
            Err(e) => {
                debug!(dn = %credential.dn, "Spray bind did not complete: {}", e);
                AttackOutcome::failed(self.mode, Some(FailureKind::Auth), started)
            }
            Ok(()) => {
                warn!(dn = %credential.dn, "Bind with the spray secret was accepted");
                let mut outcome = AttackOutcome::failed(self.mode, None, started);
                outcome.anomaly = Some(Anomaly::new(
                    self.mode.check_name(),
                    &credential.dn,
                    "bind with a deliberately wrong secret succeeded",
                ));
                outcome
            }
        }
    }
}

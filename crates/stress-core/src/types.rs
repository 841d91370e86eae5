//! Shared value types: attack modes, credentials, search requests and checks.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The operation sequence every iteration of a run executes.
///
/// Resolved once from the run file and fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AttackMode {
    /// Sub-tree wildcard substring search on `cn`.
    SearchComplex,
    /// Create and delete a throwaway entry, falling back to a read without privilege.
    WriteStress,
    /// Transitive group membership search against the base DN.
    Membership,
    /// Bind with a deliberately wrong secret.
    PasswordSpray,
    /// Transitive membership search requesting large binary attributes.
    TitanStress,
    /// Bind only.
    LoginStorm,
}

impl AttackMode {
    pub const ALL: [AttackMode; 6] = [
        AttackMode::SearchComplex,
        AttackMode::WriteStress,
        AttackMode::Membership,
        AttackMode::PasswordSpray,
        AttackMode::TitanStress,
        AttackMode::LoginStorm,
    ];

    /// Name of the single check recorded by each completed iteration.
    pub fn check_name(&self) -> &'static str {
        match self {
            AttackMode::SearchComplex => "search success",
            AttackMode::WriteStress => "write simulation",
            AttackMode::Membership => "recursive search success",
            AttackMode::PasswordSpray => "handled failure",
            AttackMode::TitanStress => "titan success",
            AttackMode::LoginStorm => "bind success",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackMode::SearchComplex => "search-complex",
            AttackMode::WriteStress => "write-stress",
            AttackMode::Membership => "membership",
            AttackMode::PasswordSpray => "password-spray",
            AttackMode::TitanStress => "titan-stress",
            AttackMode::LoginStorm => "login-storm",
        }
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttackMode {
    type Err = ConfigError;

    /// Accepts `search-complex`, `search_complex` and `SEARCH_COMPLEX` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "search-complex" => Ok(AttackMode::SearchComplex),
            "write-stress" => Ok(AttackMode::WriteStress),
            "membership" => Ok(AttackMode::Membership),
            "password-spray" => Ok(AttackMode::PasswordSpray),
            "titan-stress" | "titan" => Ok(AttackMode::TitanStress),
            "login-storm" | "login" => Ok(AttackMode::LoginStorm),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for AttackMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttackMode> for String {
    fn from(mode: AttackMode) -> Self {
        mode.as_str().to_string()
    }
}

/// A bind identity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    /// Distinguished name used for the bind
    pub dn: String,
    /// Bind secret
    pub secret: String,
}

impl Credential {
    pub fn new(dn: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("dn", &self.dn)
            .field("secret", &"***")
            .finish()
    }
}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Base,
    One,
    Sub,
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchScope::Base => write!(f, "base"),
            SearchScope::One => write!(f, "one"),
            SearchScope::Sub => write!(f, "sub"),
        }
    }
}

/// A directory search as issued by the attack modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub filter: String,
    pub scope: SearchScope,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(
        base_dn: impl Into<String>,
        filter: impl Into<String>,
        scope: SearchScope,
        attributes: &[&str],
    ) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter: filter.into(),
            scope,
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Outcome of a named check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(name: &'static str, passed: bool) -> Self {
        Self {
            name,
            passed,
            timestamp: Utc::now(),
        }
    }
}

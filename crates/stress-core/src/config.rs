//! Run configuration.

use crate::duration::serde_str;
use crate::error::ConfigError;
use crate::scenario::{ScenarioConfig, ThinkTime};
use crate::threshold::ThresholdSet;
use crate::types::{AttackMode, Credential};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port used when the target has neither a scheme nor a port.
pub const DEFAULT_LDAP_PORT: u16 = 389;

fn default_spray_password() -> String {
    "WrongPassword123!".to_string()
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Fully resolved configuration for one run.
///
/// Shared read-only by every worker for the life of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Directory server address (`host`, `host:port` or an `ldap://` URL)
    pub target: String,
    /// Search base and parent for throwaway entries
    pub base_dn: String,
    /// Default bind DN
    pub bind_dn: String,
    /// Default bind secret
    #[serde(skip_serializing)]
    pub password: String,
    pub mode: AttackMode,
    /// Optional CSV of `distinguishedName,secret` rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
    /// Seed for every random choice of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Secret used by password-spray binds
    #[serde(default = "default_spray_password", skip_serializing)]
    pub spray_password: String,
    #[serde(default)]
    pub think_time: ThinkTime,
    /// Upper bound for a single dial, bind or operation
    #[serde(default = "default_operation_timeout", with = "serde_str")]
    pub operation_timeout: Duration,
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub thresholds: ThresholdSet,
}

impl RunConfig {
    /// Create a new run configuration with default pacing and no thresholds.
    pub fn new(
        target: impl Into<String>,
        base_dn: impl Into<String>,
        credential: Credential,
        mode: AttackMode,
        scenario: ScenarioConfig,
    ) -> Self {
        Self {
            target: target.into(),
            base_dn: base_dn.into(),
            bind_dn: credential.dn,
            password: credential.secret,
            mode,
            credentials_file: None,
            seed: None,
            spray_password: default_spray_password(),
            think_time: ThinkTime::default(),
            operation_timeout: default_operation_timeout(),
            scenario,
            thresholds: ThresholdSet::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdSet) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    pub fn with_spray_password(mut self, secret: impl Into<String>) -> Self {
        self.spray_password = secret.into();
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Load and validate a run file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a run file from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::Invalid("target must not be empty".to_string()));
        }
        if self.bind_dn.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_dn must not be empty".to_string()));
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "operation_timeout must be greater than zero".to_string(),
            ));
        }
        self.think_time.validate()?;
        self.scenario.validate()
    }

    /// The single credential used when no pool is configured or the pool is empty.
    pub fn default_credential(&self) -> Credential {
        Credential::new(self.bind_dn.clone(), self.password.clone())
    }

    /// Target as an `ldap://host:port` URL.
    pub fn target_url(&self) -> String {
        let target = self.target.trim();
        if target.contains("://") {
            target.to_string()
        } else if target.contains(':') {
            format!("ldap://{target}")
        } else {
            format!("ldap://{target}:{DEFAULT_LDAP_PORT}")
        }
    }
}

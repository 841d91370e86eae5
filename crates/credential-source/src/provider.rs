//! Per-iteration credential selection.

use crate::loader::{read_credentials, CredentialLoadError, LoadedCredentials};
use rand::Rng;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use stress_core::Credential;
use tracing::{info, warn};

/// Where credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// One fixed pair for every iteration
    Single(Credential),
    /// Immutable pool sampled uniformly with replacement
    Pool(Arc<[Credential]>),
}

/// Hands out a credential per iteration.
///
/// Immutable after construction, so a single provider can be shared by every
/// worker; randomness comes from the caller's own generator.
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    source: CredentialSource,
}

impl CredentialProvider {
    pub fn single(credential: Credential) -> Self {
        Self {
            source: CredentialSource::Single(credential),
        }
    }

    /// Build a pool, or a single-credential provider when `credentials` is empty.
    pub fn pool(credentials: Vec<Credential>, default: Credential) -> Self {
        if credentials.is_empty() {
            warn!("Credential pool is empty, using the configured bind credential");
            return Self::single(default);
        }
        Self {
            source: CredentialSource::Pool(credentials.into()),
        }
    }

    /// Load a pool from a CSV file, degrading to `default` if nothing usable is found.
    pub fn from_csv_path<P: AsRef<Path>>(path: P, default: Credential) -> Self {
        let path = path.as_ref();
        let loaded = File::open(path)
            .map_err(CredentialLoadError::from)
            .and_then(|file| read_credentials(file, &default.secret));
        Self::from_load_result(loaded, default, &path.display().to_string())
    }

    /// Load a pool from any CSV reader, degrading to `default` if nothing usable is found.
    pub fn from_csv_reader<R: Read>(reader: R, default: Credential) -> Self {
        let loaded = read_credentials(reader, &default.secret);
        Self::from_load_result(loaded, default, "reader")
    }

    fn from_load_result(
        loaded: Result<LoadedCredentials, CredentialLoadError>,
        default: Credential,
        origin: &str,
    ) -> Self {
        match loaded {
            Ok(loaded) => {
                info!(
                    "Loaded {} credentials from {} ({} blank, {} malformed rows skipped)",
                    loaded.credentials.len(),
                    origin,
                    loaded.skipped_blank,
                    loaded.skipped_malformed
                );
                Self::pool(loaded.credentials, default)
            }
            Err(e) => {
                warn!(
                    "Credential source {} is unusable ({}), using the configured bind credential",
                    origin, e
                );
                Self::single(default)
            }
        }
    }

    /// Pick the credential for one iteration.
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> &Credential {
        match &self.source {
            CredentialSource::Single(credential) => credential,
            CredentialSource::Pool(pool) => &pool[rng.random_range(0..pool.len())],
        }
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn is_pool(&self) -> bool {
        matches!(self.source, CredentialSource::Pool(_))
    }

    /// Number of distinct credentials that can be returned.
    pub fn len(&self) -> usize {
        match &self.source {
            CredentialSource::Single(_) => 1,
            CredentialSource::Pool(pool) => pool.len(),
        }
    }

    /// A provider always holds at least one credential.
    pub fn is_empty(&self) -> bool {
        false
    }
}

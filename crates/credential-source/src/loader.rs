//! CSV credential loading.

use std::io::Read;
use stress_core::Credential;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CredentialLoadError {
    #[error("Failed to open credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read credential CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Rows accepted from a credential source plus what was dropped.
#[derive(Debug, Default)]
pub struct LoadedCredentials {
    pub credentials: Vec<Credential>,
    /// Rows with no content at all
    pub skipped_blank: usize,
    /// Rows without a DN or that could not be decoded
    pub skipped_malformed: usize,
}

/// Read `distinguishedName,secret` rows from CSV.
///
/// The first row is always treated as a header. Rows without a secret, or
/// with an empty one, get `default_secret`. Only I/O failures abort the read;
/// bad rows are counted and skipped.
pub fn read_credentials<R: Read>(
    reader: R,
    default_secret: &str,
) -> Result<LoadedCredentials, CredentialLoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut loaded = LoadedCredentials::default();

    for (row, result) in csv_reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                debug!("Skipping credential row {}: {}", row + 1, e);
                loaded.skipped_malformed += 1;
                continue;
            }
        };

        if record.iter().all(|field| field.is_empty()) {
            loaded.skipped_blank += 1;
            continue;
        }

        let dn = record.get(0).unwrap_or_default();
        if dn.is_empty() {
            debug!("Skipping credential row {}: empty distinguished name", row + 1);
            loaded.skipped_malformed += 1;
            continue;
        }

        let secret = record
            .get(1)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_secret);

        loaded.credentials.push(Credential::new(dn, secret));
    }

    Ok(loaded)
}

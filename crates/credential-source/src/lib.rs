//! Credential selection for dirstress iterations.
//!
//! A run either binds every iteration with one fixed credential or samples a
//! pool loaded once from a CSV file with `distinguishedName,secret` rows.
//! A pool that turns out empty or unreadable falls back to the fixed
//! credential instead of failing the run.

pub mod loader;
pub mod provider;

pub use loader::{read_credentials, CredentialLoadError, LoadedCredentials};
pub use provider::{CredentialProvider, CredentialSource};

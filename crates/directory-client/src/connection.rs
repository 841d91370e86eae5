//! Connector and connection traits.
//!
//! A connector is shared by every worker and opens one connection per
//! iteration. Connections are exclusively owned and never reused, so the
//! connection methods take `&mut self`.

use crate::error::{AuthError, DialError, OperationError};
use std::collections::BTreeMap;
use stress_core::SearchRequest;

/// One entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Values the server returned as raw bytes (photos, certificates, descriptors)
    pub binary_attributes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl SearchEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(name.into(), values);
        self
    }

    /// Approximate payload size, used for the bytes-received tally.
    pub fn payload_bytes(&self) -> usize {
        let text: usize = self
            .attributes
            .iter()
            .map(|(k, vs)| k.len() + vs.iter().map(String::len).sum::<usize>())
            .sum();
        let binary: usize = self
            .binary_attributes
            .iter()
            .map(|(k, vs)| k.len() + vs.iter().map(Vec::len).sum::<usize>())
            .sum();
        self.dn.len() + text + binary
    }
}

/// Opens connections to a directory server.
#[async_trait::async_trait]
pub trait DirectoryConnector: Send + Sync + 'static {
    type Connection: DirectoryConnection;

    /// Dial `address` (an `ldap://host:port` URL).
    async fn open(&self, address: &str) -> Result<Self::Connection, DialError>;
}

/// A single open connection.
#[async_trait::async_trait]
pub trait DirectoryConnection: Send + 'static {
    /// Simple bind. May be called more than once on the same connection.
    async fn bind(&mut self, dn: &str, secret: &str) -> Result<(), AuthError>;

    async fn search(&mut self, request: &SearchRequest)
        -> Result<Vec<SearchEntry>, OperationError>;

    /// Add an entry with the given attribute values.
    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> Result<(), OperationError>;

    async fn delete(&mut self, dn: &str) -> Result<(), OperationError>;

    /// Release the connection.
    ///
    /// Must be idempotent and must tolerate a connection whose bind never
    /// succeeded.
    async fn close(&mut self) -> Result<(), OperationError>;
}

//! Per-phase failures of a directory interaction.

use thiserror::Error;

/// Directory result codes the engine classifies on.
pub mod result_code {
    pub const SUCCESS: u32 = 0;
    pub const OPERATIONS_ERROR: u32 = 1;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    pub const UNWILLING_TO_PERFORM: u32 = 53;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
    pub const OTHER: u32 = 80;
}

/// The target could not be reached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to connect to {address}: {reason}")]
pub struct DialError {
    pub address: String,
    pub reason: String,
}

impl DialError {
    pub fn new(address: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

/// A bind was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Bind rejected with result code {code}: {message}")]
    Rejected { code: u32, message: String },

    #[error("Bind failed: {0}")]
    Transport(String),

    #[error("Bind timed out")]
    Timeout,
}

impl AuthError {
    /// Classify a non-success bind result.
    pub fn from_result_code(code: u32, message: impl Into<String>) -> Self {
        match code {
            result_code::INVALID_CREDENTIALS => AuthError::InvalidCredentials,
            code => AuthError::Rejected {
                code,
                message: message.into(),
            },
        }
    }

    /// True when the server evaluated the credentials and refused them.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::Rejected { .. }
        )
    }
}

/// A search, add or delete failed after a successful bind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Insufficient access rights: {0}")]
    InsufficientAccess(String),

    #[error("Operation rejected with result code {code}: {message}")]
    Rejected { code: u32, message: String },

    #[error("Operation failed: {0}")]
    Transport(String),

    #[error("Operation timed out")]
    Timeout,
}

impl OperationError {
    /// Classify a non-success operation result.
    pub fn from_result_code(code: u32, message: impl Into<String>) -> Self {
        match code {
            result_code::INSUFFICIENT_ACCESS_RIGHTS => {
                OperationError::InsufficientAccess(message.into())
            }
            code => OperationError::Rejected {
                code,
                message: message.into(),
            },
        }
    }

    pub fn is_insufficient_access(&self) -> bool {
        matches!(self, OperationError::InsufficientAccess(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classification() {
        assert_eq!(
            AuthError::from_result_code(49, "80090308: LdapErr"),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            AuthError::from_result_code(53, "unwilling"),
            AuthError::Rejected { code: 53, .. }
        ));
        assert!(AuthError::InvalidCredentials.is_rejection());
        assert!(!AuthError::Transport("reset".into()).is_rejection());
        assert!(!AuthError::Timeout.is_rejection());
    }

    #[test]
    fn test_operation_classification() {
        assert!(OperationError::from_result_code(50, "no write").is_insufficient_access());
        assert!(!OperationError::from_result_code(32, "gone").is_insufficient_access());
        assert_eq!(
            OperationError::from_result_code(68, "exists").to_string(),
            "Operation rejected with result code 68: exists"
        );
    }

    #[test]
    fn test_dial_error_display() {
        let err = DialError::new("ldap://10.0.0.5:389", "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to connect to ldap://10.0.0.5:389: connection refused"
        );
    }
}

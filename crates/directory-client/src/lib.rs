//! Directory connection seam for dirstress.
//!
//! The engine never speaks the directory protocol itself. It drives a
//! [`DirectoryConnector`] that opens [`DirectoryConnection`]s, and wraps every
//! connection in a [`ConnectionGuard`] so that close runs exactly once on
//! every exit path of an iteration.
//!
//! The [`testing`] module provides an in-memory directory used by the engine
//! tests and by `dirstress run --dry-run`.

pub mod connection;
pub mod error;
pub mod guard;
pub mod testing;

pub use connection::{DirectoryConnection, DirectoryConnector, SearchEntry};
pub use error::{result_code, AuthError, DialError, OperationError};
pub use guard::ConnectionGuard;

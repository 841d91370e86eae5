//! Scoped ownership of one iteration's connection.

use crate::connection::DirectoryConnection;
use tracing::{debug, warn};

/// Owns a connection for the length of one iteration and guarantees that
/// `close` runs exactly once.
///
/// The normal path calls [`ConnectionGuard::close`] at the end of the
/// iteration. If the guard is dropped while still holding the connection
/// (the iteration future was cancelled or panicked), the close is spawned on
/// the current tokio runtime instead.
pub struct ConnectionGuard<C: DirectoryConnection> {
    conn: Option<C>,
}

impl<C: DirectoryConnection> ConnectionGuard<C> {
    pub fn new(conn: C) -> Self {
        Self { conn: Some(conn) }
    }

    /// The guarded connection, or `None` once it has been closed.
    pub fn connection(&mut self) -> Option<&mut C> {
        self.conn.as_mut()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Close the connection. Later calls are no-ops.
    ///
    /// Close errors are logged and swallowed; the caller has nothing useful
    /// to do with them.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!("Error closing directory connection: {}", e);
            }
        }
    }
}

impl<C: DirectoryConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        debug!("Error closing dropped directory connection: {}", e);
                    }
                });
            }
            Err(_) => warn!("Directory connection dropped outside a runtime without close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DirectoryConnector;
    use crate::testing::MemoryDirectory;
    use std::time::Duration;
    use stress_core::{SearchRequest, SearchScope};

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let directory = MemoryDirectory::new();
        let conn = directory.open("ldap://memory").await.unwrap();
        let mut guard = ConnectionGuard::new(conn);

        guard.close().await;
        guard.close().await;
        drop(guard);

        let stats = directory.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.close_calls, 1);
    }

    #[tokio::test]
    async fn test_close_after_failed_bind_and_operation() {
        let directory = MemoryDirectory::new()
            .with_user("cn=alice,dc=corp", "pw")
            .with_failing_searches();
        let conn = directory.open("ldap://memory").await.unwrap();
        let mut guard = ConnectionGuard::new(conn);

        let conn = guard.connection().unwrap();
        assert!(conn.bind("cn=alice,dc=corp", "wrong").await.is_err());
        let request = SearchRequest::new("dc=corp", "(cn=*a*)", SearchScope::Sub, &["cn"]);
        assert!(conn.search(&request).await.is_err());

        guard.close().await;
        assert!(guard.is_closed());
        assert!(guard.connection().is_none());
        assert_eq!(directory.stats().close_calls, 1);
    }

    #[tokio::test]
    async fn test_drop_schedules_close() {
        let directory = MemoryDirectory::new();
        let conn = directory.open("ldap://memory").await.unwrap();
        drop(ConnectionGuard::new(conn));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(directory.stats().closed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_iteration_still_closes() {
        let directory = MemoryDirectory::new()
            .with_user("cn=alice,dc=corp", "pw")
            .with_latency(Duration::from_secs(60));
        let conn = directory.open("ldap://memory").await.unwrap();

        let task = tokio::spawn(async move {
            let mut guard = ConnectionGuard::new(conn);
            if let Some(conn) = guard.connection() {
                let _ = conn.bind("cn=alice,dc=corp", "pw").await;
            }
            guard.close().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.abort();
        let _ = task.await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        let stats = directory.stats();
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.close_calls, 1);
    }
}

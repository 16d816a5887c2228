use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// A physical database connection as seen by the propagation core.
///
/// Implementations are provided for SQLx MySQL connections in
/// [`crate::mysql`]; any other driver can be plugged in by implementing this
/// trait and [`ConnectionProvider`].
///
/// The savepoint operations have default implementations issuing the
/// standard `SAVEPOINT`, `RELEASE SAVEPOINT` and `ROLLBACK TO SAVEPOINT`
/// statements through [`Connection::execute`].
#[async_trait]
pub trait Connection: Send + 'static {
    /// Executes a statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str) -> crate::Result<u64>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> crate::Result<()>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> crate::Result<()>;

    /// Switches auto-commit mode.
    async fn set_auto_commit(&mut self, auto_commit: bool) -> crate::Result<()>;

    /// Releases the connection back to wherever it came from.
    async fn close(&mut self) -> crate::Result<()>;

    async fn set_savepoint(&mut self, name: &str) -> crate::Result<()> {
        self.execute(&format!("SAVEPOINT {name}")).await.map(drop)
    }

    async fn release_savepoint(&mut self, name: &str) -> crate::Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT {name}")).await.map(drop)
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> crate::Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .await
            .map(drop)
    }

    /// Capability query: the concrete type behind this trait object.
    ///
    /// Wrappers decide what they expose here; see
    /// [`crate::binding::SuppressedConnection`].
    fn as_any(&self) -> &dyn Any;
}

/// Source of physical connections, typically a pool.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquires a connection.
    async fn get_connection(&self) -> crate::Result<Box<dyn Connection>>;

    /// Acquires a connection authenticated with explicit credentials.
    async fn get_connection_as(
        &self,
        _user: &str,
        _password: &str,
    ) -> crate::Result<Box<dyn Connection>> {
        Err(crate::Error::Unsupported("credential-based connection acquisition"))
    }
}

/// Cloneable handle to one physical connection.
///
/// Every clone refers to the same connection; [`SharedConnection::ptr_eq`]
/// tells whether two handles do.
#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Box<dyn Connection>>>,
}

impl SharedConnection {
    /// Takes ownership of `connection`.
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Locks the connection for the duration of one operation.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.inner.lock().await
    }

    /// Returns true if both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &SharedConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("handle", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

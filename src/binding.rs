use crate::connection::{Connection, ConnectionProvider, SharedConnection};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, trace};

/// Connection binding for one thread of execution.
///
/// While a connection is bound and the suspension counter is zero,
/// [`BindingDataSource`] hands out suppressed views of the bound connection
/// instead of acquiring new ones. Only transactional units touch this state.
#[derive(Debug, Default)]
pub struct BindingState {
    bound: Option<SharedConnection>,
    suspend_level: usize,
}

impl BindingState {
    /// Creates an empty state: nothing bound, not suspended.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `connection`, returning the connection it displaced.
    pub fn bind(&mut self, connection: SharedConnection) -> Option<SharedConnection> {
        self.bound.replace(connection)
    }

    /// Removes the binding, returning the connection that was bound.
    pub fn unbind(&mut self) -> Option<SharedConnection> {
        self.bound.take()
    }

    /// Temporarily hides the bound connection. Nests.
    pub fn suspend(&mut self) {
        self.suspend_level += 1;
    }

    /// Undoes one [`BindingState::suspend`]. Resuming at level zero does nothing.
    pub fn resume(&mut self) {
        self.suspend_level = self.suspend_level.saturating_sub(1);
    }

    /// Whether the bound connection is currently hidden from new sessions.
    pub fn is_suspended(&self) -> bool {
        self.suspend_level > 0
    }

    /// Number of [`BindingState::suspend`] calls not yet resumed.
    pub fn suspend_level(&self) -> usize {
        self.suspend_level
    }

    /// The bound connection, whether or not it is currently hidden.
    pub fn bound(&self) -> Option<&SharedConnection> {
        self.bound.as_ref()
    }

    /// The connection new sessions will share, if any.
    pub fn visible(&self) -> Option<&SharedConnection> {
        if self.is_suspended() {
            None
        } else {
            self.bound.as_ref()
        }
    }
}

/// Wraps a [`ConnectionProvider`] so that sessions opened while a connection
/// is bound share it.
#[derive(Clone)]
pub struct BindingDataSource {
    delegate: Arc<dyn ConnectionProvider>,
}

impl BindingDataSource {
    /// Wraps `delegate`, which supplies connections when nothing is bound.
    pub fn new(delegate: Arc<dyn ConnectionProvider>) -> Self {
        Self { delegate }
    }

    /// Returns a suppressed view of the bound connection, or a new connection
    /// from the wrapped provider when nothing is visible.
    pub async fn get_connection(&self, state: &BindingState) -> crate::Result<SharedConnection> {
        if let Some(bound) = state.visible() {
            debug!("returning bound suppressed connection");
            return Ok(SuppressedConnection::wrap(bound));
        }
        debug!(suspended = state.is_suspended(), "returning delegate connection");
        Ok(SharedConnection::new(self.delegate.get_connection().await?))
    }

    /// Credential-based variant of [`BindingDataSource::get_connection`].
    pub async fn get_connection_as(
        &self,
        state: &BindingState,
        user: &str,
        password: &str,
    ) -> crate::Result<SharedConnection> {
        if let Some(bound) = state.visible() {
            debug!(user, "returning bound suppressed connection");
            return Ok(SuppressedConnection::wrap(bound));
        }
        debug!(user, suspended = state.is_suspended(), "returning delegate connection");
        Ok(SharedConnection::new(
            self.delegate.get_connection_as(user, password).await?,
        ))
    }
}

/// View of a bound connection that cannot end its transaction.
///
/// `commit`, `rollback`, `close` and `set_auto_commit` do nothing; every other
/// operation goes to the bound connection. [`Connection::as_any`] reports the
/// proxy itself, so the bound connection cannot be recovered by downcasting.
pub struct SuppressedConnection {
    target: SharedConnection,
}

impl SuppressedConnection {
    fn wrap(target: &SharedConnection) -> SharedConnection {
        SharedConnection::new(Box::new(Self {
            target: target.clone(),
        }))
    }
}

#[async_trait]
impl Connection for SuppressedConnection {
    async fn execute(&mut self, sql: &str) -> crate::Result<u64> {
        self.target.lock().await.execute(sql).await
    }

    async fn commit(&mut self) -> crate::Result<()> {
        trace!("suppressed commit");
        Ok(())
    }

    async fn rollback(&mut self) -> crate::Result<()> {
        trace!("suppressed rollback");
        Ok(())
    }

    async fn set_auto_commit(&mut self, _auto_commit: bool) -> crate::Result<()> {
        trace!("suppressed auto-commit change");
        Ok(())
    }

    async fn close(&mut self) -> crate::Result<()> {
        trace!("suppressed close");
        Ok(())
    }

    async fn set_savepoint(&mut self, name: &str) -> crate::Result<()> {
        self.target.lock().await.set_savepoint(name).await
    }

    async fn release_savepoint(&mut self, name: &str) -> crate::Result<()> {
        self.target.lock().await.release_savepoint(name).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> crate::Result<()> {
        self.target.lock().await.rollback_to_savepoint(name).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

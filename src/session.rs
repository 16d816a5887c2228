use crate::binding::{BindingDataSource, BindingState};
use crate::connection::{ConnectionProvider, SharedConnection};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// A database session over one connection.
///
/// Sessions opened while a transaction is active share the transaction's
/// connection through a suppressed view, so their `commit`, `rollback` and
/// `close` leave the transaction alone. Only the session owned by the
/// transactional unit really ends it.
pub struct Session {
    connection: SharedConnection,
    auto_commit: bool,
    closed: bool,
}

impl Session {
    pub(crate) async fn open(connection: SharedConnection, auto_commit: bool) -> Result<Self> {
        connection.lock().await.set_auto_commit(auto_commit).await?;
        Ok(Self {
            connection,
            auto_commit,
            closed: false,
        })
    }

    /// The connection this session runs on.
    pub fn connection(&self) -> &SharedConnection {
        &self.connection
    }

    /// Whether the session was opened in auto-commit mode.
    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Whether [`Session::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Executes a statement and returns the number of affected rows.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        self.connection.lock().await.execute(sql).await
    }

    /// Commits the session's work. Does nothing in auto-commit mode.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.auto_commit {
            return Ok(());
        }
        self.connection.lock().await.commit().await
    }

    /// Rolls back the session's work. Does nothing in auto-commit mode.
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.auto_commit {
            return Ok(());
        }
        self.connection.lock().await.rollback().await
    }

    /// Closes the session and its connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connection.lock().await.close().await
    }

    /// Creates a savepoint called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] on a closed session, or the
    /// connection's error if the statement fails.
    pub async fn set_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.connection.lock().await.set_savepoint(name).await
    }

    /// Releases the savepoint called `name`, keeping the work done since.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] on a closed session, or the
    /// connection's error if the savepoint does not exist.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.connection.lock().await.release_savepoint(name).await
    }

    /// Undoes the work done since the savepoint called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] on a closed session, or the
    /// connection's error if the savepoint does not exist.
    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.connection.lock().await.rollback_to_savepoint(name).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }
}

/// Opens [`Session`]s through a [`BindingDataSource`].
#[derive(Clone)]
pub struct SessionFactory {
    data_source: BindingDataSource,
}

impl SessionFactory {
    /// Wraps `provider` in a [`BindingDataSource`].
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            data_source: BindingDataSource::new(provider),
        }
    }

    /// The binding-aware data source behind this factory.
    pub fn data_source(&self) -> &BindingDataSource {
        &self.data_source
    }

    /// Opens a session, sharing the bound connection when one is visible.
    pub async fn open_session(&self, binding: &BindingState, auto_commit: bool) -> Result<Session> {
        let connection = self.data_source.get_connection(binding).await?;
        Self::finish_open(connection, auto_commit).await
    }

    /// Opens a session with explicit credentials.
    pub async fn open_session_as(
        &self,
        binding: &BindingState,
        user: &str,
        password: &str,
        auto_commit: bool,
    ) -> Result<Session> {
        let connection = self
            .data_source
            .get_connection_as(binding, user, password)
            .await?;
        Self::finish_open(connection, auto_commit).await
    }

    async fn finish_open(connection: SharedConnection, auto_commit: bool) -> Result<Session> {
        match Session::open(connection.clone(), auto_commit).await {
            Ok(session) => {
                debug!(auto_commit, "session opened");
                Ok(session)
            }
            Err(err) => {
                if let Err(close_err) = connection.lock().await.close().await {
                    warn!(error = %close_err, "failed to close connection after session open failure");
                }
                Err(err)
            }
        }
    }
}

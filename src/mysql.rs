//! SQLx MySQL backend.
//!
//! [`MySqlProvider`] hands out connections from a [`MySqlPool`]. Statements
//! go over the text protocol, so transaction control and savepoint statements
//! work the same as they do in the `mysql` client.

use crate::connection::{Connection, ConnectionProvider};
use crate::manager::TransactionManager;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnection, MySqlPool};
use sqlx::pool::PoolConnection;
use std::any::Any;
use tracing::{debug, warn};

/// [`ConnectionProvider`] over a SQLx MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlProvider {
    pool: MySqlPool,
}

impl MySqlProvider {
    /// Creates a provider drawing connections from `pool`.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// The wrapped pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionProvider for MySqlProvider {
    async fn get_connection(&self) -> Result<Box<dyn Connection>> {
        let conn = self.pool.acquire().await?;
        debug!("acquired pooled mysql connection");
        Ok(Box::new(PooledMySqlConnection::new(Inner::Pooled(conn))))
    }

    /// Connects outside the pool, reusing the pool's options with the given
    /// credentials.
    async fn get_connection_as(&self, user: &str, password: &str) -> Result<Box<dyn Connection>> {
        let options = (*self.pool.connect_options())
            .clone()
            .username(user)
            .password(password);
        let conn = <MySqlConnection as sqlx::Connection>::connect_with(&options).await?;
        debug!(user, "opened dedicated mysql connection");
        Ok(Box::new(PooledMySqlConnection::new(Inner::Direct(conn))))
    }
}

enum Inner {
    Pooled(PoolConnection<MySql>),
    Direct(MySqlConnection),
}

impl Inner {
    fn raw(&mut self) -> &mut MySqlConnection {
        match self {
            Inner::Pooled(conn) => &mut **conn,
            Inner::Direct(conn) => conn,
        }
    }
}

/// A MySQL connection checked out of a [`MySqlProvider`].
pub struct PooledMySqlConnection {
    inner: Option<Inner>,
    auto_commit: bool,
}

impl PooledMySqlConnection {
    fn new(inner: Inner) -> Self {
        Self {
            inner: Some(inner),
            auto_commit: true,
        }
    }

    fn raw(&mut self) -> Result<&mut MySqlConnection> {
        self.inner
            .as_mut()
            .map(Inner::raw)
            .ok_or_else(|| Error::Connection("mysql connection already closed".into()))
    }

    async fn run(&mut self, sql: &str) -> Result<u64> {
        let conn = self.raw()?;
        let done = sqlx::Executor::execute(conn, sql).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl Connection for PooledMySqlConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.run(sql).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run("COMMIT").await.map(drop)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run("ROLLBACK").await.map(drop)
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        let sql = if auto_commit {
            "SET autocommit = 1"
        } else {
            "SET autocommit = 0"
        };
        self.run(sql).await?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    /// Discards uncommitted work, restores auto-commit and gives the
    /// connection back.
    async fn close(&mut self) -> Result<()> {
        if self.inner.is_none() {
            return Ok(());
        }
        if !self.auto_commit {
            self.run("ROLLBACK").await?;
            self.set_auto_commit(true).await?;
        }
        match self.inner.take() {
            Some(Inner::Direct(conn)) => sqlx::Connection::close(conn).await?,
            Some(Inner::Pooled(conn)) => drop(conn),
            None => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for PooledMySqlConnection {
    /// A connection dropped with auto-commit off may still hold an open
    /// transaction, so it is detached from the pool instead of returned.
    fn drop(&mut self) {
        if self.auto_commit {
            return;
        }
        if let Some(Inner::Pooled(conn)) = self.inner.take() {
            warn!("mysql connection dropped inside a transaction; detaching from pool");
            drop(conn.detach());
        }
    }
}

impl TransactionManager {
    /// Creates a manager over a SQLx MySQL pool with the default
    /// configuration.
    pub fn mysql(pool: MySqlPool) -> Self {
        TransactionManager::new(MySqlProvider::new(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_is_cloneable_and_shareable() {
        fn assert_provider<P: ConnectionProvider + Clone + 'static>() {}
        assert_provider::<MySqlProvider>();
    }
}

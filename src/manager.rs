use crate::binding::BindingState;
use crate::config::TransactionConfig;
use crate::connection::ConnectionProvider;
use crate::context::TransactionContext;
use crate::propagation::Propagation;
use crate::session::{Session, SessionFactory};
use crate::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Entry point shared by every thread of execution.
///
/// Holds the session factory (the wrapped connection provider) and the
/// configuration. Transaction state lives in the [`TransactionContext`]s
/// created by [`TransactionManager::context`], one per thread of execution;
/// the manager itself can be shared freely, e.g. behind an `Arc`.
pub struct TransactionManager {
    sessions: SessionFactory,
    config: TransactionConfig,
}

impl TransactionManager {
    /// Creates a manager over `provider` with the default configuration.
    pub fn new(provider: impl ConnectionProvider + 'static) -> Self {
        Self::with_config(provider, TransactionConfig::default())
    }

    /// Creates a manager over `provider` with the given configuration.
    pub fn with_config(provider: impl ConnectionProvider + 'static, config: TransactionConfig) -> Self {
        Self::from_shared(Arc::new(provider), config)
    }

    /// Creates a manager over a provider that is also used elsewhere.
    ///
    /// Connections are only shared between sessions opened through this
    /// manager; the provider itself is wrapped, not modified.
    pub fn from_shared(provider: Arc<dyn ConnectionProvider>, config: TransactionConfig) -> Self {
        Self {
            sessions: SessionFactory::new(provider),
            config,
        }
    }

    /// The configuration every context of this manager uses.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// The factory sessions are opened through.
    pub fn session_factory(&self) -> &SessionFactory {
        &self.sessions
    }

    /// Starts a new thread of execution with no transaction in scope.
    pub fn context(&self) -> TransactionContext<'_> {
        TransactionContext::new(self)
    }

    /// Runs `f` under `propagation` on a fresh context.
    ///
    /// Use [`TransactionContext::execute`] inside `f` to compose further
    /// calls with this one.
    pub async fn execute<'m, F, T>(&'m self, propagation: Propagation, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let mut ctx = self.context();
        let result = ctx.execute(propagation, f).await;
        result
    }

    /// Runs `f` under the configured default propagation on a fresh context.
    pub async fn run<'m, F, T>(&'m self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        self.execute(self.config.default_propagation(), f).await
    }

    /// Opens a session on its own connection, outside any transaction.
    pub async fn open_session(&self, auto_commit: bool) -> Result<Session> {
        self.sessions
            .open_session(&BindingState::new(), auto_commit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDatabase;

    #[tokio::test]
    async fn test_execute_returns_result() {
        let db = MockDatabase::new();
        let manager = TransactionManager::new(db.provider());

        let value = manager
            .execute(Propagation::Required, |_tx| Box::pin(async move { Ok("result") }))
            .await
            .unwrap();

        assert_eq!(value, "result");
        assert_eq!(db.commits(), 1);
    }

    #[tokio::test]
    async fn test_run_uses_configured_default() {
        let db = MockDatabase::new();
        let config = TransactionConfig::new().with_default_propagation(Propagation::Nested);
        let manager = TransactionManager::with_config(db.provider(), config);

        let active = manager
            .run(|tx| Box::pin(async move { Ok(tx.is_active()) }))
            .await
            .unwrap();

        assert!(active);
        assert_eq!(db.commits(), 1);
    }

    #[tokio::test]
    async fn test_savepoint_prefix_reaches_units() {
        let db = MockDatabase::new();
        let config = TransactionConfig::new().with_savepoint_prefix("app_sp_").unwrap();
        let manager = TransactionManager::with_config(db.provider(), config);

        manager
            .execute(Propagation::Required, |tx| {
                Box::pin(async move {
                    tx.execute(Propagation::Nested, |_tx| Box::pin(async move { Ok(()) }))
                        .await
                })
            })
            .await
            .unwrap();

        assert_eq!(db.executed_on("SAVEPOINT app_sp_1"), vec![1]);
    }

    #[tokio::test]
    async fn test_each_execute_is_its_own_thread_of_execution() {
        let db = MockDatabase::new();
        let manager = TransactionManager::new(db.provider());

        manager
            .execute(Propagation::Required, |_tx| Box::pin(async move { Ok(()) }))
            .await
            .unwrap();
        manager
            .execute(Propagation::Required, |_tx| Box::pin(async move { Ok(()) }))
            .await
            .unwrap();

        assert_eq!(db.opened(), 2);
    }

    #[tokio::test]
    async fn test_open_session_outside_transaction() {
        let db = MockDatabase::new();
        let manager = TransactionManager::from_shared(
            Arc::new(db.provider()),
            TransactionConfig::default(),
        );

        let mut session = manager.open_session(true).await.unwrap();
        session.execute("INSERT a").await.unwrap();

        assert_eq!(db.committed(), vec!["INSERT a"]);
    }
}

use crate::context::TransactionContext;
use crate::executor::{with_nested_transaction, with_transaction};
use crate::manager::TransactionManager;
use crate::Error;
use futures::future::BoxFuture;

impl Error {
    /// Converts an `anyhow::Error` raised by caller code.
    ///
    /// A crate [`Error`] wrapped in the anyhow error is returned as is, so
    /// transaction failures keep their variant; anything else becomes
    /// [`Error::Processing`].
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => err,
            Err(other) => Error::Processing(other.into()),
        }
    }
}

/// Executes a function within a transaction, using anyhow::Error for error handling.
///
/// This is a convenience wrapper around [`with_transaction`] that accepts
/// closures returning `anyhow::Result<T>` instead of `crate::Result<T>`.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_propagation::{with_transaction_anyhow, TransactionManager};
///
/// # async fn example() -> anyhow::Result<()> {
/// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let manager = TransactionManager::mysql(pool);
///
/// with_transaction_anyhow(&manager, |tx| {
///     Box::pin(async move {
///         let mut session = tx.open_session().await?;
///         session.execute("INSERT INTO users (name) VALUES ('Alice')").await?;
///         anyhow::ensure!(!session.is_auto_commit(), "expected a transaction");
///         Ok(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_transaction_anyhow<'m, F, T>(manager: &'m TransactionManager, f: F) -> anyhow::Result<T>
where
    F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, anyhow::Result<T>> + Send,
    T: Send,
{
    with_transaction(manager, move |tx| {
        let work = f(tx);
        Box::pin(async move { work.await.map_err(Error::from_anyhow) })
    })
    .await
    .map_err(anyhow::Error::from)
}

/// Executes a nested transaction using savepoints, with anyhow::Error for error handling.
pub async fn with_nested_transaction_anyhow<'m, F, T>(
    tx_ctx: &mut TransactionContext<'m>,
    f: F,
) -> anyhow::Result<T>
where
    F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, anyhow::Result<T>> + Send,
    T: Send,
{
    with_nested_transaction(tx_ctx, move |tx| {
        let work = f(tx);
        Box::pin(async move { work.await.map_err(Error::from_anyhow) })
    })
    .await
    .map_err(anyhow::Error::from)
}

use crate::context::TransactionContext;
use crate::manager::TransactionManager;
use crate::propagation::Propagation;
use crate::registry::{Completion, UnitId};
use crate::unit::TransactionUnit;
use crate::{Error, Result};
use futures::future::BoxFuture;
use tracing::{debug, warn};

impl<'m> TransactionContext<'m> {
    /// Runs `work` under the given propagation.
    ///
    /// - [`Propagation::Required`] joins the current transaction, or starts
    ///   one and commits it when `work` succeeds.
    /// - [`Propagation::RequiresNew`] always starts an independent
    ///   transaction on a connection of its own; the caller's transaction is
    ///   neither joined nor affected by its outcome.
    /// - [`Propagation::Nested`] runs `work` inside a savepoint of the current
    ///   transaction, or behaves like `Required` when there is none.
    ///
    /// Whichever call starts a transaction commits it, rolls it back and
    /// releases its connection; joining calls never do.
    ///
    /// # Errors
    ///
    /// A failure of `work` (or of the commit) is returned as
    /// [`Error::Execution`] carrying the original cause, after the owning
    /// transaction has been rolled back. Failures inside a savepoint are
    /// returned as [`Error::NestedExecution`]. A failure to start a
    /// transaction is returned as [`Error::Begin`].
    ///
    /// # Panics
    ///
    /// A panic inside `work` rolls back and ends any transaction this call
    /// owns, then continues unwinding.
    ///
    /// # Cancellation
    ///
    /// If the returned future is dropped before it completes, the
    /// transactions it opened stay open until the next outermost call on this
    /// context, which rolls them back and ends them before doing anything
    /// else.
    pub async fn execute<F, T>(&mut self, propagation: Propagation, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let _scope = self.enter_scope().await;
        match propagation {
            Propagation::Required => self.execute_required(work).await,
            Propagation::RequiresNew => self.execute_requires_new(work).await,
            Propagation::Nested => self.execute_nested(work).await,
        }
    }

    /// Runs `work` under a propagation given by name.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedPropagation`] before doing anything if
    /// the name is unknown; otherwise as [`TransactionContext::execute`].
    pub async fn execute_named<F, T>(&mut self, propagation: &str, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let propagation: Propagation = propagation.parse()?;
        self.execute(propagation, work).await
    }

    /// Runs `work` in an independent transaction when `independent` is set,
    /// otherwise in the current one.
    pub async fn execute_with_transaction<F, T>(&mut self, independent: bool, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let _scope = self.enter_scope().await;
        if independent {
            self.execute_requires_new(work).await
        } else {
            self.execute_required(work).await
        }
    }

    async fn execute_required<F, T>(&mut self, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let id = self.current_unit_id();
        if self.current_unit().is_active() {
            debug!(unit = %id, "joining active transaction");
            return self
                .with_operation(id, work)
                .await
                .map_err(|err| err.into_execution(None));
        }

        let session = self
            .open_session_with(false)
            .await
            .map_err(Error::begin)?;
        {
            let (unit, binding) = self.parts(id);
            unit.begin(session, binding).await.map_err(Error::begin)?;
        }

        let completion = self.run_scoped(id, work).await;
        self.settle(id, completion).await.into_result()
    }

    async fn execute_requires_new<F, T>(&mut self, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        self.binding_mut().suspend();
        let opened = self.open_session_with(false).await;
        self.binding_mut().resume();
        let session = opened.map_err(Error::begin)?;

        let mut unit = TransactionUnit::new(self.manager().config().savepoint_prefix());
        unit.begin_independent(session, self.binding_mut())
            .await
            .map_err(Error::begin)?;
        let id = self.push_unit(unit);
        debug!(unit = %id, "independent transaction started");

        let completion = self.run_scoped(id, work).await;
        let completion = self.settle(id, completion).await;
        self.pop_unit();
        completion.into_result()
    }

    async fn execute_nested<F, T>(&mut self, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let id = self.current_unit_id();
        if !self.current_unit().is_active() {
            debug!("no active transaction to nest in, starting one");
            return self.execute_required(work).await;
        }

        let savepoint = {
            let (unit, _) = self.parts(id);
            unit.create_savepoint()
                .await
                .map_err(|err| err.into_nested(None))?
        };

        let completion = Completion::guard(work(self)).await;
        let (unit, _) = self.parts(id);
        match completion {
            Completion::Finished(Ok(value)) => {
                unit.release_savepoint(savepoint)
                    .await
                    .map_err(|err| err.into_nested(None))?;
                Ok(value)
            }
            Completion::Finished(Err(err)) => {
                let rollback = unit.rollback_to_savepoint(savepoint).await.err();
                Err(err.into_nested(rollback))
            }
            Completion::Panicked(payload) => {
                if let Err(err) = unit.rollback_to_savepoint(savepoint).await {
                    warn!(error = %err, "savepoint rollback failed while unwinding");
                }
                Completion::<T>::Panicked(payload).into_result()
            }
        }
    }

    /// Commits or rolls back the unit this call owns according to
    /// `completion`, then always ends it.
    async fn settle<T>(&mut self, id: UnitId, completion: Completion<T>) -> Completion<T> {
        let (unit, binding) = self.parts(id);
        let settled = match completion {
            Completion::Finished(Ok(value)) => match unit.commit().await {
                Ok(()) => Completion::Finished(Ok(value)),
                Err(err) => {
                    let rollback = unit.rollback().await.err();
                    Completion::Finished(Err(err.into_execution(rollback)))
                }
            },
            Completion::Finished(Err(err)) => {
                let rollback = unit.rollback().await.err();
                Completion::Finished(Err(err.into_execution(rollback)))
            }
            Completion::Panicked(payload) => {
                if let Err(err) = unit.rollback().await {
                    warn!(error = %err, "rollback failed while unwinding");
                }
                Completion::Panicked(payload)
            }
        };
        unit.end(binding).await;
        settled
    }
}

/// Executes a function within a database transaction.
///
/// Starts a fresh thread of execution on `manager` and runs `f` with
/// [`Propagation::Required`]:
/// - Begins a transaction
/// - Executes the provided function
/// - Commits on success
/// - Rolls back on error
///
/// Calls made through the context handed to `f` join, nest in or step out of
/// this transaction according to their own propagation.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_propagation::{with_transaction, TransactionManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let manager = TransactionManager::mysql(pool);
///
/// with_transaction(&manager, |tx| {
///     Box::pin(async move {
///         let mut session = tx.open_session().await?;
///         session.execute("INSERT INTO users (name) VALUES ('Alice')").await?;
///         Ok(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_transaction<'m, F, T>(manager: &'m TransactionManager, f: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
    T: Send,
{
    let mut ctx = manager.context();
    let result = ctx.execute(Propagation::Required, f).await;
    result
}

/// Executes a function in a new, independent transaction.
///
/// The transaction active on `tx_ctx`, if any, is left as it is: it neither
/// sees the new transaction's changes before they commit nor loses its own
/// changes if the new transaction fails.
pub async fn with_new_transaction<'m, F, T>(
    tx_ctx: &mut TransactionContext<'m>,
    f: F,
) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
    T: Send,
{
    tx_ctx.execute(Propagation::RequiresNew, f).await
}

/// Executes a nested transaction using savepoints.
///
/// If the nested transaction fails, only operations since the savepoint are
/// rolled back and the outer transaction can still commit.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_propagation::{with_nested_transaction, with_transaction, TransactionManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let manager = TransactionManager::mysql(pool);
///
/// with_transaction(&manager, |tx| {
///     Box::pin(async move {
///         let mut session = tx.open_session().await?;
///         session.execute("INSERT INTO users (name) VALUES ('David')").await?;
///
///         let logged = with_nested_transaction(tx, |nested_tx| {
///             Box::pin(async move {
///                 let mut session = nested_tx.open_session().await?;
///                 session.execute("INSERT INTO audit_log (action) VALUES ('created')").await?;
///                 Ok(())
///             })
///         })
///         .await;
///
///         // If logging failed, the user row still commits
///         if logged.is_err() {
///             println!("audit log skipped");
///         }
///         Ok(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_nested_transaction<'m, F, T>(
    tx_ctx: &mut TransactionContext<'m>,
    f: F,
) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
    T: Send,
{
    tx_ctx.execute(Propagation::Nested, f).await
}

use crate::binding::BindingState;
use crate::manager::TransactionManager;
use crate::registry::{OperationRegistry, UnitId};
use crate::session::Session;
use crate::unit::TransactionUnit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Transaction state of one thread of execution.
///
/// A context tracks which transactional unit is current, which connection is
/// bound, and the stack of units started by `REQUIRES_NEW`. It is passed by
/// `&mut` into every unit of work, so nested calls see exactly the state of
/// their caller. Create one per thread of execution with
/// [`TransactionManager::context`].
///
/// Slot 0 of the unit stack is the context's primary unit, used whenever no
/// other unit is current.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_propagation::{Propagation, TransactionManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let manager = TransactionManager::mysql(pool);
/// let mut ctx = manager.context();
///
/// ctx.execute(Propagation::Required, |tx| {
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
pub struct TransactionContext<'m> {
    manager: &'m TransactionManager,
    registry: OperationRegistry,
    binding: BindingState,
    units: Vec<TransactionUnit>,
    scopes: Arc<AtomicUsize>,
}

/// Marks one `execute` call in flight on a context.
///
/// The count drops with the guard, so a call whose future is dropped before
/// completion leaves its scope too.
pub(crate) struct ScopeGuard {
    scopes: Arc<AtomicUsize>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.scopes.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<'m> TransactionContext<'m> {
    pub(crate) fn new(manager: &'m TransactionManager) -> Self {
        let primary = TransactionUnit::new(manager.config().savepoint_prefix());
        Self {
            manager,
            registry: OperationRegistry::default(),
            binding: BindingState::new(),
            units: vec![primary],
            scopes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The manager this context was created from.
    pub fn manager(&self) -> &'m TransactionManager {
        self.manager
    }

    /// The unit currently in scope, as seen by nested calls.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut OperationRegistry {
        &mut self.registry
    }

    /// The connection binding new sessions are opened against.
    pub fn binding(&self) -> &BindingState {
        &self.binding
    }

    /// The unit calls operate on: the registry's current unit, or the
    /// primary unit when none is installed.
    pub fn current_unit_id(&self) -> UnitId {
        self.registry.get().unwrap_or(UnitId::PRIMARY)
    }

    /// The unit behind [`TransactionContext::current_unit_id`].
    pub fn current_unit(&self) -> &TransactionUnit {
        &self.units[self.current_unit_id().index()]
    }

    /// Looks up a unit of this context, if `id` is still on the stack.
    pub fn unit(&self, id: UnitId) -> Option<&TransactionUnit> {
        self.units.get(id.index())
    }

    /// Number of independent transactions currently open on this context.
    pub fn independent_depth(&self) -> usize {
        self.units.len() - 1
    }

    /// Opens a session that shares the active transaction's connection.
    ///
    /// Outside a transaction the session gets its own connection. The session
    /// starts with auto-commit off.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be acquired.
    pub async fn open_session(&self) -> crate::Result<Session> {
        self.open_session_with(false).await
    }

    /// Like [`TransactionContext::open_session`] with an explicit auto-commit
    /// mode. The mode is ignored for sessions sharing a transaction.
    pub async fn open_session_with(&self, auto_commit: bool) -> crate::Result<Session> {
        self.manager
            .session_factory()
            .open_session(&self.binding, auto_commit)
            .await
    }

    /// Whether the current unit has an open transaction.
    pub fn is_active(&self) -> bool {
        self.current_unit().is_active()
    }

    /// Commits the current unit's transaction without ending it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inactive`] if no transaction is open.
    pub async fn commit(&mut self) -> crate::Result<()> {
        let id = self.current_unit_id();
        self.units[id.index()].commit().await
    }

    /// Rolls back the current unit's transaction without ending it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inactive`] if no transaction is open.
    pub async fn rollback(&mut self) -> crate::Result<()> {
        let id = self.current_unit_id();
        self.units[id.index()].rollback().await
    }

    /// Enters an `execute` scope.
    ///
    /// An outermost call first discards whatever an abandoned call left
    /// behind, so it never joins a transaction nobody will commit.
    pub(crate) async fn enter_scope(&mut self) -> ScopeGuard {
        let outermost = self.scopes.fetch_add(1, Ordering::SeqCst) == 0;
        let guard = ScopeGuard {
            scopes: Arc::clone(&self.scopes),
        };
        if outermost {
            self.discard_abandoned().await;
        }
        guard
    }

    /// Rolls back and ends every unit still open, then clears the registry and
    /// the binding.
    ///
    /// Outside any `execute` call nothing may be active, bound or current; if
    /// something is, the call that set it up was cancelled.
    async fn discard_abandoned(&mut self) {
        let active = self.units.iter().filter(|unit| unit.is_active()).count();
        let clean = active == 0
            && self.units.len() == 1
            && self.registry.get().is_none()
            && self.binding.bound().is_none()
            && !self.binding.is_suspended();
        if clean {
            return;
        }

        warn!(
            active,
            independent = self.units.len() - 1,
            "discarding transactions abandoned by a cancelled call"
        );
        for unit in self.units.iter_mut().rev() {
            if unit.is_active() {
                if let Err(err) = unit.rollback().await {
                    warn!(error = %err, "rollback of abandoned transaction failed");
                }
            }
            unit.end(&mut self.binding).await;
        }
        self.units.truncate(1);
        self.registry.clear();
        self.binding = BindingState::new();
    }

    pub(crate) fn parts(&mut self, id: UnitId) -> (&mut TransactionUnit, &mut BindingState) {
        (&mut self.units[id.index()], &mut self.binding)
    }

    pub(crate) fn binding_mut(&mut self) -> &mut BindingState {
        &mut self.binding
    }

    pub(crate) fn push_unit(&mut self, unit: TransactionUnit) -> UnitId {
        self.units.push(unit);
        UnitId::new(self.units.len() - 1)
    }

    pub(crate) fn pop_unit(&mut self) {
        if self.units.len() > 1 {
            self.units.pop();
        }
    }
}

impl Drop for TransactionContext<'_> {
    /// Reports transactions left open.
    ///
    /// This only happens when a future driving the context was dropped before
    /// completion and no later call cleaned up; the connections are released
    /// when their handles drop.
    fn drop(&mut self) {
        let open = self.units.iter().filter(|unit| unit.is_active()).count();
        if open > 0 {
            warn!(open, "transaction context dropped with open transactions");
        }
    }
}

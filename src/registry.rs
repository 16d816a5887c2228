use crate::context::TransactionContext;
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

/// Identifies a transactional unit within one [`TransactionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(usize);

impl UnitId {
    /// The context's own default unit.
    pub const PRIMARY: UnitId = UnitId(0);

    pub(crate) fn new(index: usize) -> Self {
        UnitId(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// The unit currently in scope for a thread of execution.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    current: Option<UnitId>,
}

impl OperationRegistry {
    /// The current unit, if one is installed.
    pub fn get(&self) -> Option<UnitId> {
        self.current
    }

    /// Installs `unit` as the current unit.
    pub fn set(&mut self, unit: UnitId) {
        self.current = Some(unit);
    }

    /// Removes the current unit.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Installs `unit`, returning the value it replaced.
    pub fn replace(&mut self, unit: UnitId) -> Option<UnitId> {
        self.current.replace(unit)
    }

    /// Puts back a value returned by [`OperationRegistry::replace`]: the
    /// previous unit if there was one, otherwise the registry is cleared.
    pub fn restore(&mut self, previous: Option<UnitId>) {
        match previous {
            Some(unit) => self.set(unit),
            None => self.clear(),
        }
    }
}

/// How a unit of work ended: returned normally or panicked.
pub(crate) enum Completion<T> {
    Finished(Result<T>),
    Panicked(Box<dyn Any + Send + 'static>),
}

impl<T> Completion<T> {
    pub(crate) async fn guard<Fut>(work: Fut) -> Self
    where
        Fut: Future<Output = Result<T>>,
    {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => Completion::Finished(result),
            Err(payload) => Completion::Panicked(payload),
        }
    }

    /// Returns the work's result, resuming the panic if it panicked.
    pub(crate) fn into_result(self) -> Result<T> {
        match self {
            Completion::Finished(result) => result,
            Completion::Panicked(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<'m> TransactionContext<'m> {
    /// Runs `work` with `unit` as the current unit, then restores whatever was
    /// current before, including when `work` fails or panics.
    ///
    /// Nothing is begun, committed or rolled back here.
    pub(crate) async fn with_operation<F, T>(&mut self, unit: UnitId, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        self.run_scoped(unit, work).await.into_result()
    }

    pub(crate) async fn run_scoped<F, T>(&mut self, unit: UnitId, work: F) -> Completion<T>
    where
        F: for<'a> FnOnce(&'a mut TransactionContext<'m>) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let previous = self.registry_mut().replace(unit);
        let completion = Completion::guard(work(self)).await;
        self.registry_mut().restore(previous);
        completion
    }
}

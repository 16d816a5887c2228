/// Boxed error carried by [`Error::Processing`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for transaction management
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connection-level failure reported by a non-SQLx provider
    #[error("Connection error: {0}")]
    Connection(String),

    /// The requested propagation type does not exist
    #[error("Unsupported propagation type: {0}")]
    UnsupportedPropagation(String),

    /// The provider does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Configuration value rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Commit, rollback or savepoint requested on a unit that has not begun
    #[error("Transaction is not active")]
    Inactive,

    /// `begin` called on a unit that is already active
    #[error("Transaction is already active")]
    AlreadyActive,

    /// Session has already been closed
    #[error("Session has already been closed")]
    SessionClosed,

    /// A new transaction could not be started
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] Box<Error>),

    /// Failure raised by the caller's work that is not a transaction error
    #[error("Error occurred while processing the transaction: {0}")]
    Processing(#[source] BoxError),

    /// The work or its commit failed; the owning transaction was rolled back
    #[error("Transaction execution failed: {source}")]
    Execution {
        #[source]
        source: Box<Error>,
        rollback: Option<Box<Error>>,
    },

    /// The nested work failed; only the changes since its savepoint were undone
    #[error("Nested transaction execution failed: {source}")]
    NestedExecution {
        #[source]
        source: Box<Error>,
        rollback: Option<Box<Error>>,
    },
}

impl Error {
    /// Wraps a foreign failure as [`Error::Processing`].
    pub fn processing<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Processing(err.into())
    }

    pub(crate) fn begin(err: Error) -> Self {
        Error::Begin(Box::new(err))
    }

    /// Converts a failure into the error reported for a whole-transaction loss.
    ///
    /// An execution failure coming up from an inner scope is passed through so
    /// the caller still sees the work's own failure as the cause. A rollback
    /// failure is attached unless one is already recorded.
    pub(crate) fn into_execution(self, rollback: Option<Error>) -> Self {
        match self {
            Error::Execution {
                source,
                rollback: None,
            } => Error::Execution {
                source,
                rollback: rollback.map(Box::new),
            },
            err @ Error::Execution { .. } => {
                if let Some(extra) = rollback {
                    tracing::warn!(error = %extra, "dropping secondary rollback failure");
                }
                err
            }
            other => Error::Execution {
                source: Box::new(other),
                rollback: rollback.map(Box::new),
            },
        }
    }

    /// Same as [`Error::into_execution`] for a savepoint-scoped loss.
    pub(crate) fn into_nested(self, rollback: Option<Error>) -> Self {
        match self {
            Error::NestedExecution {
                source,
                rollback: None,
            } => Error::NestedExecution {
                source,
                rollback: rollback.map(Box::new),
            },
            err @ Error::NestedExecution { .. } => {
                if let Some(extra) = rollback {
                    tracing::warn!(error = %extra, "dropping secondary savepoint rollback failure");
                }
                err
            }
            other => Error::NestedExecution {
                source: Box::new(other),
                rollback: rollback.map(Box::new),
            },
        }
    }

    /// The failure that triggered an execution error.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Error::Execution { source, .. }
            | Error::NestedExecution { source, .. }
            | Error::Begin(source) => Some(source),
            _ => None,
        }
    }

    /// The rollback failure recorded alongside the original cause, if any.
    ///
    /// Only the first rollback failure is kept. When an inner scope already
    /// recorded one, a later failure in an enclosing scope is logged at `warn`
    /// and dropped.
    pub fn rollback_error(&self) -> Option<&Error> {
        match self {
            Error::Execution { rollback, .. } | Error::NestedExecution { rollback, .. } => {
                rollback.as_deref()
            }
            _ => None,
        }
    }

    /// True when only a savepoint-scoped portion of the work was lost.
    pub fn is_nested(&self) -> bool {
        matches!(self, Error::NestedExecution { .. })
    }
}

impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self {
        Error::Processing(err)
    }
}

/// Result type alias for transaction operations
pub type Result<T> = std::result::Result<T, Error>;

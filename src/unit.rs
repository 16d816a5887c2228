use crate::binding::BindingState;
use crate::connection::SharedConnection;
use crate::session::Session;
use crate::{Error, Result};
use tracing::{debug, warn};

/// A savepoint created by [`TransactionUnit::create_savepoint`].
///
/// Consumed by exactly one release or rollback.
#[derive(Debug, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    /// The name used in the `SAVEPOINT` statement.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One begin → commit/rollback → end lifecycle over a single session.
///
/// While active, the unit's connection is bound in the [`BindingState`] of
/// its thread of execution; `end` restores whatever was bound before.
pub struct TransactionUnit {
    session: Option<Session>,
    active: bool,
    independent: bool,
    savepoint_counter: u64,
    savepoint_prefix: String,
    displaced: Option<SharedConnection>,
}

impl TransactionUnit {
    /// Creates an inactive unit naming its savepoints `<prefix><n>`.
    pub fn new(savepoint_prefix: impl Into<String>) -> Self {
        Self {
            session: None,
            active: false,
            independent: false,
            savepoint_counter: 0,
            savepoint_prefix: savepoint_prefix.into(),
            displaced: None,
        }
    }

    /// True between a successful `begin` and `end`.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True if this unit runs on its own connection, apart from the
    /// connection bound by its caller.
    pub fn is_independent(&self) -> bool {
        self.independent
    }

    /// The session the unit owns while active.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Starts the unit on `session` and binds the session's connection.
    ///
    /// Either the unit becomes active with the connection bound, or nothing
    /// changes and the offered session is closed.
    pub async fn begin(&mut self, session: Session, binding: &mut BindingState) -> Result<()> {
        if self.active {
            discard(session).await;
            return Err(Error::AlreadyActive);
        }
        self.displaced = binding.bind(session.connection().clone());
        self.session = Some(session);
        self.active = true;
        debug!(independent = self.independent, "transaction began");
        Ok(())
    }

    /// Starts the unit as an independent transaction.
    ///
    /// `session` must have been opened while the binding was suspended so
    /// that it holds a genuine connection. The outer binding is restored by
    /// [`TransactionUnit::end`].
    pub async fn begin_independent(
        &mut self,
        session: Session,
        binding: &mut BindingState,
    ) -> Result<()> {
        if self.active {
            discard(session).await;
            return Err(Error::AlreadyActive);
        }
        self.independent = true;
        self.begin(session, binding).await
    }

    /// Commits the unit's work. The unit stays active until
    /// [`TransactionUnit::end`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inactive`] if the unit has not begun, or the
    /// connection's error if the commit fails.
    pub async fn commit(&mut self) -> Result<()> {
        let session = self.active_session()?;
        session.commit().await?;
        debug!(independent = self.independent, "transaction committed");
        Ok(())
    }

    /// Rolls back the unit's work. Permitted after a failed commit, since the
    /// unit stays active until [`TransactionUnit::end`].
    pub async fn rollback(&mut self) -> Result<()> {
        let session = self.active_session()?;
        session.rollback().await?;
        debug!(independent = self.independent, "transaction rolled back");
        Ok(())
    }

    /// Restores the previous binding, closes the session and deactivates the
    /// unit. Calling it again does nothing.
    pub async fn end(&mut self, binding: &mut BindingState) {
        let Some(session) = self.session.take() else {
            self.active = false;
            return;
        };
        match self.displaced.take() {
            Some(previous) => {
                binding.bind(previous);
            }
            None => {
                binding.unbind();
            }
        }
        self.active = false;
        discard(session).await;
        debug!(independent = self.independent, "transaction ended");
    }

    /// Creates the next savepoint of this unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inactive`] if the unit has not begun.
    pub async fn create_savepoint(&mut self) -> Result<Savepoint> {
        let name = format!("{}{}", self.savepoint_prefix, self.savepoint_counter + 1);
        self.active_session()?.set_savepoint(&name).await?;
        self.savepoint_counter += 1;
        debug!(savepoint = %name, "savepoint created");
        Ok(Savepoint { name })
    }

    /// Discards `savepoint`, keeping everything done since it was created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inactive`] if the unit has not begun.
    pub async fn release_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        self.active_session()?
            .release_savepoint(&savepoint.name)
            .await
    }

    /// Undoes everything done since `savepoint` was created. The transaction
    /// itself stays open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inactive`] if the unit has not begun.
    pub async fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        self.active_session()?
            .rollback_to_savepoint(&savepoint.name)
            .await?;
        debug!(savepoint = %savepoint.name, "rolled back to savepoint");
        Ok(())
    }

    fn active_session(&mut self) -> Result<&mut Session> {
        match self.session.as_mut() {
            Some(session) if self.active => Ok(session),
            _ => Err(Error::Inactive),
        }
    }
}

async fn discard(mut session: Session) {
    if let Err(err) = session.close().await {
        warn!(error = %err, "failed to close session");
    }
}

//! # sqlx-propagation
//!
//! Declarative transaction propagation for SQLx: run units of work as
//! `REQUIRED`, `REQUIRES_NEW` or `NESTED` and let the library decide whether to
//! begin, join, suspend, savepoint, commit or roll back.
//!
//! ## Features
//!
//! - **Shared connections**: every session opened inside a transaction uses the
//!   transaction's connection, so plain data-access code joins it automatically
//! - **Suppressed control calls**: commit, rollback, close and auto-commit
//!   changes issued through a shared connection are ignored; only the owning
//!   transaction ends its work
//! - **Independent transactions**: `REQUIRES_NEW` runs on a fresh connection
//!   and leaves the surrounding transaction untouched
//! - **Savepoints**: `NESTED` undoes only its own changes on failure
//! - **Panic safety**: a panicking unit of work is rolled back and its state
//!   restored before the panic continues
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! sqlx = { version = "0.8", features = ["mysql", "runtime-tokio"] }
//! sqlx-propagation = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Basic Transaction
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_propagation::{with_transaction, TransactionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let manager = TransactionManager::mysql(pool);
//!
//! with_transaction(&manager, |tx| {
//!     Box::pin(async move {
//!         let mut session = tx.open_session().await?;
//!         session.execute("INSERT INTO users (name) VALUES ('Alice')").await?;
//!         Ok(())
//!     })
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Composing Propagation Modes
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_propagation::{Propagation, TransactionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let manager = TransactionManager::mysql(pool);
//!
//! manager
//!     .execute(Propagation::Required, |tx| {
//!         Box::pin(async move {
//!             let mut orders = tx.open_session().await?;
//!             orders.execute("INSERT INTO orders (item) VALUES ('book')").await?;
//!
//!             // Commits on its own, even if the order is rolled back later
//!             tx.execute(Propagation::RequiresNew, |audit| {
//!                 Box::pin(async move {
//!                     let mut session = audit.open_session().await?;
//!                     session.execute("INSERT INTO audit_log (action) VALUES ('order')").await?;
//!                     Ok(())
//!                 })
//!             })
//!             .await?;
//!
//!             // Undone alone if it fails
//!             let _ = tx
//!                 .execute(Propagation::Nested, |points| {
//!                     Box::pin(async move {
//!                         let mut session = points.open_session().await?;
//!                         session.execute("UPDATE loyalty SET points = points + 10").await?;
//!                         Ok(())
//!                     })
//!                 })
//!                 .await;
//!
//!             Ok(())
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **TransactionManager**: wraps a connection provider; shared by all
//!    threads of execution
//! 2. **TransactionContext**: the state of one thread of execution; passed by
//!    `&mut` into every unit of work
//! 3. **TransactionUnit**: begins, commits and ends one transaction, and binds
//!    its connection so sessions share it
//! 4. **OperationRegistry**: records which unit is current while work runs
//!
//! ## Limitations
//!
//! - Only the MySQL provider ships with the crate; other databases plug in
//!   through [`ConnectionProvider`]
//! - Statements go through [`Session::execute`] as plain SQL text

#[cfg(feature = "anyhow")]
pub mod anyhow_compat;
pub mod binding;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod executor;
pub mod manager;
pub mod mysql;
pub mod propagation;
pub mod registry;
pub mod session;
pub mod unit;

#[cfg(test)]
mod mock;

#[cfg(feature = "anyhow")]
pub use anyhow_compat::{with_nested_transaction_anyhow, with_transaction_anyhow};
pub use binding::{BindingDataSource, BindingState, SuppressedConnection};
pub use config::TransactionConfig;
pub use connection::{Connection, ConnectionProvider, SharedConnection};
pub use context::TransactionContext;
pub use error::{BoxError, Error, Result};
pub use executor::{with_nested_transaction, with_new_transaction, with_transaction};
pub use manager::TransactionManager;
pub use mysql::{MySqlProvider, PooledMySqlConnection};
pub use propagation::Propagation;
pub use registry::{OperationRegistry, UnitId};
pub use session::{Session, SessionFactory};
pub use unit::{Savepoint, TransactionUnit};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::context::TransactionContext;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{with_nested_transaction, with_new_transaction, with_transaction};
    pub use crate::manager::TransactionManager;
    pub use crate::propagation::Propagation;
    pub use crate::session::Session;
}

//! # Transactions
//!
//! A [`Transaction`] runs a unit of work against a [`Tx`] and then commits it,
//! or rolls it back if the unit of work fails. Only one transaction per
//! [`Store`] is active at a time: [`Transaction::go`] holds the store's
//! transaction lock from begin until commit or rollback. Starting a second
//! transaction from inside a unit of work fails with [`Error::Begin`] rather
//! than waiting on the lock the thread already holds.
//!
//! Statements used inside the unit of work are rebound to the transactional
//! connection on first use and reused after that. The rebound statements are
//! closed when the unit of work returns, whatever the outcome.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::instrument;

use crate::builder::SqlBuilder;
use crate::driver::{ExecResult, Statement, TxConnection};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::exec::{Executor, Source};
use crate::metadata::{ModelMetadata, Operation};
use crate::model::Model;
use crate::store::Store;
use crate::types::DataType;

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Created, not started.
    Idle,
    /// The unit of work is running.
    Active,
    /// Commit in progress.
    Committing,
    /// Rollback in progress.
    RollingBack,
    /// Finished.
    Closed,
}

/// A unit of work waiting to be run in a transaction.
#[must_use = "a transaction does nothing until `go` is called"]
pub struct Transaction<'s, T, F> {
    store: &'s Store,
    uow: F,
    _result: PhantomData<fn() -> T>,
}

impl<T, F> fmt::Debug for Transaction<'_, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").field("state", &TxState::Idle).finish_non_exhaustive()
    }
}

impl<'s, T, F> Transaction<'s, T, F>
where
    F: FnOnce(&Tx<'_>) -> Result<T>,
{
    pub(crate) const fn new(store: &'s Store, uow: F) -> Self {
        Self {
            store,
            uow,
            _result: PhantomData,
        }
    }

    /// Run the unit of work and commit, or roll back on failure.
    ///
    /// Returns the unit of work's result and `true` if the transaction was
    /// committed. A failed commit is rolled back and reported as
    /// [`Error::Commit`]. A failed rollback is reported as
    /// [`Error::Rollback`].
    #[instrument(skip_all)]
    pub fn go(self) -> (Result<T>, bool) {
        let _guard = match self.store.lock_transactions() {
            Ok(guard) => guard,
            Err(err) => return (Err(err), false),
        };

        let connection = match self.store.connection().begin() {
            Ok(connection) => connection,
            Err(source) => return (Err(Error::Begin(source)), false),
        };

        let tx = Tx {
            store: self.store,
            connection,
            bound: RefCell::default(),
            state: Cell::new(TxState::Idle),
        };
        tx.transition(TxState::Active);

        let result = (self.uow)(&tx);
        tx.release();

        match result {
            Err(err) => {
                tracing::warn!(error = %err, "unit of work failed, rolling back");
                tx.transition(TxState::RollingBack);
                let outcome = match tx.finish().rollback() {
                    Ok(()) => Err(err),
                    Err(source) => Err(Error::Rollback(source)),
                };
                transitioned(TxState::RollingBack, TxState::Closed);
                (outcome, false)
            }
            Ok(value) => {
                tx.transition(TxState::Committing);
                match tx.finish().commit() {
                    Ok(()) => {
                        transitioned(TxState::Committing, TxState::Closed);
                        (Ok(value), true)
                    }
                    Err((connection, source)) => {
                        tracing::warn!(error = %source, "commit failed, rolling back");
                        transitioned(TxState::Committing, TxState::RollingBack);
                        if let Err(rollback) = connection.rollback() {
                            tracing::warn!(error = %rollback, "rollback after failed commit failed");
                        }
                        transitioned(TxState::RollingBack, TxState::Closed);
                        (Err(Error::Commit(source)), false)
                    }
                }
            }
        }
    }
}

fn transitioned(from: TxState, to: TxState) {
    tracing::debug!(?from, ?to, "transaction state");
}

/// The handle a unit of work uses to operate inside its transaction.
pub struct Tx<'s> {
    store: &'s Store,
    connection: Box<dyn TxConnection>,
    bound: RefCell<HashMap<(String, String), Arc<dyn Statement>>>,
    state: Cell<TxState>,
}

impl fmt::Debug for Tx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("state", &self.state.get())
            .field("bound", &self.bound.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<'s> Tx<'s> {
    fn transition(&self, to: TxState) {
        transitioned(self.state.replace(to), to);
    }

    fn finish(self) -> Box<dyn TxConnection> {
        self.connection
    }

    fn release(&self) {
        let mut bound = self.bound.borrow_mut();
        let count = bound.len();
        for (_, statement) in bound.drain() {
            statement.close();
        }
        tracing::debug!(count, "released transaction statements");
    }

    pub(crate) fn bound(
        &self, meta: &ModelMetadata, name: &str, canonical: &Arc<dyn Statement>,
    ) -> Result<Arc<dyn Statement>> {
        let key = (meta.name().to_string(), name.to_string());
        if let Some(statement) = self.bound.borrow().get(&key) {
            return Ok(Arc::clone(statement));
        }

        let statement = self.connection.rebind(canonical.as_ref()).map_err(|source| Error::Execution {
            model: meta.name().to_string(),
            statement: name.to_string(),
            source,
        })?;
        tracing::debug!(model = %meta.name(), statement = name, "rebound statement to transaction");

        self.bound.borrow_mut().insert(key, Arc::clone(&statement));
        Ok(statement)
    }

    pub(crate) fn connection(&self) -> &dyn TxConnection {
        self.connection.as_ref()
    }

    const fn executor(&self) -> Executor<'_> {
        Executor::new(self.store, Source::Transaction(self))
    }

    /// The store the transaction belongs to.
    #[must_use]
    pub const fn store(&self) -> &'s Store {
        self.store
    }

    /// Current lifecycle state. Always [`TxState::Active`] inside a unit of
    /// work.
    #[must_use]
    pub fn state(&self) -> TxState {
        self.state.get()
    }

    /// Number of statements rebound so far.
    #[must_use]
    pub fn bound_statements(&self) -> usize {
        self.bound.borrow().len()
    }

    /// Insert `model` inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn insert<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        self.executor().write(model, Operation::Insert)
    }

    /// Update `model` inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn update<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        self.executor().write(model, Operation::Update)
    }

    /// Delete `model` inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn delete<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        self.executor().write(model, Operation::Delete)
    }

    /// Load a model by key, seeing the transaction's own writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find<M: Model>(&self, keys: &[DataType]) -> Result<Option<M>> {
        self.executor().find(keys)
    }

    /// Load every model, seeing the transaction's own writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_all<M: Model>(&self) -> Result<Vec<M>> {
        self.executor().find_all()
    }

    /// Wrap `model` in an [`Entity`] bound to this transaction.
    #[must_use]
    pub const fn entity<M: Model>(&self, model: M) -> Entity<'_, Self, M> {
        Entity::new(self, model)
    }

    /// A builder for ad-hoc statements over `M`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if `M` was not registered.
    pub fn sql_builder<M: Model>(&self) -> Result<SqlBuilder<'s>> {
        self.store.sql_builder::<M>()
    }

    /// Run an ad-hoc query inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be scanned.
    pub fn query<M: Model>(&self, sql: &str, args: &[DataType]) -> Result<Vec<M>> {
        self.executor().query(sql, args)
    }

    /// Execute an ad-hoc statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if the statement fails.
    pub fn exec(&self, sql: &str, args: &[DataType]) -> Result<ExecResult> {
        self.executor().exec(sql, args)
    }

    /// Execute a named statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingStatement`] if no such statement exists.
    pub fn exec_named<M: Model>(&self, name: &str, args: &[DataType]) -> Result<ExecResult> {
        self.executor().exec_named::<M>(name, args)
    }

    /// Run a named query inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingStatement`] if no such statement exists.
    pub fn query_named<M: Model>(&self, name: &str, args: &[DataType]) -> Result<Vec<M>> {
        self.executor().query_named(name, args)
    }
}

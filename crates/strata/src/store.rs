//! # Store
//!
//! The registry of models and the entry point for every operation.
//!
//! A [`Store`] is built once with a [`StoreBuilder`]. Start-up creates each
//! registered model's table if it is missing and prepares the model's
//! canonical statements. After that the registry is read-only and the store
//! can be shared between threads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use anyhow::anyhow;
use parking_lot::{Mutex, MutexGuard};
use tracing::instrument;

use crate::builder::SqlBuilder;
use crate::dialect::{Dialect, Sqlite};
use crate::driver::{Connection, ExecResult};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::exec::{Executor, Source};
use crate::metadata::{ModelMetadata, Operation};
use crate::model::Model;
use crate::transaction::Transaction;
use crate::types::DataType;

type Register = fn() -> Result<ModelMetadata>;

/// Builds a [`Store`].
pub struct StoreBuilder {
    connection: Arc<dyn Connection>,
    dialect: Box<dyn Dialect>,
    models: Vec<(&'static str, Register)>,
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("dialect", &self.dialect.name())
            .field("models", &self.models.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl StoreBuilder {
    /// Creates a builder over `connection` using the [`Sqlite`] dialect.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            dialect: Box::new(Sqlite),
            models: Vec::new(),
        }
    }

    /// Use `dialect` instead of the default.
    #[must_use]
    pub fn dialect(mut self, dialect: impl Dialect) -> Self {
        self.dialect = Box::new(dialect);
        self
    }

    /// Register a model. Models are bootstrapped in registration order.
    #[must_use]
    pub fn register<M: Model>(mut self) -> Self {
        self.models.push((M::NAME, ModelMetadata::for_model::<M>));
        self
    }

    /// Bootstrap every registered model and return the ready store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid or duplicate model and
    /// [`Error::Prepare`] if a table cannot be created or a statement cannot
    /// be prepared.
    #[instrument(skip_all, fields(dialect = self.dialect.name(), models = self.models.len()))]
    pub fn start(self) -> Result<Store> {
        let mut models = HashMap::with_capacity(self.models.len());

        for (name, register) in self.models {
            if models.contains_key(name) {
                return Err(Error::Config(format!("model {name} is registered twice")));
            }

            let mut meta = register()?;
            bootstrap(self.connection.as_ref(), self.dialect.as_ref(), &mut meta)?;

            let capabilities = meta.capabilities();
            tracing::debug!(model = name, table = %meta.table().name, ?capabilities, "registered model");
            models.insert(name.to_string(), meta);
        }

        Ok(Store {
            connection: self.connection,
            dialect: self.dialect,
            models,
            tx_lock: Mutex::new(()),
            tx_owner: Mutex::new(None),
        })
    }
}

// Create the table and prepare the canonical statements.
fn bootstrap(connection: &dyn Connection, dialect: &dyn Dialect, meta: &mut ModelMetadata) -> Result<()> {
    let (create, statements) = {
        let mut builder = SqlBuilder::new(meta, dialect);
        let create = builder.create().sql();
        let statements = [
            (Operation::Find, builder.select().where_pk().sql()),
            (Operation::FindAll, builder.select().sql()),
            (Operation::Insert, builder.insert().values().sql()),
            (Operation::Update, builder.update().where_pk().sql()),
            (Operation::Delete, builder.delete().where_pk().sql()),
        ];
        (create, statements)
    };

    tracing::debug!(model = %meta.name(), sql = %create, "creating table");
    connection.exec(create.text(), &[]).map_err(|source| Error::Prepare {
        model: meta.name().to_string(),
        statement: "create".to_string(),
        source,
    })?;

    for (op, sql) in statements {
        if op == Operation::Update && !meta.has_update_columns() {
            tracing::warn!(model = %meta.name(), "no updatable columns, skipping update statement");
            continue;
        }
        meta.add_stmt(connection, op.name(), sql.text())?;
    }
    Ok(())
}

/// A bootstrapped registry of models bound to one connection.
pub struct Store {
    connection: Arc<dyn Connection>,
    dialect: Box<dyn Dialect>,
    models: HashMap<String, ModelMetadata>,
    tx_lock: Mutex<()>,
    tx_owner: Mutex<Option<ThreadId>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("connection", &self.connection)
            .field("dialect", &self.dialect.name())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Shorthand for [`StoreBuilder::new`].
    #[must_use]
    pub fn builder(connection: Arc<dyn Connection>) -> StoreBuilder {
        StoreBuilder::new(connection)
    }

    /// The registry entry for `M`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if `M` was not registered.
    pub fn metadata<M: Model>(&self) -> Result<&ModelMetadata> {
        self.models
            .get(M::NAME)
            .filter(|meta| meta.hooks::<M>().is_some())
            .ok_or_else(|| Error::UnknownModel(M::NAME.to_string()))
    }

    /// The dialect statements are rendered in.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub(crate) fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    /// Wait for the transaction lock. Fails instead of waiting when the
    /// calling thread already holds it.
    pub(crate) fn lock_transactions(&self) -> Result<TxLockGuard<'_>> {
        let current = thread::current().id();
        if *self.tx_owner.lock() == Some(current) {
            return Err(Error::Begin(anyhow!("a transaction is already active on this thread")));
        }

        let lock = self.tx_lock.lock();
        *self.tx_owner.lock() = Some(current);
        Ok(TxLockGuard {
            owner: &self.tx_owner,
            _lock: lock,
        })
    }

    const fn executor(&self) -> Executor<'_> {
        Executor::new(self, Source::Registry)
    }

    /// Insert `model`, assigning a generated key back into it.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn insert<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        self.executor().write(model, Operation::Insert)
    }

    /// Update the row matching `model`'s key.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn update<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        self.executor().write(model, Operation::Update)
    }

    /// Delete the row matching `model`'s key.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn delete<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        self.executor().write(model, Operation::Delete)
    }

    /// Load the model with the given key values.
    ///
    /// # Errors
    ///
    /// Returns an error if the key values do not match the model's key or the
    /// query fails.
    pub fn find<M: Model>(&self, keys: &[DataType]) -> Result<Option<M>> {
        self.executor().find(keys)
    }

    /// Load every stored model.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_all<M: Model>(&self) -> Result<Vec<M>> {
        self.executor().find_all()
    }

    /// Wrap `model` in an [`Entity`] bound to this store.
    #[must_use]
    pub const fn entity<M: Model>(&self, model: M) -> Entity<'_, Self, M> {
        Entity::new(self, model)
    }

    /// A builder for ad-hoc statements over `M`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if `M` was not registered.
    pub fn sql_builder<M: Model>(&self) -> Result<SqlBuilder<'_>> {
        Ok(SqlBuilder::new(self.metadata::<M>()?, self.dialect()))
    }

    /// Run an ad-hoc query and materialize its rows as `M`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be scanned.
    pub fn query<M: Model>(&self, sql: &str, args: &[DataType]) -> Result<Vec<M>> {
        self.executor().query(sql, args)
    }

    /// Execute an ad-hoc statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if the statement fails.
    pub fn exec(&self, sql: &str, args: &[DataType]) -> Result<ExecResult> {
        self.executor().exec(sql, args)
    }

    /// Prepare `sql` and register it for `M` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `name` is one of the canonical statement
    /// names and [`Error::Prepare`] if the statement cannot be prepared.
    pub fn add_statement<M: Model>(&mut self, name: &str, sql: &str) -> Result<()> {
        if Operation::is_canonical(name) {
            return Err(Error::Config(format!("statement name {name} is reserved")));
        }
        self.metadata::<M>()?;

        let connection = Arc::clone(&self.connection);
        let meta = self
            .models
            .get_mut(M::NAME)
            .ok_or_else(|| Error::UnknownModel(M::NAME.to_string()))?;
        meta.add_stmt(connection.as_ref(), name, sql)
    }

    /// Execute the statement registered for `M` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingStatement`] if no such statement exists and
    /// [`Error::Bind`] if `args` does not match its placeholders.
    pub fn exec_named<M: Model>(&self, name: &str, args: &[DataType]) -> Result<ExecResult> {
        self.executor().exec_named::<M>(name, args)
    }

    /// Run the statement registered for `M` under `name` and materialize its
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingStatement`] if no such statement exists and
    /// [`Error::Bind`] if `args` does not match its placeholders.
    pub fn query_named<M: Model>(&self, name: &str, args: &[DataType]) -> Result<Vec<M>> {
        self.executor().query_named(name, args)
    }

    /// Prepare a transaction running `uow`. Nothing happens until
    /// [`Transaction::go`] is called.
    pub fn begin<T, F>(&self, uow: F) -> Transaction<'_, T, F>
    where
        F: FnOnce(&crate::Tx<'_>) -> Result<T>,
    {
        Transaction::new(self, uow)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        for meta in self.models.values() {
            meta.close_statements();
        }
    }
}

/// Holds the store's transaction lock and records the owning thread.
pub(crate) struct TxLockGuard<'s> {
    owner: &'s Mutex<Option<ThreadId>>,
    _lock: MutexGuard<'s, ()>,
}

impl Drop for TxLockGuard<'_> {
    fn drop(&mut self) {
        // cleared before the lock is released
        *self.owner.lock() = None;
    }
}

//! # Execution
//!
//! Turns a model and an operation into hook calls, statement execution and
//! generated-key propagation, in that order:
//!
//! 1. run the pre-operation hook; a failure aborts before the store is touched
//! 2. resolve the canonical statement, rebound to the transaction if there is
//!    one
//! 3. derive the bind arguments from the model
//! 4. execute
//! 5. on insert, assign a generated key to an auto-increment first key
//! 6. run the post-operation hook

use std::sync::Arc;

use crate::driver::{ExecResult, Statement};
use crate::error::{Error, Result};
use crate::metadata::{ModelMetadata, Operation};
use crate::model::{Model, Stage};
use crate::store::Store;
use crate::transaction::Tx;
use crate::types::{DataType, Row, Scalar};

/// Where statements are resolved from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// The store's own prepared statements.
    Registry,
    /// Statements rebound to a running transaction.
    Transaction(&'a Tx<'a>),
}

#[derive(Debug)]
pub(crate) struct Executor<'a> {
    store: &'a Store,
    source: Source<'a>,
}

impl<'a> Executor<'a> {
    pub(crate) const fn new(store: &'a Store, source: Source<'a>) -> Self {
        Self { store, source }
    }

    fn resolve(&self, meta: &ModelMetadata, name: &str) -> Result<Arc<dyn Statement>> {
        let canonical = meta.statement(name).ok_or_else(|| Error::MissingStatement {
            model: meta.name().to_string(),
            statement: name.to_string(),
        })?;

        match self.source {
            Source::Registry => Ok(Arc::clone(canonical)),
            Source::Transaction(tx) => tx.bound(meta, name, canonical),
        }
    }

    pub(crate) fn write<M: Model>(&self, model: &mut M, op: Operation) -> Result<ExecResult> {
        let meta = self.store.metadata::<M>()?;
        let hooks = meta.hooks::<M>().copied().unwrap_or_default();

        if let Some(hook) = hooks.get(op, Stage::Pre) {
            hook(model).map_err(|source| Error::Hook {
                model: meta.name().to_string(),
                hook: hook_name(op, Stage::Pre),
                source,
            })?;
        }

        let statement = self.resolve(meta, op.name())?;
        let args = meta.bind_args(op, &values(model))?;
        let result = execute(meta, op.name(), statement.as_ref(), &args)?;

        if op == Operation::Insert {
            assign_generated(meta, model, &result);
        }

        if let Some(hook) = hooks.get(op, Stage::Post) {
            hook(model).map_err(|source| Error::PostHook {
                model: meta.name().to_string(),
                hook: hook_name(op, Stage::Post),
                result,
                source,
            })?;
        }

        Ok(result)
    }

    pub(crate) fn find<M: Model>(&self, keys: &[DataType]) -> Result<Option<M>> {
        let meta = self.store.metadata::<M>()?;
        let statement = self.resolve(meta, Operation::Find.name())?;

        let rows = query(meta, Operation::Find.name(), statement.as_ref(), keys)?;
        Ok(materialize(meta, rows)?.into_iter().next())
    }

    pub(crate) fn find_all<M: Model>(&self) -> Result<Vec<M>> {
        let meta = self.store.metadata::<M>()?;
        let statement = self.resolve(meta, Operation::FindAll.name())?;

        let rows = query(meta, Operation::FindAll.name(), statement.as_ref(), &[])?;
        materialize(meta, rows)
    }

    pub(crate) fn exec_named<M: Model>(&self, name: &str, args: &[DataType]) -> Result<ExecResult> {
        let meta = self.store.metadata::<M>()?;
        let statement = self.resolve(meta, name)?;
        execute(meta, name, statement.as_ref(), args)
    }

    pub(crate) fn query_named<M: Model>(&self, name: &str, args: &[DataType]) -> Result<Vec<M>> {
        let meta = self.store.metadata::<M>()?;
        let statement = self.resolve(meta, name)?;
        let rows = query(meta, name, statement.as_ref(), args)?;
        materialize(meta, rows)
    }

    pub(crate) fn query<M: Model>(&self, sql: &str, args: &[DataType]) -> Result<Vec<M>> {
        let meta = self.store.metadata::<M>()?;
        tracing::debug!(model = %meta.name(), sql = %sql, param_count = args.len(), "running query");

        let rows = match self.source {
            Source::Registry => self.store.connection().query(sql, args),
            Source::Transaction(tx) => tx.connection().query(sql, args),
        }
        .map_err(|source| Error::Execution {
            model: meta.name().to_string(),
            statement: sql.to_string(),
            source,
        })?;
        materialize(meta, rows)
    }

    pub(crate) fn exec(&self, sql: &str, args: &[DataType]) -> Result<ExecResult> {
        tracing::debug!(sql = %sql, param_count = args.len(), "executing statement");

        match self.source {
            Source::Registry => self.store.connection().exec(sql, args),
            Source::Transaction(tx) => tx.connection().exec(sql, args),
        }
        .map_err(|source| Error::Execution {
            model: "(none)".to_string(),
            statement: sql.to_string(),
            source,
        })
    }
}

// Keys then parameters, matching the column order of the registry.
fn values<M: Model>(model: &M) -> Vec<&dyn Scalar> {
    let mut values = model.keys();
    values.extend(model.parameters());
    values
}

fn check_arity(meta: &ModelMetadata, name: &str, statement: &dyn Statement, args: &[DataType]) -> Result<()> {
    let expected = statement.param_count();
    if expected != args.len() {
        return Err(Error::Bind {
            model: meta.name().to_string(),
            statement: name.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn execute(meta: &ModelMetadata, name: &str, statement: &dyn Statement, args: &[DataType]) -> Result<ExecResult> {
    check_arity(meta, name, statement, args)?;
    tracing::debug!(
        model = %meta.name(),
        table = %meta.table().name,
        statement = name,
        sql = %statement.sql(),
        param_count = args.len(),
        "executing statement"
    );

    statement.exec(args).map_err(|source| Error::Execution {
        model: meta.name().to_string(),
        statement: name.to_string(),
        source,
    })
}

fn query(meta: &ModelMetadata, name: &str, statement: &dyn Statement, args: &[DataType]) -> Result<Vec<Row>> {
    check_arity(meta, name, statement, args)?;
    tracing::debug!(
        model = %meta.name(),
        table = %meta.table().name,
        statement = name,
        sql = %statement.sql(),
        param_count = args.len(),
        "running query"
    );

    statement.query(args).map_err(|source| Error::Execution {
        model: meta.name().to_string(),
        statement: name.to_string(),
        source,
    })
}

fn assign_generated<M: Model>(meta: &ModelMetadata, model: &mut M, result: &ExecResult) {
    let Some(id) = result.last_insert_id else {
        return;
    };
    if !meta.key_by_index(0).is_some_and(|key| key.auto_increment) {
        return;
    }

    if let Some(slot) = model.slots_mut().into_iter().next()
        && slot.assign_generated(id)
    {
        tracing::debug!(model = %meta.name(), id, "assigned generated key");
    }
}

/// Build one model per row. Each column is read from the field of the same
/// name and stays `NULL` when the row has no such field. Rows whose fields
/// carry no names are read by position instead.
pub(crate) fn materialize<M: Model>(meta: &ModelMetadata, rows: Vec<Row>) -> Result<Vec<M>> {
    rows.into_iter()
        .map(|row| {
            let mut model = M::blank();
            let named = row.has_names();
            for (index, (column, slot)) in meta.columns().iter().zip(model.slots_mut()).enumerate() {
                let field = if named { row.get(&column.name) } else { row.get_index(index) };
                let Some(value) = field else {
                    continue;
                };
                slot.scan(value).map_err(|source| Error::Scan {
                    model: meta.name().to_string(),
                    column: column.name.clone(),
                    source,
                })?;
            }
            Ok(model)
        })
        .collect()
}

const fn hook_name(op: Operation, stage: Stage) -> &'static str {
    match (op, stage) {
        (Operation::Insert, Stage::Pre) => "pre-insert",
        (Operation::Insert, Stage::Post) => "post-insert",
        (Operation::Update, Stage::Pre) => "pre-update",
        (Operation::Update, Stage::Post) => "post-update",
        (Operation::Delete, Stage::Pre) => "pre-delete",
        (Operation::Delete, Stage::Post) => "post-delete",
        (Operation::Find, _) => "find",
        (Operation::FindAll, _) => "findAll",
    }
}

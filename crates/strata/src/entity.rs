//! # Entities
//!
//! An [`Entity`] pairs a model with the [`ActiveRecord`] it is persisted
//! through, either the [`Store`] itself or a running [`Tx`].

use std::fmt::{self, Display};

use crate::driver::ExecResult;
use crate::error::Result;
use crate::model::Model;
use crate::store::Store;
use crate::transaction::Tx;
use crate::types::DataType;

/// Persistence operations shared by the store and its transactions.
pub trait ActiveRecord {
    /// Insert `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    fn insert<M: Model>(&self, model: &mut M) -> Result<ExecResult>;

    /// Update `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    fn update<M: Model>(&self, model: &mut M) -> Result<ExecResult>;

    /// Delete `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    fn delete<M: Model>(&self, model: &mut M) -> Result<ExecResult>;

    /// Load a model by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find<M: Model>(&self, keys: &[DataType]) -> Result<Option<M>>;

    /// Load every model.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_all<M: Model>(&self) -> Result<Vec<M>>;
}

impl ActiveRecord for Store {
    fn insert<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        Self::insert(self, model)
    }

    fn update<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        Self::update(self, model)
    }

    fn delete<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        Self::delete(self, model)
    }

    fn find<M: Model>(&self, keys: &[DataType]) -> Result<Option<M>> {
        Self::find(self, keys)
    }

    fn find_all<M: Model>(&self) -> Result<Vec<M>> {
        Self::find_all(self)
    }
}

impl ActiveRecord for Tx<'_> {
    fn insert<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        Self::insert(self, model)
    }

    fn update<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        Self::update(self, model)
    }

    fn delete<M: Model>(&self, model: &mut M) -> Result<ExecResult> {
        Self::delete(self, model)
    }

    fn find<M: Model>(&self, keys: &[DataType]) -> Result<Option<M>> {
        Self::find(self, keys)
    }

    fn find_all<M: Model>(&self) -> Result<Vec<M>> {
        Self::find_all(self)
    }
}

/// A model bound to the record it is persisted through.
#[derive(Debug)]
pub struct Entity<'r, R, M> {
    record: &'r R,
    model: M,
}

impl<'r, R: ActiveRecord, M: Model> Entity<'r, R, M> {
    /// Bind `model` to `record`.
    pub const fn new(record: &'r R, model: M) -> Self {
        Self { record, model }
    }

    /// The wrapped model.
    pub const fn model(&self) -> &M {
        &self.model
    }

    /// The wrapped model, mutably.
    pub const fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Unwrap the model.
    pub fn into_inner(self) -> M {
        self.model
    }

    /// Insert the model. A generated key is written back into it.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn insert(&mut self) -> Result<ExecResult> {
        self.record.insert(&mut self.model)
    }

    /// Write the model's current values over its stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn save(&mut self) -> Result<ExecResult> {
        self.record.update(&mut self.model)
    }

    /// Delete the model's stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the statement fails.
    pub fn delete(&mut self) -> Result<ExecResult> {
        self.record.delete(&mut self.model)
    }
}

impl<R, M: Model> Display for Entity<'_, R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", M::NAME)?;
        let keys = self.model.keys();
        let parameters = self.model.parameters();
        for (i, value) in keys.iter().chain(parameters.iter()).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

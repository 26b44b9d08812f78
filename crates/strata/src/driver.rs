//! # Driver
//!
//! The seam between the store and a concrete SQL database. A driver hands out
//! a [`Connection`] that can prepare [`Statement`]s and open transactional
//! connections ([`TxConnection`]). Statements prepared on the connection are
//! rebound onto the transactional connection before being used inside a
//! transaction.
//!
//! Driver methods return [`anyhow::Result`]; the store wraps failures in its
//! own [`Error`](crate::Error) variants.

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use anyhow::Result;

use crate::types::{DataType, Row};

/// The outcome of executing a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows changed by the statement.
    pub rows_affected: u64,

    /// Key generated by the store, when the statement produced one.
    pub last_insert_id: Option<i64>,
}

impl Display for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_insert_id {
            Some(id) => write!(f, "Last insert: {id}; Rows affected: {}", self.rows_affected),
            None => write!(f, "Last insert: none; Rows affected: {}", self.rows_affected),
        }
    }
}

/// A database connection shared by every non-transactional operation.
pub trait Connection: Debug + Send + Sync + 'static {
    /// Prepare a statement for repeated use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database rejects the statement.
    fn prepare(&self, sql: &str) -> Result<Arc<dyn Statement>>;

    /// Execute a one-off statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn exec(&self, sql: &str, params: &[DataType]) -> Result<ExecResult>;

    /// Run a one-off query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>>;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database refuses to start a transaction.
    fn begin(&self) -> Result<Box<dyn TxConnection>>;
}

/// A prepared statement.
pub trait Statement: Debug + Send + Sync {
    /// The SQL text the statement was prepared from.
    fn sql(&self) -> &str;

    /// Number of placeholders in the statement.
    fn param_count(&self) -> usize;

    /// Execute the statement.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    fn exec(&self, params: &[DataType]) -> Result<ExecResult>;

    /// Run the statement as a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, params: &[DataType]) -> Result<Vec<Row>>;

    /// Release any resources held by the statement. Idempotent.
    fn close(&self) {}
}

/// A connection with an open transaction.
///
/// Consumed by [`TxConnection::commit`] or [`TxConnection::rollback`].
pub trait TxConnection: Debug + Send {
    /// Bind a statement prepared on the shared connection to this
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared on the
    /// transactional connection.
    fn rebind(&self, statement: &dyn Statement) -> Result<Arc<dyn Statement>>;

    /// Execute a one-off statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn exec(&self, sql: &str, params: &[DataType]) -> Result<ExecResult>;

    /// Run a one-off query inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>>;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails. The transaction is then still
    /// open and must be rolled back by the caller.
    fn commit(self: Box<Self>) -> Result<(), (Box<dyn TxConnection>, anyhow::Error)>;

    /// Roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_result_display() {
        let inserted = ExecResult {
            rows_affected: 1,
            last_insert_id: Some(12),
        };
        assert_eq!(inserted.to_string(), "Last insert: 12; Rows affected: 1");

        let updated = ExecResult {
            rows_affected: 3,
            last_insert_id: None,
        };
        assert_eq!(updated.to_string(), "Last insert: none; Rows affected: 3");
    }
}

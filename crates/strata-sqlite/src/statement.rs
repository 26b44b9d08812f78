//! Prepared statements and value conversion.

#![allow(clippy::significant_drop_tightening)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection as SqliteConnection, params_from_iter};
use strata::{DataType, ExecResult, Field, Row, Statement};

/// A statement prepared on a `SQLite` connection.
///
/// The compiled statement lives in the connection's statement cache; this
/// handle keeps its text and placeholder count.
#[derive(Debug)]
pub struct SqliteStatement {
    conn: Arc<Mutex<SqliteConnection>>,
    sql: String,
    param_count: usize,
    closed: AtomicBool,
}

impl SqliteStatement {
    /// Compile `sql` on `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` rejects the statement.
    pub fn prepare(conn: Arc<Mutex<SqliteConnection>>, sql: &str) -> Result<Self> {
        let param_count = {
            let guard = conn.lock();
            let stmt = guard.prepare_cached(sql).context("failed to prepare statement")?;
            stmt.parameter_count()
        };

        Ok(Self {
            conn,
            sql: sql.to_string(),
            param_count,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("statement is closed: {}", self.sql);
        }
        Ok(())
    }
}

impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn param_count(&self) -> usize {
        self.param_count
    }

    fn exec(&self, params: &[DataType]) -> Result<ExecResult> {
        self.check_open()?;
        exec(&self.conn.lock(), &self.sql, params)
    }

    fn query(&self, params: &[DataType]) -> Result<Vec<Row>> {
        self.check_open()?;
        query(&self.conn.lock(), &self.sql, params)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

pub(crate) fn exec(conn: &SqliteConnection, sql: &str, params: &[DataType]) -> Result<ExecResult> {
    tracing::debug!("executing statement: {}", sql);

    let mut stmt = conn.prepare_cached(sql).context("failed to prepare statement")?;
    let rusqlite_params: Vec<_> = params.iter().map(datatype_to_rusqlite_value).collect();

    let rows_affected =
        stmt.execute(params_from_iter(rusqlite_params.iter())).context("failed to execute statement")?;

    Ok(ExecResult {
        rows_affected: rows_affected as u64,
        last_insert_id: is_insert(sql).then(|| conn.last_insert_rowid()),
    })
}

pub(crate) fn query(conn: &SqliteConnection, sql: &str, params: &[DataType]) -> Result<Vec<Row>> {
    tracing::debug!("executing query: {}", sql);

    let mut stmt = conn.prepare_cached(sql).context("failed to prepare statement")?;
    let rusqlite_params: Vec<_> = params.iter().map(datatype_to_rusqlite_value).collect();

    let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

    let mut rows =
        stmt.query(params_from_iter(rusqlite_params.iter())).context("failed to execute query")?;

    let mut result_rows = Vec::new();
    while let Some(row) = rows.next().context("failed to fetch row")? {
        let mut fields = Vec::with_capacity(column_names.len());

        for (i, name) in column_names.iter().enumerate() {
            let value = row.get_ref(i).context("failed to get column value")?;
            fields.push(Field {
                name: name.clone(),
                value: rusqlite_value_to_datatype(value)?,
            });
        }

        result_rows.push(Row { fields });
    }

    Ok(result_rows)
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start().get(..6).is_some_and(|verb| verb.eq_ignore_ascii_case("insert"))
}

fn datatype_to_rusqlite_value(dt: &DataType) -> Value {
    match dt {
        DataType::Boolean(Some(b)) => Value::Integer(i64::from(*b)),
        DataType::Int64(Some(i)) => Value::Integer(*i),
        DataType::Double(Some(f)) => Value::Real(*f),
        DataType::Str(Some(s)) | DataType::Timestamp(Some(s)) => Value::Text(s.clone()),
        DataType::Binary(Some(b)) => Value::Blob(b.clone()),
        // All None variants map to NULL
        _ => Value::Null,
    }
}

fn rusqlite_value_to_datatype(value: ValueRef) -> Result<DataType> {
    match value {
        ValueRef::Null => Ok(DataType::NULL),
        ValueRef::Integer(i) => Ok(DataType::Int64(Some(i))),
        ValueRef::Real(f) => Ok(DataType::Double(Some(f))),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(DataType::Str(Some(s.to_string())))
        }
        ValueRef::Blob(b) => Ok(DataType::Binary(Some(b.to_vec()))),
    }
}

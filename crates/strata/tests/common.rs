//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use anyhow::{Result, anyhow, bail};
use parking_lot::Mutex;
use strata::{
    AutoIncrement, ColumnSpec, Connection, DataType, ExecResult, Hooks, Int64, Row, Statement, Str,
    TxConnection, model,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

model! {
    name = "domain.Person",
    table = "people",
    #[derive(Debug, Clone, PartialEq)]
    pub struct Person {
        keys {
            pub id: AutoIncrement = ColumnSpec::new().name("Id"),
        }
        columns {
            pub name: Str = ColumnSpec::new().name("Name"),
            pub age: Int64 = ColumnSpec::new().name("Age"),
        }
    }
}

impl Person {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            id: AutoIncrement::null(),
            name: Str::new(name),
            age: Int64::new(age),
        }
    }
}

model! {
    name = "domain.Audited",
    table = "audited",
    hooks = Hooks::new()
        .pre_insert(mark_pre)
        .post_insert(mark_post)
        .pre_update(mark_pre)
        .post_update(refuse)
        .pre_delete(refuse),
    #[derive(Debug, Clone)]
    pub struct Audited {
        keys {
            pub code: Str,
        }
        columns {
            pub trail: Str,
        }
    }
}

fn append(model: &mut Audited, mark: &str) {
    let mut trail = model.trail.get().cloned().unwrap_or_default();
    trail.push_str(mark);
    model.trail.set(trail);
}

#[allow(clippy::unnecessary_wraps)]
fn mark_pre(model: &mut Audited) -> anyhow::Result<()> {
    append(model, "pre;");
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn mark_post(model: &mut Audited) -> anyhow::Result<()> {
    append(model, "post;");
    Ok(())
}

fn refuse(_: &mut Audited) -> anyhow::Result<()> {
    bail!("refused")
}

/// Assert `sql` contains `needle` after identifier quotes are removed.
pub fn assert_sql_contains(sql: &str, needle: &str) {
    let cleaned = sql.replace('"', "");
    assert!(cleaned.contains(needle), "expected `{needle}` in `{cleaned}`");
}

/// What the mock driver saw, shared between the connection, its statements
/// and its transactions.
#[derive(Debug, Default)]
pub struct Recorder {
    log: Mutex<Vec<String>>,
    args: Mutex<Vec<(String, Vec<DataType>)>>,
    rows: Mutex<Vec<Row>>,
    next_id: AtomicI64,
    fail_commit: AtomicBool,
    fail_exec: AtomicBool,
    fail_prepare: Mutex<Option<String>>,
}

impl Recorder {
    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|entry| entry.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
        self.args.lock().clear();
    }

    /// Arguments bound for every execution, with the SQL they were bound to.
    pub fn args(&self) -> Vec<(String, Vec<DataType>)> {
        self.args.lock().clone()
    }

    /// Rows every query returns.
    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock() = rows;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_exec(&self, fail: bool) {
        self.fail_exec.store(fail, Ordering::SeqCst);
    }

    /// Refuse to prepare any statement containing `fragment`.
    pub fn fail_prepare(&self, fragment: &str) {
        *self.fail_prepare.lock() = Some(fragment.to_string());
    }

    fn exec(&self, origin: &str, sql: &str, params: &[DataType]) -> Result<ExecResult> {
        self.record(format!("{origin} exec: {sql}"));
        if self.fail_exec.load(Ordering::SeqCst) {
            bail!("execution refused");
        }
        self.args.lock().push((sql.to_string(), params.to_vec()));

        let last_insert_id =
            sql.starts_with("INSERT").then(|| self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let rows_affected = u64::from(!sql.starts_with("CREATE"));
        Ok(ExecResult {
            rows_affected,
            last_insert_id,
        })
    }

    fn query(&self, origin: &str, sql: &str, params: &[DataType]) -> Vec<Row> {
        self.record(format!("{origin} query: {sql}"));
        self.args.lock().push((sql.to_string(), params.to_vec()));
        self.rows.lock().clone()
    }
}

/// A driver that records every call instead of talking to a database.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    pub recorder: Arc<Recorder>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn Connection> {
        Arc::new(self.clone())
    }
}

impl Connection for MockConnection {
    fn prepare(&self, sql: &str) -> Result<Arc<dyn Statement>> {
        if let Some(fragment) = self.recorder.fail_prepare.lock().as_deref()
            && sql.contains(fragment)
        {
            bail!("syntax error near {fragment}");
        }
        self.recorder.record(format!("prepare: {sql}"));
        Ok(Arc::new(MockStatement::new("store", sql, Arc::clone(&self.recorder))))
    }

    fn exec(&self, sql: &str, params: &[DataType]) -> Result<ExecResult> {
        self.recorder.exec("store", sql, params)
    }

    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>> {
        Ok(self.recorder.query("store", sql, params))
    }

    fn begin(&self) -> Result<Box<dyn TxConnection>> {
        self.recorder.record("begin".to_string());
        Ok(Box::new(MockTx {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

#[derive(Debug)]
pub struct MockStatement {
    origin: &'static str,
    sql: String,
    params: usize,
    closed: AtomicBool,
    recorder: Arc<Recorder>,
}

impl MockStatement {
    fn new(origin: &'static str, sql: &str, recorder: Arc<Recorder>) -> Self {
        Self {
            origin,
            sql: sql.to_string(),
            params: sql.matches('?').count(),
            closed: AtomicBool::new(false),
            recorder,
        }
    }
}

impl Statement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn param_count(&self) -> usize {
        self.params
    }

    fn exec(&self, params: &[DataType]) -> Result<ExecResult> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("statement is closed");
        }
        self.recorder.exec(self.origin, &self.sql, params)
    }

    fn query(&self, params: &[DataType]) -> Result<Vec<Row>> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("statement is closed");
        }
        Ok(self.recorder.query(self.origin, &self.sql, params))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.recorder.record(format!("{} close: {}", self.origin, self.sql));
        }
    }
}

#[derive(Debug)]
struct MockTx {
    recorder: Arc<Recorder>,
}

impl TxConnection for MockTx {
    fn rebind(&self, statement: &dyn Statement) -> Result<Arc<dyn Statement>> {
        self.recorder.record(format!("rebind: {}", statement.sql()));
        Ok(Arc::new(MockStatement::new("tx", statement.sql(), Arc::clone(&self.recorder))))
    }

    fn exec(&self, sql: &str, params: &[DataType]) -> Result<ExecResult> {
        self.recorder.exec("tx", sql, params)
    }

    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>> {
        Ok(self.recorder.query("tx", sql, params))
    }

    fn commit(self: Box<Self>) -> Result<(), (Box<dyn TxConnection>, anyhow::Error)> {
        if self.recorder.fail_commit.load(Ordering::SeqCst) {
            self.recorder.record("commit failed".to_string());
            let tx: Box<dyn TxConnection> = self;
            return Err((tx, anyhow!("database is locked")));
        }
        self.recorder.record("commit".to_string());
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.recorder.record("rollback".to_string());
        Ok(())
    }
}

/// A row shaped like the `people` table.
pub fn person_row(id: i64, name: &str, age: i64) -> Row {
    Row {
        fields: vec![
            strata::Field {
                name: "Id".to_string(),
                value: DataType::from(id),
            },
            strata::Field {
                name: "Name".to_string(),
                value: DataType::from(name),
            },
            strata::Field {
                name: "Age".to_string(),
                value: DataType::from(age),
            },
        ],
    }
}

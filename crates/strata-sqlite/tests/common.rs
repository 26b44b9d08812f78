//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use strata::{
    AutoIncrement, Backend, Blob, Bool, ColumnSpec, Connection, DataType, Float64, Hooks, Int64, Pointer, Store,
    Str, StoreBuilder, Time, model,
};
use strata_sqlite::{ConnectOptions, SqliteBackend};
use tempfile::TempDir;
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
        }
    }
}

impl Person {
    pub fn new(name: &str) -> Self {
        Self {
            id: AutoIncrement::null(),
            name: Str::new(name),
        }
    }
}

model! {
    name = "catalog.Product",
    table = "products",
    #[derive(Debug, Clone, PartialEq)]
    pub struct Product {
        keys {
            pub sku: Str = ColumnSpec::new().length(16),
        }
        columns {
            pub label: Str = ColumnSpec::new().name("Label").nilable(false),
            pub email: Str = ColumnSpec::new().unique(true),
            pub price: Float64 = ColumnSpec::new().precision(10).scale(2),
            pub views: Int64 = ColumnSpec::new().insertable(false),
            pub origin: Str = ColumnSpec::new().updatable(false),
            pub listed: Bool,
            pub added: Time,
            pub thumbnail: Blob,
            pub maker: Pointer,
        }
    }
}

impl Product {
    pub fn new(sku: &str, label: &str, email: &str) -> Self {
        Self {
            sku: Str::new(sku),
            label: Str::new(label),
            email: Str::new(email),
            price: Float64::null(),
            views: Int64::null(),
            origin: Str::null(),
            listed: Bool::null(),
            added: Time::null(),
            thumbnail: Blob::null(),
            maker: Pointer::null(),
        }
    }
}

model! {
    name = "ledger.Entry",
    table = "entries",
    hooks = Hooks::new().pre_insert(normalize).pre_update(normalize).post_delete(forget),
    #[derive(Debug, Clone, PartialEq)]
    pub struct Entry {
        keys {
            pub account: Str,
            pub seq: Int64,
        }
        columns {
            pub memo: Str,
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn normalize(entry: &mut Entry) -> anyhow::Result<()> {
    if let Some(memo) = entry.memo.get() {
        let trimmed = memo.trim().to_lowercase();
        entry.memo.set(trimmed);
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn forget(entry: &mut Entry) -> anyhow::Result<()> {
    entry.memo.clear();
    Ok(())
}

/// A database file in a temporary directory, removed on drop.
pub struct TestDb {
    pub backend: SqliteBackend,
    _dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("temp dir");
        let database = dir.path().join("strata.db").to_string_lossy().into_owned();
        let backend = SqliteBackend::connect_with(ConnectOptions { database }).expect("connect");
        Self { backend, _dir: dir }
    }

    pub fn builder(&self) -> StoreBuilder {
        Store::builder(self.backend.clone().into_connection())
    }

    pub fn store(&self) -> Store {
        self.builder()
            .register::<Person>()
            .register::<Product>()
            .register::<Entry>()
            .start()
            .expect("start")
    }

    /// The `CREATE TABLE` text `SQLite` kept for `table`.
    pub fn table_sql(&self, table: &str) -> String {
        let rows = self
            .backend
            .query("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?", &[DataType::from(table)])
            .expect("query schema");
        match rows.first().and_then(|row| row.get("sql")) {
            Some(DataType::Str(Some(sql))) => sql.clone(),
            other => panic!("no schema for {table}: {other:?}"),
        }
    }
}

/// Names of every stored person, sorted.
pub fn names(people: &[Person]) -> Vec<String> {
    let mut names: Vec<String> = people.iter().filter_map(|p| p.name.get().cloned()).collect();
    names.sort();
    names
}

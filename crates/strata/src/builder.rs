//! # SQL builder
//!
//! [`SqlBuilder`] composes statement text for one model in one dialect. It
//! only produces text; nothing is executed.
//!
//! ```rust,ignore
//! let sql = store.sql_builder::<Person>()?.select().where_pk().sql();
//! assert_eq!(sql.text(), r#"SELECT * FROM "people" WHERE "Id" = ?"#);
//! ```

use std::fmt::{self, Display};

use crate::dialect::Dialect;
use crate::metadata::ModelMetadata;

/// Finished statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sql {
    text: String,
    binds: usize,
}

impl Sql {
    /// The statement text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of placeholders in the statement.
    #[must_use]
    pub const fn binds(&self) -> usize {
        self.binds
    }
}

impl Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Sql {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Append-only statement builder bound to a model and a dialect.
#[derive(Debug)]
pub struct SqlBuilder<'a> {
    meta: &'a ModelMetadata,
    dialect: &'a dyn Dialect,
    buf: String,
    binds: usize,
}

impl<'a> SqlBuilder<'a> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(meta: &'a ModelMetadata, dialect: &'a dyn Dialect) -> Self {
        Self {
            meta,
            dialect,
            buf: String::new(),
            binds: 0,
        }
    }

    /// The dialect the builder renders for.
    #[must_use]
    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Append raw text.
    pub fn add(&mut self, text: &str) -> &mut Self {
        self.buf.push_str(text);
        self
    }

    /// Append an identifier, quoted for the dialect.
    pub fn identifier(&mut self, name: &str) -> &mut Self {
        let encoded = self.dialect.encode_identifier(name);
        self.add(&encoded)
    }

    /// Append the next bind placeholder.
    pub fn bind(&mut self) -> &mut Self {
        self.binds += 1;
        let placeholder = self.dialect.placeholder(self.binds);
        self.add(&placeholder)
    }

    fn table(&mut self) -> &mut Self {
        let meta = self.meta;
        self.identifier(&meta.table().name)
    }

    /// `CREATE TABLE IF NOT EXISTS <table> (<columns with constraints>)`
    pub fn create(&mut self) -> &mut Self {
        let meta = self.meta;
        self.add("CREATE TABLE IF NOT EXISTS ").table().add(" (");
        meta.column_list_with_constraints(self);
        self.add(")")
    }

    /// `SELECT * FROM <table>`
    pub fn select(&mut self) -> &mut Self {
        self.add("SELECT * FROM ").table()
    }

    /// `INSERT INTO <table> (<insert columns>)`
    ///
    /// The column list is omitted when the model has no insert column; follow
    /// with [`SqlBuilder::values`] in both cases.
    pub fn insert(&mut self) -> &mut Self {
        let meta = self.meta;
        self.add("INSERT INTO ").table();
        if meta.has_insert_columns() {
            self.add(" (");
            meta.columns_list(self);
            self.add(")");
        }
        self
    }

    /// ` VALUES (?, ...)`, or ` DEFAULT VALUES` when there is no insert
    /// column.
    pub fn values(&mut self) -> &mut Self {
        let meta = self.meta;
        if !meta.has_insert_columns() {
            return self.add(" DEFAULT VALUES");
        }
        self.add(" VALUES (");
        meta.columns_bind_list(self);
        self.add(")")
    }

    /// `UPDATE <table> SET <col> = ?, ...`
    pub fn update(&mut self) -> &mut Self {
        let meta = self.meta;
        self.add("UPDATE ").table().add(" SET ");
        meta.non_key_list_equals_non_key_bind_list(self);
        self
    }

    /// `DELETE FROM <table>`
    pub fn delete(&mut self) -> &mut Self {
        self.add("DELETE FROM ").table()
    }

    /// ` WHERE <key> = ? AND ...`
    pub fn where_pk(&mut self) -> &mut Self {
        let meta = self.meta;
        self.add(" WHERE ");
        meta.key_list_equals_key_bind_list(self);
        self
    }

    /// ` WHERE <column> = ? AND ...` over every column.
    pub fn where_all(&mut self) -> &mut Self {
        let meta = self.meta;
        self.add(" WHERE ");
        meta.columns_list_equals_columns_bind_list(self);
        self
    }

    /// Drop the last `n` bytes of the buffer.
    pub fn truncate(&mut self, n: usize) -> &mut Self {
        let len = self.buf.len().saturating_sub(n);
        self.buf.truncate(len);
        self
    }

    /// Freeze the buffer into a [`Sql`] and reset the builder.
    pub fn sql(&mut self) -> Sql {
        let sql = Sql {
            text: std::mem::take(&mut self.buf),
            binds: self.binds,
        };
        self.binds = 0;
        sql
    }
}

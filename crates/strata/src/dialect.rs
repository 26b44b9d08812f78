//! # Dialects
//!
//! A [`Dialect`] adapts generated SQL to a particular database: how
//! identifiers are quoted, how column types are declared, how an integer
//! primary key is written inline and which bind placeholder is used.
//!
//! Dialects are pure. They never touch the database.

use std::fmt::Debug;

use sea_query::{Alias, Iden, Quote};

use crate::metadata::Column;
use crate::types::Kind;

/// Database specific SQL syntax.
pub trait Dialect: Debug + Send + Sync + 'static {
    /// Human readable dialect name.
    fn name(&self) -> &'static str;

    /// The identifier quote used by the dialect.
    fn quote(&self) -> Quote;

    /// Quote an identifier so that keywords can be used as names.
    ///
    /// Idempotent: an identifier that is already quoted is returned
    /// unchanged. Embedded quote characters are doubled.
    fn encode_identifier(&self, name: &str) -> String {
        let quote = self.quote();
        let (left, right) = (quote.left(), quote.right());

        if name.len() >= 2 && name.starts_with(left) && name.ends_with(right) {
            return name.to_string();
        }
        format!("{left}{}{right}", Alias::new(name).quoted(quote))
    }

    /// The type declaration for a column, without its name or constraints.
    fn transform_type_declaration(&self, column: &Column) -> String;

    /// The inline declaration used for a single integer primary key.
    fn integer_primary_key(&self, auto_increment: bool) -> &'static str;

    /// The bind placeholder for the 1-based `position`.
    fn placeholder(&self, position: usize) -> String {
        let _ = position;
        "?".to_string()
    }
}

/// `SQLite`, the default dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote(&self) -> Quote {
        Quote::new(b'"')
    }

    fn transform_type_declaration(&self, column: &Column) -> String {
        match column.kind {
            Kind::Int64 | Kind::Pointer => "INTEGER".to_string(),
            Kind::Float64 if column.precision > 0 => numeric("NUMERIC", column),
            Kind::Float64 => "FLOAT".to_string(),
            Kind::Bool => "BOOLEAN".to_string(),
            Kind::Blob => "BLOB".to_string(),
            Kind::Time => "DATETIME".to_string(),
            Kind::String => varchar(column),
        }
    }

    fn integer_primary_key(&self, auto_increment: bool) -> &'static str {
        if auto_increment {
            "INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"
        } else {
            "INTEGER NOT NULL PRIMARY KEY"
        }
    }
}

/// `PostgreSQL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self) -> Quote {
        Quote::new(b'"')
    }

    fn transform_type_declaration(&self, column: &Column) -> String {
        match column.kind {
            Kind::Int64 | Kind::Pointer => "BIGINT".to_string(),
            Kind::Float64 if column.precision > 0 => numeric("NUMERIC", column),
            Kind::Float64 => "DOUBLE PRECISION".to_string(),
            Kind::Bool => "BOOLEAN".to_string(),
            Kind::Blob => "BYTEA".to_string(),
            Kind::Time => "TIMESTAMP".to_string(),
            Kind::String => varchar(column),
        }
    }

    fn integer_primary_key(&self, auto_increment: bool) -> &'static str {
        if auto_increment {
            "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
        } else {
            "BIGINT NOT NULL PRIMARY KEY"
        }
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${position}")
    }
}

/// `MySQL` and `MariaDB`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self) -> Quote {
        Quote::new(b'`')
    }

    fn transform_type_declaration(&self, column: &Column) -> String {
        match column.kind {
            Kind::Int64 | Kind::Pointer => "BIGINT".to_string(),
            Kind::Float64 if column.precision > 0 => numeric("DECIMAL", column),
            Kind::Float64 => "DOUBLE".to_string(),
            Kind::Bool => "BOOLEAN".to_string(),
            Kind::Blob => "BLOB".to_string(),
            Kind::Time => "DATETIME".to_string(),
            Kind::String => varchar(column),
        }
    }

    fn integer_primary_key(&self, auto_increment: bool) -> &'static str {
        if auto_increment {
            "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"
        } else {
            "BIGINT NOT NULL PRIMARY KEY"
        }
    }
}

fn numeric(keyword: &str, column: &Column) -> String {
    format!("{keyword}({}, {})", column.precision, column.scale)
}

fn varchar(column: &Column) -> String {
    format!("VARCHAR({})", column.length)
}

//! # Metadata
//!
//! Per-model registry: the table, its ordered columns and the statements
//! prepared for the model. A [`ModelMetadata`] is built once from the model's
//! [`Schema`] when the store starts and is read-only afterwards.
//!
//! Columns are kept in declaration order with the keys first. Every SQL
//! fragment and every list of bind arguments is derived by walking that one
//! vector with the same predicate, so placeholders and arguments always line
//! up.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::builder::SqlBuilder;
use crate::driver::{Connection, Statement};
use crate::error::{Error, Result};
use crate::model::{Capabilities, Hooks, Model, ModelName};
use crate::types::{ColumnType, DataType, Kind, Scalar};

const DEFAULT_LENGTH: u32 = 255;

/// The canonical statements prepared for every registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Select one row by key.
    Find,
    /// Select every row.
    FindAll,
    /// Insert a row.
    Insert,
    /// Update a row by key.
    Update,
    /// Delete a row by key.
    Delete,
}

impl Operation {
    /// All canonical operations, in preparation order.
    pub const ALL: [Self; 5] = [Self::Find, Self::FindAll, Self::Insert, Self::Update, Self::Delete];

    /// The statement name the operation is registered under.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::FindAll => "findAll",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns `true` if `name` is reserved for a canonical operation.
    #[must_use]
    pub fn is_canonical(name: &str) -> bool {
        Self::ALL.iter().any(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declarative overrides for a column. Any attribute left unset keeps its
/// default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    name: Option<String>,
    nilable: Option<bool>,
    insertable: Option<bool>,
    updatable: Option<bool>,
    unique: Option<bool>,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
    auto_increment: Option<bool>,
}

impl ColumnSpec {
    /// Creates a spec with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the column name (defaults to the field name).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the column accepts `NULL`.
    #[must_use]
    pub const fn nilable(mut self, nilable: bool) -> Self {
        self.nilable = Some(nilable);
        self
    }

    /// Whether the column is written on insert.
    #[must_use]
    pub const fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = Some(insertable);
        self
    }

    /// Whether the column is written on update.
    #[must_use]
    pub const fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = Some(updatable);
        self
    }

    /// Whether the column carries a `UNIQUE` constraint.
    #[must_use]
    pub const fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Maximum length of a text column.
    #[must_use]
    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Total digits of a numeric column.
    #[must_use]
    pub const fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Fractional digits of a numeric column.
    #[must_use]
    pub const fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Whether the store generates the column's value.
    #[must_use]
    pub const fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = Some(auto_increment);
        self
    }
}

/// A mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Field name on the model.
    pub identifier: String,
    /// Column name in the table.
    pub name: String,
    /// Storage kind.
    pub kind: Kind,
    /// Part of the primary key.
    pub key: bool,
    /// Accepts `NULL`.
    pub nilable: bool,
    /// Written on insert.
    pub insertable: bool,
    /// Written on update.
    pub updatable: bool,
    /// Carries a `UNIQUE` constraint.
    pub unique: bool,
    /// Maximum text length.
    pub length: u32,
    /// Numeric precision; 0 when unset.
    pub precision: u32,
    /// Numeric scale.
    pub scale: u32,
    /// Value generated by the store.
    pub auto_increment: bool,
}

impl Column {
    /// Merge the defaults for a key or a plain column with `spec`.
    #[must_use]
    pub fn new(field: &str, kind: Kind, key: bool, spec: &ColumnSpec) -> Self {
        Self {
            identifier: field.to_string(),
            name: spec.name.clone().unwrap_or_else(|| field.to_string()),
            kind,
            key,
            nilable: spec.nilable.unwrap_or(!key),
            insertable: spec.insertable.unwrap_or(true),
            updatable: spec.updatable.unwrap_or(true),
            unique: spec.unique.unwrap_or(false),
            length: spec.length.unwrap_or(DEFAULT_LENGTH),
            precision: spec.precision.unwrap_or(0),
            scale: spec.scale.unwrap_or(0),
            auto_increment: spec.auto_increment.unwrap_or(false),
        }
    }

    /// Included in `INSERT` statements.
    #[must_use]
    pub const fn is_insert_column(&self) -> bool {
        self.insertable && !(self.key && self.auto_increment)
    }

    /// Included in the `SET` list of `UPDATE` statements.
    #[must_use]
    pub const fn is_update_column(&self) -> bool {
        self.updatable && !self.key
    }
}

/// The table a model is mapped onto.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Key column names in declaration order.
    pub keys: Vec<String>,
}

#[derive(Debug, Clone)]
struct FieldSchema {
    field: &'static str,
    kind: Kind,
    spec: ColumnSpec,
}

/// Declarative description of a model's table, normally produced by the
/// [`model!`](crate::model!) macro.
#[derive(Debug, Clone)]
pub struct Schema {
    table: String,
    keys: Vec<FieldSchema>,
    columns: Vec<FieldSchema>,
}

impl Schema {
    /// Describe a model stored in `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            keys: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Add a key field of type `T`. A generated key type defaults to
    /// auto-increment.
    #[must_use]
    pub fn key<T: ColumnType>(mut self, field: &'static str, mut spec: ColumnSpec) -> Self {
        if spec.auto_increment.is_none() {
            spec.auto_increment = Some(T::GENERATED);
        }
        self.keys.push(FieldSchema {
            field,
            kind: T::KIND,
            spec,
        });
        self
    }

    /// Add a non-key field of type `T`.
    #[must_use]
    pub fn column<T: ColumnType>(mut self, field: &'static str, spec: ColumnSpec) -> Self {
        self.columns.push(FieldSchema {
            field,
            kind: T::KIND,
            spec,
        });
        self
    }
}

/// Registry entry for one model.
pub struct ModelMetadata {
    name: ModelName,
    table: Table,
    columns: Vec<Column>,
    keys_by_field: HashMap<String, usize>,
    keys_by_index: HashMap<usize, usize>,
    columns_by_field: HashMap<String, usize>,
    columns_by_index: HashMap<usize, usize>,
    statements: HashMap<String, Arc<dyn Statement>>,
    hooks: Box<dyn Any + Send + Sync>,
    capabilities: Capabilities,
}

impl fmt::Debug for ModelMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMetadata")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("statements", &self.statements.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ModelMetadata {
    /// Creates an empty registry entry.
    #[must_use]
    pub fn new(name: ModelName) -> Self {
        Self {
            name,
            table: Table::default(),
            columns: Vec::new(),
            keys_by_field: HashMap::new(),
            keys_by_index: HashMap::new(),
            columns_by_field: HashMap::new(),
            columns_by_index: HashMap::new(),
            statements: HashMap::new(),
            hooks: Box::new(()),
            capabilities: Capabilities::default(),
        }
    }

    /// Build the registry entry for `M` from its schema and hooks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the model name, table or any column is
    /// invalid.
    pub fn for_model<M: Model>() -> Result<Self> {
        let name = ModelName::parse(M::NAME)?;
        let schema = M::schema();
        let mut meta = Self::new(name);

        let keys: Vec<&str> = schema.keys.iter().map(|k| k.field).collect();
        meta.add_table(&schema.table, &keys)?;

        for (index, key) in schema.keys.iter().enumerate() {
            meta.add_key(key.field, index, &key.spec, key.kind)?;
        }
        for (index, column) in schema.columns.iter().enumerate() {
            meta.add_column(column.field, index, &column.spec, column.kind)?;
        }
        meta.validate()?;

        let hooks = M::hooks();
        meta.capabilities = hooks.capabilities();
        meta.hooks = Box::new(hooks);

        Ok(meta)
    }

    /// Set the table and the fields that make up its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table name is empty or there is no key.
    pub fn add_table(&mut self, name: &str, key_fields: &[&str]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Config(format!("{} has an empty table name", self.name)));
        }
        if key_fields.is_empty() {
            return Err(Error::Config(format!("table {name} of {} has no key", self.name)));
        }

        self.table = Table {
            name: name.to_string(),
            keys: key_fields.iter().map(ToString::to_string).collect(),
        };
        Ok(())
    }

    /// Register a key field declared by [`ModelMetadata::add_table`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the field is not a declared key, is
    /// registered twice or has an empty column name.
    pub fn add_key(&mut self, field: &str, index: usize, spec: &ColumnSpec, kind: Kind) -> Result<()> {
        if self.keys_by_field.contains_key(field) || self.keys_by_index.contains_key(&index) {
            return Err(self.duplicate(field, index));
        }
        if self.columns_by_field.contains_key(field) {
            return Err(self.duplicate(field, index));
        }
        let Some(slot) = self.table.keys.iter().position(|k| k == field) else {
            return Err(Error::Config(format!("{field} is not a key of table {}", self.table.name)));
        };
        // keys must stay ahead of the other columns
        if !self.columns_by_field.is_empty() {
            return Err(Error::Config(format!("key {field} of {} declared after its columns", self.name)));
        }

        let column = Column::new(field, kind, true, spec);
        self.check_name(&column)?;

        let position = self.columns.len();
        self.table.keys[slot].clone_from(&column.name);
        self.columns.push(column);
        self.keys_by_field.insert(field.to_string(), position);
        self.keys_by_index.insert(index, position);
        Ok(())
    }

    /// Register a non-key field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the field is registered twice or has an
    /// empty column name.
    pub fn add_column(&mut self, field: &str, index: usize, spec: &ColumnSpec, kind: Kind) -> Result<()> {
        if self.columns_by_field.contains_key(field)
            || self.columns_by_index.contains_key(&index)
            || self.keys_by_field.contains_key(field)
        {
            return Err(self.duplicate(field, index));
        }

        let column = Column::new(field, kind, false, spec);
        self.check_name(&column)?;

        let position = self.columns.len();
        self.columns.push(column);
        self.columns_by_field.insert(field.to_string(), position);
        self.columns_by_index.insert(index, position);
        Ok(())
    }

    fn duplicate(&self, field: &str, index: usize) -> Error {
        Error::Config(format!("field {field} (index {index}) of {} is registered twice", self.name))
    }

    fn check_name(&self, column: &Column) -> Result<()> {
        if column.name.is_empty() {
            return Err(Error::Config(format!(
                "field {} of {} maps to an empty column name",
                column.identifier, self.name
            )));
        }
        Ok(())
    }

    /// Checks that every key declared by the table has been registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a key is missing.
    pub fn validate(&self) -> Result<()> {
        if self.table.name.is_empty() {
            return Err(Error::Config(format!("{} has no table", self.name)));
        }
        if self.keys_by_field.len() != self.table.keys.len() {
            return Err(Error::Config(format!(
                "table {} of {} declares {} key(s) but {} were registered",
                self.table.name,
                self.name,
                self.table.keys.len(),
                self.keys_by_field.len()
            )));
        }
        Ok(())
    }

    /// The model's name.
    #[must_use]
    pub const fn name(&self) -> &ModelName {
        &self.name
    }

    /// The mapped table.
    #[must_use]
    pub const fn table(&self) -> &Table {
        &self.table
    }

    /// Every column, keys first, in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The key columns.
    pub fn keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.key)
    }

    /// Look up a column by field name.
    #[must_use]
    pub fn column(&self, field: &str) -> Option<&Column> {
        let position = self.keys_by_field.get(field).or_else(|| self.columns_by_field.get(field))?;
        self.columns.get(*position)
    }

    /// Look up a key by its declaration index.
    #[must_use]
    pub fn key_by_index(&self, index: usize) -> Option<&Column> {
        self.keys_by_index.get(&index).and_then(|p| self.columns.get(*p))
    }

    /// Look up a non-key column by its declaration index.
    #[must_use]
    pub fn column_by_index(&self, index: usize) -> Option<&Column> {
        self.columns_by_index.get(&index).and_then(|p| self.columns.get(*p))
    }

    /// The hooks summary captured at registration.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub(crate) fn hooks<M: Model>(&self) -> Option<&Hooks<M>> {
        self.hooks.downcast_ref::<Hooks<M>>()
    }

    /// Prepare `sql` on `connection` and register it as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Prepare`] if the driver rejects the statement.
    pub fn add_stmt(&mut self, connection: &dyn Connection, name: &str, sql: &str) -> Result<()> {
        let statement = connection.prepare(sql).map_err(|source| Error::Prepare {
            model: self.name.to_string(),
            statement: name.to_string(),
            source,
        })?;

        tracing::debug!(model = %self.name, statement = name, sql = %sql, "prepared statement");
        if let Some(previous) = self.statements.insert(name.to_string(), statement) {
            previous.close();
        }
        Ok(())
    }

    /// The statement registered as `name`.
    #[must_use]
    pub fn statement(&self, name: &str) -> Option<&Arc<dyn Statement>> {
        self.statements.get(name)
    }

    pub(crate) fn close_statements(&self) {
        for statement in self.statements.values() {
            statement.close();
        }
    }

    /// Appends the insert columns: `a, b, c`.
    pub fn columns_list(&self, builder: &mut SqlBuilder<'_>) {
        separated(builder, self.columns.iter().filter(|c| c.is_insert_column()), ", ", |b, c| {
            b.identifier(&c.name);
        });
    }

    /// Appends one placeholder per insert column: `?, ?, ?`.
    pub fn columns_bind_list(&self, builder: &mut SqlBuilder<'_>) {
        separated(builder, self.columns.iter().filter(|c| c.is_insert_column()), ", ", |b, _| {
            b.bind();
        });
    }

    /// Appends `a = ? AND b = ?` over every column.
    pub fn columns_list_equals_columns_bind_list(&self, builder: &mut SqlBuilder<'_>) {
        separated(builder, self.columns.iter(), " AND ", |b, c| {
            b.identifier(&c.name).add(" = ").bind();
        });
    }

    /// Appends `k1 = ? AND k2 = ?` over the keys.
    pub fn key_list_equals_key_bind_list(&self, builder: &mut SqlBuilder<'_>) {
        separated(builder, self.keys(), " AND ", |b, c| {
            b.identifier(&c.name).add(" = ").bind();
        });
    }

    /// Appends `a = ?, b = ?` over the update columns.
    pub fn non_key_list_equals_non_key_bind_list(&self, builder: &mut SqlBuilder<'_>) {
        separated(builder, self.columns.iter().filter(|c| c.is_update_column()), ", ", |b, c| {
            b.identifier(&c.name).add(" = ").bind();
        });
    }

    /// Appends the column definitions of a `CREATE TABLE` statement.
    pub fn column_list_with_constraints(&self, builder: &mut SqlBuilder<'_>) {
        let keys: Vec<&Column> = self.keys().collect();
        let integer_key = match keys.as_slice() {
            [key] if key.kind == Kind::Int64 => Some(*key),
            _ => None,
        };
        let dialect = builder.dialect();

        separated(builder, self.columns.iter(), ", ", |b, c| match integer_key {
            Some(key) if c.key => {
                b.identifier(&c.name).add(" ").add(dialect.integer_primary_key(key.auto_increment));
            }
            _ => {
                b.identifier(&c.name).add(" ").add(&dialect.transform_type_declaration(c));
                if c.unique {
                    b.add(" UNIQUE");
                }
                if !c.nilable || c.key {
                    b.add(" NOT NULL");
                }
                if c.key && keys.len() == 1 {
                    b.add(" PRIMARY KEY");
                }
            }
        });

        if keys.len() > 1 {
            builder.add(", PRIMARY KEY (");
            separated(builder, keys.into_iter(), ", ", |b, c| {
                b.identifier(&c.name);
            });
            builder.add(")");
        }
    }

    /// Returns `true` if the model has at least one insert column.
    #[must_use]
    pub fn has_insert_columns(&self) -> bool {
        self.columns.iter().any(Column::is_insert_column)
    }

    /// Returns `true` if the model has at least one update column.
    #[must_use]
    pub fn has_update_columns(&self) -> bool {
        self.columns.iter().any(Column::is_update_column)
    }

    /// Derive the bind arguments for `op` from a model's values, in the order
    /// the matching statement declares its placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the model does not expose one value per
    /// registered column.
    pub fn bind_args(&self, op: Operation, values: &[&dyn Scalar]) -> Result<Vec<DataType>> {
        if values.len() != self.columns.len() {
            return Err(Error::Bind {
                model: self.name.to_string(),
                statement: op.name().to_string(),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }

        let pairs = || self.columns.iter().zip(values.iter());
        let args = match op {
            Operation::Insert => {
                pairs().filter(|(c, _)| c.is_insert_column()).map(|(_, v)| v.encode()).collect()
            }
            Operation::Update => pairs()
                .filter(|(c, _)| c.is_update_column())
                .chain(pairs().filter(|(c, _)| c.key))
                .map(|(_, v)| v.encode())
                .collect(),
            Operation::Find | Operation::Delete => {
                pairs().filter(|(c, _)| c.key).map(|(_, v)| v.encode()).collect()
            }
            Operation::FindAll => Vec::new(),
        };
        Ok(args)
    }
}

// Appends `each` for every column, separated by `separator`, and trims the
// trailing separator when anything was appended.
fn separated<'c>(
    builder: &mut SqlBuilder<'_>, columns: impl Iterator<Item = &'c Column>, separator: &str,
    mut each: impl FnMut(&mut SqlBuilder<'_>, &Column),
) {
    let mut appended = false;
    for column in columns {
        each(builder, column);
        builder.add(separator);
        appended = true;
    }
    if appended {
        builder.truncate(separator.len());
    }
}

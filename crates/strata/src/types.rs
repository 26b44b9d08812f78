//! # Column values
//!
//! [`DataType`] is the value exchanged with a driver. The nullable wrappers
//! ([`Str`], [`Int64`], [`Float64`], [`Bool`], [`Time`], [`Blob`],
//! [`Pointer`] and [`AutoIncrement`]) are the column carriers a model is built from: each one
//! knows its [`Kind`], whether it is `NULL`, how to encode itself for the
//! driver and how to scan itself back from a driver value.

use std::fmt::{self, Debug, Display};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// A value as exchanged with the driver. `None` represents SQL `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Boolean value.
    Boolean(Option<bool>),
    /// 64-bit signed integer.
    Int64(Option<i64>),
    /// 64-bit float.
    Double(Option<f64>),
    /// UTF-8 text.
    Str(Option<String>),
    /// Raw bytes.
    Binary(Option<Vec<u8>>),
    /// Timestamp rendered as RFC 3339 text.
    Timestamp(Option<String>),
}

impl DataType {
    /// The representation used for an untyped SQL `NULL`.
    pub const NULL: Self = Self::Str(None);

    /// Returns `true` if the value is SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Boolean(None)
                | Self::Int64(None)
                | Self::Double(None)
                | Self::Str(None)
                | Self::Binary(None)
                | Self::Timestamp(None)
        )
    }
}

impl From<bool> for DataType {
    fn from(value: bool) -> Self {
        Self::Boolean(Some(value))
    }
}

impl From<i32> for DataType {
    fn from(value: i32) -> Self {
        Self::Int64(Some(i64::from(value)))
    }
}

impl From<i64> for DataType {
    fn from(value: i64) -> Self {
        Self::Int64(Some(value))
    }
}

impl From<f64> for DataType {
    fn from(value: f64) -> Self {
        Self::Double(Some(value))
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        Self::Str(Some(value.to_string()))
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        Self::Str(Some(value))
    }
}

impl From<Vec<u8>> for DataType {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Some(value))
    }
}

impl From<DateTime<Utc>> for DataType {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(Some(format_timestamp(&value)))
    }
}

/// A named value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name as reported by the driver.
    pub name: String,

    /// Column value.
    pub value: DataType,
}

/// A single result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Fields in the order the driver returned them.
    pub fields: Vec<Field>,
}

impl Row {
    /// Returns the value of the named column. Column names compare
    /// case-insensitively, as SQL identifiers do.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|field| field.name.eq_ignore_ascii_case(name)).map(|f| &f.value)
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&DataType> {
        self.fields.get(index).map(|field| &field.value)
    }

    /// Returns `true` if the driver reported a name for any field.
    #[must_use]
    pub fn has_names(&self) -> bool {
        self.fields.iter().any(|field| !field.name.is_empty())
    }

    /// Number of fields in the row.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the row has no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The storage kind of a column. Fixed when the column is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Variable length text.
    String,
    /// 64-bit integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// Boolean.
    Bool,
    /// Raw bytes.
    Blob,
    /// Point in time.
    Time,
    /// Reference to another model's integer key.
    Pointer,
}

impl Kind {
    /// Returns `true` for kinds stored as integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int64 | Self::Pointer)
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Blob => "blob",
            Self::Time => "time",
            Self::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

/// A nullable column carrier.
///
/// Models expose their columns as `dyn Scalar` slots so that the execution
/// coordinator can extract bind arguments and scan rows without knowing the
/// concrete model type.
pub trait Scalar: Debug + Display + Send + Sync {
    /// The storage kind of the value.
    fn kind(&self) -> Kind;

    /// Returns `true` if the value is `NULL`.
    fn is_null(&self) -> bool;

    /// Encodes the value for the driver. `NULL` encodes to a `None` variant.
    fn encode(&self) -> DataType;

    /// Replaces the value with one read from the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver value cannot be represented by this type.
    fn scan(&mut self, value: &DataType) -> Result<()>;

    /// Accepts a store-generated key. Returns `false` if the type cannot hold
    /// one.
    fn assign_generated(&mut self, id: i64) -> bool {
        let _ = id;
        false
    }
}

/// Implemented by the concrete wrapper types so that schema descriptions can
/// name a column's kind at compile time.
pub trait ColumnType: Scalar + Default {
    /// The storage kind of the wrapper.
    const KIND: Kind;

    /// Whether a key of this type is generated by the store.
    const GENERATED: bool = false;
}

macro_rules! wrapper {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $kind:ident) => {
        wrapper!($(#[$meta])* $name, $inner, $kind, false);
    };
    ($(#[$meta:meta])* $name:ident, $inner:ty, $kind:ident, $generated:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name(Option<$inner>);

        impl $name {
            /// Creates a non-null value.
            #[must_use]
            pub fn new(value: impl Into<$inner>) -> Self {
                Self(Some(value.into()))
            }

            /// Creates a `NULL` value.
            #[must_use]
            pub const fn null() -> Self {
                Self(None)
            }

            /// Returns the value, or `None` when `NULL`.
            #[must_use]
            pub const fn get(&self) -> Option<&$inner> {
                self.0.as_ref()
            }

            /// Sets a non-null value.
            pub fn set(&mut self, value: impl Into<$inner>) {
                self.0 = Some(value.into());
            }

            /// Sets the value to `NULL`.
            pub fn clear(&mut self) {
                self.0 = None;
            }
        }

        impl From<Option<$inner>> for $name {
            fn from(value: Option<$inner>) -> Self {
                Self(value)
            }
        }

        impl ColumnType for $name {
            const KIND: Kind = Kind::$kind;
            const GENERATED: bool = $generated;
        }
    };
}

wrapper!(
    /// Nullable text column.
    Str,
    String,
    String
);

wrapper!(
    /// Nullable 64-bit integer column.
    Int64,
    i64,
    Int64
);

wrapper!(
    /// Integer key whose value is generated by the store on insert.
    AutoIncrement,
    i64,
    Int64,
    true
);

wrapper!(
    /// Nullable reference to another model's integer key.
    Pointer,
    i64,
    Pointer
);

wrapper!(
    /// Nullable 64-bit float column.
    Float64,
    f64,
    Float64
);

wrapper!(
    /// Nullable boolean column.
    Bool,
    bool,
    Bool
);

wrapper!(
    /// Nullable timestamp column, stored as RFC 3339 text in UTC.
    Time,
    DateTime<Utc>,
    Time
);

wrapper!(
    /// Nullable binary column.
    Blob,
    Vec<u8>,
    Blob
);

impl Scalar for Str {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Str(self.0.clone())
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = match value {
            v if v.is_null() => None,
            DataType::Str(Some(raw)) | DataType::Timestamp(Some(raw)) => Some(raw.clone()),
            DataType::Binary(Some(bytes)) => {
                Some(String::from_utf8(bytes.clone()).context("invalid UTF-8 in text value")?)
            }
            _ => bail!("expected string data type"),
        };
        Ok(())
    }
}

impl Scalar for Int64 {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Int64(self.0)
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = as_i64(value)?;
        Ok(())
    }

    fn assign_generated(&mut self, id: i64) -> bool {
        self.0 = Some(id);
        true
    }
}

impl Scalar for AutoIncrement {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Int64(self.0)
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = as_i64(value)?;
        Ok(())
    }

    fn assign_generated(&mut self, id: i64) -> bool {
        self.0 = Some(id);
        true
    }
}

impl Scalar for Pointer {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Int64(self.0)
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = as_i64(value)?;
        Ok(())
    }
}

impl Scalar for Float64 {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Double(self.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = match value {
            v if v.is_null() => None,
            DataType::Double(Some(v)) => Some(*v),
            DataType::Int64(Some(v)) => Some(*v as f64),
            _ => bail!("expected double data type"),
        };
        Ok(())
    }
}

impl Scalar for Bool {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Boolean(self.0)
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        // SQLite has no boolean storage class and hands back 0/1
        self.0 = match value {
            v if v.is_null() => None,
            DataType::Boolean(Some(v)) => Some(*v),
            DataType::Int64(Some(v)) => Some(*v != 0),
            _ => bail!("expected boolean data type"),
        };
        Ok(())
    }
}

impl Scalar for Time {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Timestamp(self.0.as_ref().map(format_timestamp))
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = match value {
            v if v.is_null() => None,
            DataType::Timestamp(Some(raw)) | DataType::Str(Some(raw)) => Some(parse_timestamp(raw)?),
            _ => bail!("expected timestamp data type"),
        };
        Ok(())
    }
}

impl Scalar for Blob {
    fn kind(&self) -> Kind {
        Self::KIND
    }

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn encode(&self) -> DataType {
        DataType::Binary(self.0.clone())
    }

    fn scan(&mut self, value: &DataType) -> Result<()> {
        self.0 = match value {
            v if v.is_null() => None,
            DataType::Binary(Some(bytes)) => Some(bytes.clone()),
            DataType::Str(Some(raw)) => Some(raw.clone().into_bytes()),
            _ => bail!("expected binary data type"),
        };
        Ok(())
    }
}

impl Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_deref() {
            Some(value) => f.write_str(value),
            None => f.write_str("NULL"),
        }
    }
}

impl Display for Int64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_option(self.0.as_ref(), f)
    }
}

impl Display for AutoIncrement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_option(self.0.as_ref(), f)
    }
}

impl Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_option(self.0.as_ref(), f)
    }
}

impl Display for Float64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_option(self.0.as_ref(), f)
    }
}

impl Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_option(self.0.as_ref(), f)
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => f.write_str(&format_timestamp(value)),
            None => f.write_str("NULL"),
        }
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            None => f.write_str("NULL"),
        }
    }
}

fn display_option<T: Display>(value: Option<&T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{value}"),
        None => f.write_str("NULL"),
    }
}

fn as_i64(value: &DataType) -> Result<Option<i64>> {
    match value {
        v if v.is_null() => Ok(None),
        DataType::Int64(Some(v)) => Ok(Some(*v)),
        DataType::Boolean(Some(v)) => Ok(Some(i64::from(*v))),
        _ => bail!("expected int64 data type"),
    }
}

fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc));
    }

    bail!("unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format")
}

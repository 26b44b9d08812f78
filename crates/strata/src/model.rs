//! # Models
//!
//! A [`Model`] is a plain struct whose fields are [`Scalar`] wrappers. The
//! trait exposes the model's schema and its fields as ordered slots so that
//! the store can bind and scan it without reflection. Implement it with the
//! [`model!`](crate::model!) macro.

use std::fmt::{self, Debug, Display};

use crate::error::{Error, Result};
use crate::metadata::{Operation, Schema};
use crate::types::Scalar;

/// A type mapped onto a table.
pub trait Model: Send + Sized + 'static {
    /// Qualified model name, `<domain>.<Type>`.
    const NAME: &'static str;

    /// The table layout.
    fn schema() -> Schema;

    /// A model with every field `NULL`, ready to be scanned into.
    fn blank() -> Self;

    /// Key values in declaration order.
    fn keys(&self) -> Vec<&dyn Scalar>;

    /// Non-key values in declaration order.
    fn parameters(&self) -> Vec<&dyn Scalar>;

    /// Every field, keys first, in declaration order.
    fn slots_mut(&mut self) -> Vec<&mut dyn Scalar>;

    /// Lifecycle hooks. Captured once when the model is registered.
    #[must_use]
    fn hooks() -> Hooks<Self> {
        Hooks::new()
    }
}

/// A validated `<domain>.<Type>` model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelName {
    full: String,
    split: usize,
}

impl ModelName {
    /// Parse and validate a qualified model name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the name has exactly two non-empty,
    /// dot-separated segments.
    pub fn parse(name: &str) -> Result<Self> {
        let mut parts = name.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(domain), Some(ty), None) if !domain.is_empty() && !ty.is_empty() => Ok(Self {
                full: name.to_string(),
                split: domain.len(),
            }),
            _ => Err(Error::Config(format!("model name {name:?} must have the form <domain>.<Type>"))),
        }
    }

    /// The domain segment.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.full[..self.split]
    }

    /// The type segment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.full[self.split + 1..]
    }

    /// The qualified name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// A lifecycle hook. May modify the model before it is written.
pub type HookFn<M> = fn(&mut M) -> anyhow::Result<()>;

/// When a hook runs relative to its statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Before the statement; failure aborts the operation.
    Pre,
    /// After the statement succeeded.
    Post,
}

/// The lifecycle hooks declared by a model.
pub struct Hooks<M> {
    pre_insert: Option<HookFn<M>>,
    post_insert: Option<HookFn<M>>,
    pre_update: Option<HookFn<M>>,
    post_update: Option<HookFn<M>>,
    pre_delete: Option<HookFn<M>>,
    post_delete: Option<HookFn<M>>,
}

impl<M> Hooks<M> {
    /// No hooks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pre_insert: None,
            post_insert: None,
            pre_update: None,
            post_update: None,
            pre_delete: None,
            post_delete: None,
        }
    }

    /// Run `hook` before every insert.
    #[must_use]
    pub const fn pre_insert(mut self, hook: HookFn<M>) -> Self {
        self.pre_insert = Some(hook);
        self
    }

    /// Run `hook` after every successful insert.
    #[must_use]
    pub const fn post_insert(mut self, hook: HookFn<M>) -> Self {
        self.post_insert = Some(hook);
        self
    }

    /// Run `hook` before every update.
    #[must_use]
    pub const fn pre_update(mut self, hook: HookFn<M>) -> Self {
        self.pre_update = Some(hook);
        self
    }

    /// Run `hook` after every successful update.
    #[must_use]
    pub const fn post_update(mut self, hook: HookFn<M>) -> Self {
        self.post_update = Some(hook);
        self
    }

    /// Run `hook` before every delete.
    #[must_use]
    pub const fn pre_delete(mut self, hook: HookFn<M>) -> Self {
        self.pre_delete = Some(hook);
        self
    }

    /// Run `hook` after every successful delete.
    #[must_use]
    pub const fn post_delete(mut self, hook: HookFn<M>) -> Self {
        self.post_delete = Some(hook);
        self
    }

    /// The hook for `op` at `stage`, if declared.
    #[must_use]
    pub const fn get(&self, op: Operation, stage: Stage) -> Option<HookFn<M>> {
        match (op, stage) {
            (Operation::Insert, Stage::Pre) => self.pre_insert,
            (Operation::Insert, Stage::Post) => self.post_insert,
            (Operation::Update, Stage::Pre) => self.pre_update,
            (Operation::Update, Stage::Post) => self.post_update,
            (Operation::Delete, Stage::Pre) => self.pre_delete,
            (Operation::Delete, Stage::Post) => self.post_delete,
            (Operation::Find | Operation::FindAll, _) => None,
        }
    }

    /// Summary of the declared hooks.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            pre_insert: self.pre_insert.is_some(),
            post_insert: self.post_insert.is_some(),
            pre_update: self.pre_update.is_some(),
            post_update: self.post_update.is_some(),
            pre_delete: self.pre_delete.is_some(),
            post_delete: self.post_delete.is_some(),
        }
    }
}

impl<M> Default for Hooks<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Hooks<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Hooks<M> {}

impl<M> Debug for Hooks<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hooks").field(&self.capabilities()).finish()
    }
}

/// Which hooks a model declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Declares a pre-insert hook.
    pub pre_insert: bool,
    /// Declares a post-insert hook.
    pub post_insert: bool,
    /// Declares a pre-update hook.
    pub pre_update: bool,
    /// Declares a post-update hook.
    pub post_update: bool,
    /// Declares a pre-delete hook.
    pub pre_delete: bool,
    /// Declares a post-delete hook.
    pub post_delete: bool,
}

impl Capabilities {
    /// Returns `true` if any hook is declared.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.pre_insert
            || self.post_insert
            || self.pre_update
            || self.post_update
            || self.pre_delete
            || self.post_delete
    }
}

/// Declare a model struct together with its [`Model`] implementation.
///
/// Every field must be a column wrapper such as [`Str`](crate::Str) or
/// [`AutoIncrement`](crate::AutoIncrement). A field may be followed by a
/// [`ColumnSpec`](crate::ColumnSpec) expression overriding its defaults.
///
/// ```rust,ignore
/// strata::model! {
///     name = "domain.Person",
///     table = "people",
///     #[derive(Debug, Clone)]
///     pub struct Person {
///         keys {
///             pub id: AutoIncrement = ColumnSpec::new().name("Id"),
///         }
///         columns {
///             pub name: Str = ColumnSpec::new().name("Name").length(80),
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! model {
    (@spec) => {
        $crate::ColumnSpec::new()
    };
    (@spec $spec:expr) => {
        $spec
    };

    // Full form: hooks + struct (single code-generation arm)
    (
        name = $name:literal,
        table = $table:literal,
        hooks = $hooks:expr,
        $(#[$meta:meta])*
        pub struct $struct_name:ident {
            keys {
                $(
                    $(#[$key_meta:meta])*
                    pub $key_name:ident : $key_type:ty $(= $key_spec:expr)?
                ),+ $(,)?
            }
            columns {
                $(
                    $(#[$col_meta:meta])*
                    pub $col_name:ident : $col_type:ty $(= $col_spec:expr)?
                ),* $(,)?
            }
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$meta])*
        pub struct $struct_name {
            $(
                $(#[$key_meta])*
                pub $key_name : $key_type,
            )+
            $(
                $(#[$col_meta])*
                pub $col_name : $col_type,
            )*
        }

        impl $crate::Model for $struct_name {
            const NAME: &'static str = $name;

            fn schema() -> $crate::Schema {
                $crate::Schema::new($table)
                    $(
                        .key::<$key_type>(stringify!($key_name), $crate::model!(@spec $($key_spec)?))
                    )+
                    $(
                        .column::<$col_type>(stringify!($col_name), $crate::model!(@spec $($col_spec)?))
                    )*
            }

            fn blank() -> Self {
                Self {
                    $( $key_name: ::core::default::Default::default(), )+
                    $( $col_name: ::core::default::Default::default(), )*
                }
            }

            fn keys(&self) -> Vec<&dyn $crate::Scalar> {
                vec![$( &self.$key_name as &dyn $crate::Scalar ),+]
            }

            fn parameters(&self) -> Vec<&dyn $crate::Scalar> {
                vec![$( &self.$col_name as &dyn $crate::Scalar ),*]
            }

            fn slots_mut(&mut self) -> Vec<&mut dyn $crate::Scalar> {
                vec![
                    $( &mut self.$key_name as &mut dyn $crate::Scalar, )+
                    $( &mut self.$col_name as &mut dyn $crate::Scalar, )*
                ]
            }

            fn hooks() -> $crate::Hooks<Self> {
                $hooks
            }
        }
    };

    // No hooks → forward with an empty set
    (
        name = $name:literal,
        table = $table:literal,
        $($rest:tt)*
    ) => {
        $crate::model! {
            name = $name,
            table = $table,
            hooks = $crate::Hooks::new(),
            $($rest)*
        }
    };
}

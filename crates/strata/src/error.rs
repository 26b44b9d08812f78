//! Errors

use thiserror::Error;

use crate::driver::ExecResult;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Error type returned by the store, its transactions and its entities.
///
/// [`Error::Config`] and [`Error::Prepare`] are only produced while the store
/// is being built and abort its start-up. Everything else is returned from an
/// individual operation and leaves the store usable.
#[derive(Error, Debug)]
pub enum Error {
    /// A model or schema description is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A statement could not be prepared by the driver.
    #[error("failed to prepare `{statement}` for {model}")]
    Prepare {
        /// Registered model name.
        model: String,
        /// Name of the statement being prepared.
        statement: String,
        /// Driver error.
        #[source]
        source: anyhow::Error,
    },

    /// The model was never registered with the store.
    #[error("model {0} is not registered")]
    UnknownModel(String),

    /// No statement of that name exists for the model.
    #[error("no `{statement}` statement is registered for {model}")]
    MissingStatement {
        /// Registered model name.
        model: String,
        /// Statement name that was looked up.
        statement: String,
    },

    /// The number of arguments does not match the statement's placeholders.
    #[error("`{statement}` for {model} expects {expected} argument(s), got {actual}")]
    Bind {
        /// Registered model name.
        model: String,
        /// Statement the arguments were bound for.
        statement: String,
        /// Number of values the statement needs.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The driver failed to execute a statement.
    #[error("failed to execute `{statement}` for {model}")]
    Execution {
        /// Registered model name, or `(none)` for ad-hoc SQL.
        model: String,
        /// Name of the statement that failed.
        statement: String,
        /// Driver error.
        #[source]
        source: anyhow::Error,
    },

    /// A pre-operation hook rejected the operation. Nothing was written.
    #[error("{hook} hook failed for {model}")]
    Hook {
        /// Registered model name.
        model: String,
        /// The hook that failed, e.g. `pre-insert`.
        hook: &'static str,
        /// Error returned by the hook.
        #[source]
        source: anyhow::Error,
    },

    /// A post-operation hook failed after the write reached the store.
    #[error("{hook} hook failed for {model} after the write completed ({result})")]
    PostHook {
        /// Registered model name.
        model: String,
        /// The hook that failed, e.g. `post-update`.
        hook: &'static str,
        /// Result of the write that already happened.
        result: ExecResult,
        /// Error returned by the hook.
        #[source]
        source: anyhow::Error,
    },

    /// A result column could not be decoded into its model field.
    #[error("failed to scan column {column} of {model}")]
    Scan {
        /// Registered model name.
        model: String,
        /// Column name in the result row.
        column: String,
        /// Decoding error.
        #[source]
        source: anyhow::Error,
    },

    /// A transaction could not be started.
    #[error("failed to begin transaction")]
    Begin(#[source] anyhow::Error),

    /// A transaction could not be committed. It has been rolled back.
    #[error("failed to commit transaction")]
    Commit(#[source] anyhow::Error),

    /// A transaction could not be rolled back.
    #[error("failed to roll back transaction")]
    Rollback(#[source] anyhow::Error),
}

impl Error {
    /// Returns `true` for errors that can only be raised while the store is
    /// being built.
    #[must_use]
    pub const fn is_bootstrap(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Prepare { .. })
    }

    /// The write result carried by a [`Error::PostHook`] failure.
    #[must_use]
    pub const fn committed(&self) -> Option<&ExecResult> {
        match self {
            Self::PostHook { result, .. } => Some(result),
            _ => None,
        }
    }
}

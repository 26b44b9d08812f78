//! # Traits for backends
//!
//! Implemented by concrete drivers so that they can be connected from
//! configuration held in the environment.

use anyhow::Result;

/// Implemented by backend resources to allow them to be connected from
/// environment configuration or from explicit options.
pub trait Backend: Sized + Sync + Send {
    /// The options used to connect to the backend.
    type ConnectOptions: FromEnv;

    /// Connect to the resource using options read from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be loaded or the connection
    /// fails.
    fn connect() -> Result<Self> {
        Self::connect_with(Self::ConnectOptions::from_env()?)
    }

    /// Connect to the resource with the specified options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    fn connect_with(options: Self::ConnectOptions) -> Result<Self>;
}

/// Trait for creating connection options from environment variables.
pub trait FromEnv: Sized {
    /// Create connection options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}

#![doc = include_str!("../README.md")]

mod builder;
mod dialect;
mod driver;
mod entity;
mod error;
mod exec;
mod metadata;
mod model;
mod store;
mod traits;
mod transaction;
mod types;

// re-export internal modules
pub use self::builder::*;
pub use self::dialect::*;
pub use self::driver::*;
pub use self::entity::*;
pub use self::error::*;
pub use self::exec::Source;
pub use self::metadata::*;
pub use self::model::*;
pub use self::store::*;
pub use self::traits::*;
pub use self::transaction::*;
pub use self::types::*;

#![doc = include_str!("../README.md")]

mod backend;
mod statement;

pub use self::backend::*;
pub use self::statement::SqliteStatement;

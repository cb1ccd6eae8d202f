//! Core types and traits for sqlrelate.
//!
//! This crate provides the foundational abstractions the relation engine is
//! built on:
//!
//! - `Value` and `Row` for dynamically typed results
//! - `Model` trait for record mapping and persistence state
//! - `Connection` trait for executing SQL
//! - `Error` taxonomy separating usage errors from storage errors
//! - `Outcome` and `Cx` re-exports from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod dialect;
pub mod error;
pub mod model;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{
    ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Error,
    InvalidArgumentError, QueryError, QueryErrorKind, Result, TypeError,
};
pub use model::Model;
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;

//! SQL query builders for sqlrelate.
//!
//! `sqlrelate-query` is the **query construction layer**. It turns table names,
//! expressions and values into dialect-correct SQL plus bound parameters and
//! executes them through the `Connection` trait from `sqlrelate-core`.
//!
//! - **Expression DSL**: `Expr` builds WHERE and ON conditions.
//! - **Builders**: `Select`, `InsertBuilder`, `UpdateBuilder`, `DeleteBuilder`.
//! - **Dialect support**: Postgres, SQLite and MySQL placeholders and quoting.

pub mod builder;
pub mod clause;
pub mod expr;
pub mod join;
pub mod select;

pub use builder::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use clause::Where;
pub use expr::{BinaryOp, Expr};
pub use join::{Join, JoinType};
pub use select::Select;
pub use sqlrelate_core::Dialect;

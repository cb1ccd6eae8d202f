//! sqlrelate - many-to-many relations for SQL records in Rust.
//!
//! sqlrelate links two record types through a pivot table and provides:
//!
//! - A typed relation definition with conventional defaults for key and
//!   pivot table names
//! - Eager loading for a batch of parents in a single joined query
//! - Attach, detach, sync and save operations that keep a per-parent cache
//!   of pivot rows in step with the database
//! - Extra pivot columns, pivot timestamps and pivot filters
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlrelate::prelude::*;
//!
//! async fn example(cx: &Cx, conn: &impl Connection, users: &mut [User]) -> Outcome<(), Error> {
//!     let posts = BelongsToMany::<User, Post>::builder()
//!         .with_pivot(["role"])
//!         .build()?;
//!
//!     // One query for every user
//!     let grouped = posts.load(cx, conn, users).await?;
//!     for user in users.iter() {
//!         let theirs = grouped.for_parent(&user.id.into());
//!         println!("{} has {} posts", user.name, theirs.len());
//!     }
//!
//!     // Link posts 10 and 20 to the first user
//!     let mut first = posts.bind(&mut users[0]);
//!     first.attach(cx, conn, [10_i64, 20]).await?;
//!     Outcome::Ok(())
//! }
//! ```
//!
//! Every operation takes a `Cx` and a borrowed `Connection`; pass a
//! transaction-scoped connection to make a sequence of calls atomic.

pub mod belongs_to_many;
pub mod collection;
pub mod persist;

pub use belongs_to_many::{
    BelongsToMany, BelongsToManyBuilder, BelongsToManyHandle, GroupedResult, PivotModel, PivotRow,
    References, RelationSettings, WithPivot,
};
pub use collection::Collection;
pub use persist::{SaveAction, save_model};
pub use sqlrelate_core::{
    ConfigError, ConfigErrorKind, Connection, Cx, Dialect, Error, FromValue, InvalidArgumentError,
    Model, Outcome, QueryError, QueryErrorKind, Result, Row, TypeError, Value,
};
pub use sqlrelate_query::{DeleteBuilder, Expr, InsertBuilder, Join, JoinType, Select, UpdateBuilder};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::belongs_to_many::{
        BelongsToMany, BelongsToManyHandle, GroupedResult, PivotModel, PivotRow, WithPivot,
    };
    pub use crate::collection::Collection;
    pub use sqlrelate_core::{Connection, Cx, Error, Model, Outcome, Result, Row, Value};
    pub use sqlrelate_query::{Expr, Select};
}

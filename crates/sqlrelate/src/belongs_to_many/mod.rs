//! Many-to-many relations through a pivot table.
//!
//! A relation is defined once with [`BelongsToMany::builder`] and then used
//! two ways:
//!
//! - **Across many parents** through the definition itself:
//!   [`BelongsToMany::load`] eager-loads related records for a batch of
//!   parents in one joined query and groups them per parent.
//! - **For one parent** through [`BelongsToMany::bind`], which returns a
//!   [`BelongsToManyHandle`] with reads (`fetch`, `ids`, `count`) and writes
//!   (`attach`, `detach`, `sync`, `save`, `create`, `update`, `delete`).
//!
//! ```ignore
//! let posts = BelongsToMany::<User, Post>::builder()
//!     .with_pivot(["role"])
//!     .with_timestamps()
//!     .build()?;
//!
//! let mut user = load_user(cx, conn).await?;
//! let mut user_posts = posts.bind(&mut user);
//! user_posts
//!     .attach_with(cx, conn, [10_i64, 20], |pivot| {
//!         pivot.set("role", "owner");
//!     })
//!     .await;
//! ```

mod cache;
mod config;
mod group;
mod handle;
mod pivot;
mod predicate;
mod query;
mod write;

pub use cache::PivotCache;
pub use config::{
    BelongsToMany, BelongsToManyBuilder, PivotConfig, PivotModel, PivotTarget, RelationKeys,
    RelationSettings,
};
pub use group::{Group, GroupedResult, WithPivot};
pub use handle::BelongsToManyHandle;
pub use pivot::{CREATED_AT, PivotRow, UPDATED_AT};
pub use predicate::{Connector, PivotPredicate};
pub use query::PIVOT_PREFIX;
pub use write::References;

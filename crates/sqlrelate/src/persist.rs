//! Saving single records.
//!
//! The relation engine needs to persist parents and related records before
//! it can write pivot rows. New records are inserted and receive their
//! generated id; dirty records are updated by primary key; clean records are
//! left alone.

use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Error, Model};
use sqlrelate_query::{InsertBuilder, UpdateBuilder};

/// What [`save_model`] did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    Inserted,
    Updated,
    Unchanged,
}

/// Persist `model` if it is new or dirty.
#[tracing::instrument(level = "trace", skip(cx, conn, model))]
pub async fn save_model<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    model: &mut M,
) -> Outcome<SaveAction, Error> {
    if model.is_new() {
        let id = match InsertBuilder::for_model(&*model)
            .execute_returning_id(cx, conn)
            .await
        {
            Outcome::Ok(id) => id,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        model.set_id(id);
        model.mark_clean();
        tracing::trace!(table = M::TABLE_NAME, id, "Inserted record");
        return Outcome::Ok(SaveAction::Inserted);
    }

    if model.is_dirty() {
        match UpdateBuilder::for_model(&*model).execute(cx, conn).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        model.mark_clean();
        tracing::trace!(table = M::TABLE_NAME, "Updated record");
        return Outcome::Ok(SaveAction::Updated);
    }

    Outcome::Ok(SaveAction::Unchanged)
}

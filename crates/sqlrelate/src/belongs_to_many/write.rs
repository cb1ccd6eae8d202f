//! Link management and writes through a bound relation.
//!
//! Per-item writes in one call (`attach`, `save_many`, `create_many`) are
//! issued together and settled before returning. The first failure in input
//! order is reported. Items that succeeded are not rolled back and stay in
//! the pivot cache.

use super::group::WithPivot;
use super::handle::BelongsToManyHandle;
use super::pivot::PivotRow;
use crate::persist::save_model;
use asupersync::{Cx, Outcome};
use futures::future::join_all;
use sqlrelate_core::{Connection, Error, Model, Value};
use sqlrelate_query::{DeleteBuilder, Expr, UpdateBuilder};

/// Related key values to link or unlink; built from one value or a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References(pub Vec<Value>);

impl References {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Value> for References {
    fn from(value: Value) -> Self {
        References(vec![value])
    }
}

impl From<i64> for References {
    fn from(value: i64) -> Self {
        References(vec![Value::BigInt(value)])
    }
}

impl From<i32> for References {
    fn from(value: i32) -> Self {
        References(vec![Value::Int(value)])
    }
}

impl From<&str> for References {
    fn from(value: &str) -> Self {
        References(vec![Value::Text(value.to_string())])
    }
}

impl From<Vec<Value>> for References {
    fn from(values: Vec<Value>) -> Self {
        References(values)
    }
}

impl From<&[Value]> for References {
    fn from(values: &[Value]) -> Self {
        References(values.to_vec())
    }
}

impl From<Vec<i64>> for References {
    fn from(values: Vec<i64>) -> Self {
        References(values.into_iter().map(Value::BigInt).collect())
    }
}

impl<const N: usize> From<[i64; N]> for References {
    fn from(values: [i64; N]) -> Self {
        References(values.into_iter().map(Value::BigInt).collect())
    }
}

impl<const N: usize> From<[Value; N]> for References {
    fn from(values: [Value; N]) -> Self {
        References(values.into())
    }
}

fn no_callback(_: &mut PivotRow) {}

/// The non-`Ok` part of an outcome, retyped for the caller.
fn unsettled<T, U>(outcome: Outcome<T, Error>) -> Option<Outcome<U, Error>> {
    match outcome {
        Outcome::Ok(_) => None,
        Outcome::Err(e) => Some(Outcome::Err(e)),
        Outcome::Cancelled(r) => Some(Outcome::Cancelled(r)),
        Outcome::Panicked(p) => Some(Outcome::Panicked(p)),
    }
}

impl<P: Model, R: Model> BelongsToManyHandle<'_, P, R> {
    /// Load pivot rows into the cache unless it is already loaded.
    #[tracing::instrument(level = "trace", skip(self, cx, conn))]
    async fn load_and_cache_pivot<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        if self.cache.is_loaded() {
            return Outcome::Ok(());
        }
        let query = match self.pivot_query(true) {
            Ok(query) => query,
            Err(e) => return Outcome::Err(e),
        };
        let rows = match query.fetch_rows(cx, conn).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let table = self.relation.pivot_table().to_string();
        let pivots = rows
            .iter()
            .map(|row| PivotRow::from_db_row(table.as_str(), row))
            .collect::<Vec<_>>();
        tracing::trace!(pivot_table = %table, cached = pivots.len(), "Cached pivot rows");
        self.cache.populate(pivots);
        Outcome::Ok(())
    }

    /// Link the parent to `references`.
    ///
    /// Links that already exist are reused without a write. Returns one pivot
    /// row per reference, in input order.
    pub async fn attach<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        references: impl Into<References>,
    ) -> Outcome<Vec<PivotRow>, Error> {
        self.attach_inner(cx, conn, references.into(), &no_callback)
            .await
    }

    /// [`attach`](Self::attach) with a callback that fills new pivot rows.
    pub async fn attach_with<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        references: impl Into<References>,
        callback: F,
    ) -> Outcome<Vec<PivotRow>, Error> {
        self.attach_inner(cx, conn, references.into(), &callback)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, conn, references, callback))]
    async fn attach_inner<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        references: References,
        callback: &F,
    ) -> Outcome<Vec<PivotRow>, Error> {
        let parent_value = match self.parent_key_value("attach") {
            Ok(value) => value,
            Err(e) => return Outcome::Err(e),
        };
        if references.values().iter().any(Value::is_null) {
            return Outcome::Err(Error::invalid_argument(
                "attach",
                Some("NULL".to_string()),
                "references must not be NULL",
            ));
        }
        match self.load_and_cache_pivot(cx, conn).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let keys = self.relation.keys().clone();
        let target = self.relation.config().target().clone();
        let mut pending: Vec<PivotRow> = Vec::new();
        for reference in references.values() {
            let linked = self.cache.find(&keys.related_pivot_key, reference).is_some();
            let queued = pending.iter().any(|row| {
                row.get(&keys.related_pivot_key)
                    .is_some_and(|v| v.same_identity(reference))
            });
            if linked || queued {
                continue;
            }
            let mut row = PivotRow::for_target(&target);
            row.set(keys.related_pivot_key.as_str(), reference.clone())
                .set(keys.foreign_pivot_key.as_str(), parent_value.clone());
            callback(&mut row);
            pending.push(row);
        }

        tracing::debug!(
            pivot_table = target.table(),
            requested = references.values().len(),
            inserting = pending.len(),
            "Attaching related records"
        );

        let results = join_all(pending.iter_mut().map(|row| row.save(cx, conn))).await;

        let mut failure: Option<Outcome<Vec<PivotRow>, Error>> = None;
        let mut saved = 0_usize;
        for (row, result) in pending.into_iter().zip(results) {
            match result {
                Outcome::Ok(()) => {
                    saved += 1;
                    self.cache.push(row);
                }
                other => {
                    if failure.is_none() {
                        failure = unsettled(other);
                    }
                }
            }
        }
        if let Some(failure) = failure {
            tracing::warn!(
                pivot_table = target.table(),
                saved,
                "Attach failed after saving some pivot rows"
            );
            return failure;
        }

        let rows = references
            .values()
            .iter()
            .filter_map(|reference| {
                self.cache
                    .find(&keys.related_pivot_key, reference)
                    .cloned()
            })
            .collect();
        Outcome::Ok(rows)
    }

    /// Remove links.
    ///
    /// With `Some(references)` only those links go; with `None` every link of
    /// the parent is removed and the cache is cleared. Returns the number of
    /// pivot rows deleted.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, references))]
    pub async fn detach<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        references: Option<References>,
    ) -> Outcome<u64, Error> {
        let parent_value = match self.parent_key_value("detach") {
            Ok(value) => value,
            Err(e) => return Outcome::Err(e),
        };
        let keys = self.relation.keys().clone();
        let mut delete = DeleteBuilder::table(self.relation.pivot_table())
            .filter(Expr::col(keys.foreign_pivot_key.as_str()).eq(parent_value));

        let Some(references) = references else {
            let deleted = match delete.execute(cx, conn).await {
                Outcome::Ok(n) => n,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            self.cache.clear();
            tracing::debug!(deleted, "Detached all related records");
            return Outcome::Ok(deleted);
        };

        if references.is_empty() {
            return Outcome::Ok(0);
        }
        delete = delete.filter(
            Expr::col(keys.related_pivot_key.as_str()).in_list(references.values().to_vec()),
        );
        let deleted = match delete.execute(cx, conn).await {
            Outcome::Ok(n) => n,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let evicted = self.cache.evict(&keys.related_pivot_key, references.values());
        tracing::debug!(deleted, evicted, "Detached related records");
        Outcome::Ok(deleted)
    }

    /// Replace every link of the parent with `references`.
    pub async fn sync<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        references: impl Into<References>,
    ) -> Outcome<Vec<PivotRow>, Error> {
        self.sync_with(cx, conn, references, no_callback).await
    }

    /// [`sync`](Self::sync) with a callback that fills new pivot rows.
    pub async fn sync_with<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        references: impl Into<References>,
        callback: F,
    ) -> Outcome<Vec<PivotRow>, Error> {
        let references = references.into();
        match self.detach(cx, conn, None).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        self.attach_inner(cx, conn, references, &callback).await
    }

    /// Insert the parent if it has never been saved.
    async fn ensure_parent_persisted<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<(), Error> {
        if !self.parent.is_new() {
            return Outcome::Ok(());
        }
        save_model(cx, conn, &mut *self.parent).await.map(|_| ())
    }

    /// Related key of a saved related record.
    #[allow(clippy::result_large_err)]
    fn related_key_value(&self, method: &'static str, related: &R) -> Result<Value, Error> {
        let related_key = &self.relation.keys().related_key;
        match related.column_value(related_key) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(Error::invalid_argument(
                method,
                Some("NULL".to_string()),
                format!("related {}.{related_key} has no value", R::TABLE_NAME),
            )),
        }
    }

    /// Save `related` if needed and link it to the parent.
    pub async fn save<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        related: R,
    ) -> Outcome<WithPivot<R>, Error> {
        self.save_with(cx, conn, related, no_callback).await
    }

    /// [`save`](Self::save) with a callback that fills the new pivot row.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, related, callback))]
    pub async fn save_with<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        related: R,
        callback: F,
    ) -> Outcome<WithPivot<R>, Error> {
        self.save_many_with(cx, conn, vec![related], callback)
            .await
            .and_then(|mut saved| match saved.pop() {
                Some(item) => Outcome::Ok(item),
                None => Outcome::Err(Error::Custom(
                    "save produced no related record".to_string(),
                )),
            })
    }

    /// Save every record if needed and link them all to the parent.
    ///
    /// Records that saved are linked even when another record fails; the
    /// first failure is returned afterwards.
    pub async fn save_many<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        related: Vec<R>,
    ) -> Outcome<Vec<WithPivot<R>>, Error> {
        self.save_many_with(cx, conn, related, no_callback).await
    }

    /// [`save_many`](Self::save_many) with a callback that fills new pivot rows.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, related, callback))]
    pub async fn save_many_with<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        mut related: Vec<R>,
        callback: F,
    ) -> Outcome<Vec<WithPivot<R>>, Error> {
        match self.ensure_parent_persisted(cx, conn).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        if related.is_empty() {
            return Outcome::Ok(Vec::new());
        }

        let results = join_all(related.iter_mut().map(|record| save_model(cx, conn, record))).await;
        let mut failure: Option<Outcome<Vec<WithPivot<R>>, Error>> = None;
        let mut references = Vec::with_capacity(related.len());
        for (record, result) in related.iter().zip(results) {
            match result {
                Outcome::Ok(_) => match self.related_key_value("save", record) {
                    Ok(value) => references.push(value),
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(Outcome::Err(e));
                        }
                    }
                },
                other => {
                    if failure.is_none() {
                        failure = unsettled(other);
                    }
                }
            }
        }

        // Records that saved are linked even when a sibling failed.
        let attached = if references.is_empty() {
            Outcome::Ok(Vec::new())
        } else {
            self.attach_inner(cx, conn, References(references), &callback)
                .await
        };
        if let Some(failure) = failure {
            tracing::warn!(
                related = R::TABLE_NAME,
                count = related.len(),
                linked = match &attached {
                    Outcome::Ok(pivots) => pivots.len(),
                    _ => 0,
                },
                "Saving related records failed"
            );
            return failure;
        }
        let pivots = match attached {
            Outcome::Ok(pivots) => pivots,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let keys = self.relation.keys();
        let saved = related
            .into_iter()
            .map(|model| {
                let pivot = model.column_value(&keys.related_key).and_then(|key| {
                    pivots
                        .iter()
                        .find(|p| {
                            p.get(&keys.related_pivot_key)
                                .is_some_and(|v| v.same_identity(&key))
                        })
                        .cloned()
                });
                WithPivot { model, pivot }
            })
            .collect();
        Outcome::Ok(saved)
    }

    /// Bulk-update every related record linked to the parent.
    ///
    /// Returns the number of related rows updated.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, values))]
    pub async fn update<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        values: Vec<(String, Value)>,
    ) -> Outcome<u64, Error> {
        if values.is_empty() {
            return Outcome::Err(Error::invalid_argument(
                "update",
                None,
                "no columns to update",
            ));
        }
        let ids = match self.ids(cx, conn).await {
            Outcome::Ok(ids) => ids,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        if ids.is_empty() {
            return Outcome::Ok(0);
        }
        let related_key = self.relation.keys().related_key.as_str();
        values
            .into_iter()
            .fold(UpdateBuilder::table(R::TABLE_NAME), |update, (column, value)| {
                update.set(column, value)
            })
            .filter(Expr::col(related_key).in_list(ids))
            .execute(cx, conn)
            .await
    }

    /// Delete every related record linked to the parent, then detach them.
    ///
    /// Not transactional: when detaching fails the related rows stay deleted
    /// and the error is returned. Returns the number of related rows deleted.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn delete<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let ids = match self.ids(cx, conn).await {
            Outcome::Ok(ids) => ids,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        if ids.is_empty() {
            return Outcome::Ok(0);
        }

        let related_key = self.relation.keys().related_key.clone();
        let deleted = match DeleteBuilder::table(R::TABLE_NAME)
            .filter(Expr::col(related_key.as_str()).in_list(ids.clone()))
            .execute(cx, conn)
            .await
        {
            Outcome::Ok(n) => n,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match self.detach(cx, conn, Some(References(ids))).await {
            Outcome::Ok(_) => Outcome::Ok(deleted),
            Outcome::Err(e) => {
                tracing::warn!(
                    related = R::TABLE_NAME,
                    deleted,
                    error = %e,
                    "Related rows deleted but pivot rows were not detached"
                );
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl<P: Model, R: Model + Default> BelongsToManyHandle<'_, P, R> {
    /// Build a related record from attributes, save it and link it.
    pub async fn create<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        attributes: Vec<(String, Value)>,
    ) -> Outcome<WithPivot<R>, Error> {
        self.create_with(cx, conn, attributes, no_callback).await
    }

    /// [`create`](Self::create) with a callback that fills the new pivot row.
    pub async fn create_with<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        attributes: Vec<(String, Value)>,
        callback: F,
    ) -> Outcome<WithPivot<R>, Error> {
        let record = match build_record::<R>(&attributes) {
            Ok(record) => record,
            Err(e) => return Outcome::Err(e),
        };
        self.save_with(cx, conn, record, callback).await
    }

    /// Build related records from attribute lists, save them and link them.
    pub async fn create_many<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
        rows: Vec<Vec<(String, Value)>>,
    ) -> Outcome<Vec<WithPivot<R>>, Error> {
        self.create_many_with(cx, conn, rows, no_callback).await
    }

    /// [`create_many`](Self::create_many) with a callback that fills new pivot rows.
    pub async fn create_many_with<C: Connection, F: Fn(&mut PivotRow)>(
        &mut self,
        cx: &Cx,
        conn: &C,
        rows: Vec<Vec<(String, Value)>>,
        callback: F,
    ) -> Outcome<Vec<WithPivot<R>>, Error> {
        let mut records = Vec::with_capacity(rows.len());
        for attributes in &rows {
            match build_record::<R>(attributes) {
                Ok(record) => records.push(record),
                Err(e) => return Outcome::Err(e),
            }
        }
        self.save_many_with(cx, conn, records, callback).await
    }
}

#[allow(clippy::result_large_err)]
fn build_record<R: Model + Default>(attributes: &[(String, Value)]) -> Result<R, Error> {
    let mut record = R::default();
    record.fill(attributes)?;
    Ok(record)
}

//! A relation bound to one parent record.

use super::cache::PivotCache;
use super::config::BelongsToMany;
use super::group::WithPivot;
use super::pivot::PivotRow;
use crate::collection::Collection;
use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Error, Model, Result, Value};
use sqlrelate_query::{Expr, Select};

/// [`BelongsToMany`] bound to a parent, with that parent's pivot cache.
///
/// Create one with [`BelongsToMany::bind`]. Reads go straight to the
/// database; writes keep the cache in step with the pivot table.
pub struct BelongsToManyHandle<'p, P, R> {
    pub(crate) relation: BelongsToMany<P, R>,
    pub(crate) parent: &'p mut P,
    pub(crate) cache: PivotCache,
}

impl<P: Model, R: Model> BelongsToMany<P, R> {
    /// Bind the relation to `parent`. The handle starts with an empty cache.
    pub fn bind<'p>(&self, parent: &'p mut P) -> BelongsToManyHandle<'p, P, R> {
        BelongsToManyHandle {
            relation: self.clone(),
            parent,
            cache: PivotCache::new(),
        }
    }
}

impl<P: Model, R: Model> BelongsToManyHandle<'_, P, R> {
    pub fn relation(&self) -> &BelongsToMany<P, R> {
        &self.relation
    }

    pub fn parent(&self) -> &P {
        &*self.parent
    }

    /// Pivot rows cached so far, in load and attach order.
    pub fn cached_pivots(&self) -> &[PivotRow] {
        self.cache.rows()
    }

    /// Cached pivot row linking to `related_value`.
    pub fn cached_pivot(&self, related_value: &Value) -> Option<&PivotRow> {
        self.cache
            .find(&self.relation.keys().related_pivot_key, related_value)
    }

    /// Forget cached pivot rows so the next write reloads them.
    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Drop cached rows for `related_values` without touching the database.
    pub fn evict_cached(&mut self, related_values: &[Value]) -> usize {
        let column = self.relation.keys().related_pivot_key.clone();
        self.cache.evict(&column, related_values)
    }

    /// Parent key value, rejected when the parent has none.
    #[allow(clippy::result_large_err)]
    pub(crate) fn parent_key_value(&self, method: &'static str) -> Result<Value> {
        let parent_key = &self.relation.keys().parent_key;
        match self.parent.column_value(parent_key) {
            Some(value) if !value.is_null() => Ok(value),
            Some(_) => Err(Error::invalid_argument(
                method,
                Some("NULL".to_string()),
                format!("parent {}.{parent_key} has no value", P::TABLE_NAME),
            )),
            None => Err(Error::invalid_argument(
                method,
                None,
                format!("parent {} has no column {parent_key}", P::TABLE_NAME),
            )),
        }
    }

    /// Query on the pivot table restricted to this parent.
    ///
    /// With `select_fields` only the pivot columns are selected. Pivot
    /// predicates are not applied; link bookkeeping covers every row.
    #[allow(clippy::result_large_err)]
    pub fn pivot_query(&self, select_fields: bool) -> Result<Select> {
        let parent_value = self.parent_key_value("pivot_query")?;
        let keys = self.relation.keys();
        let mut query = Select::table(self.relation.pivot_table())
            .filter(Expr::col(keys.foreign_pivot_key.as_str()).eq(parent_value));
        if select_fields {
            let columns = self.relation.pivot_columns();
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            query = query.columns(&columns);
        }
        Ok(query)
    }

    /// Pivot query narrowed by the relation's pivot predicates.
    #[allow(clippy::result_large_err)]
    fn filtered_pivot_query(&self, select_fields: bool) -> Result<Select> {
        let query = self.pivot_query(select_fields)?;
        Ok(
            match super::predicate::combine(
                self.relation.config().predicates(),
                self.relation.pivot_table(),
            ) {
                Some(predicates) => query.filter(predicates),
                None => query,
            },
        )
    }

    /// Related key values linked to the parent.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn ids<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Value>, Error> {
        let related_pivot_key = self.relation.keys().related_pivot_key.clone();
        let query = match self.filtered_pivot_query(false) {
            Ok(query) => query.columns(&[related_pivot_key.as_str()]),
            Err(e) => return Outcome::Err(e),
        };
        query.pluck(cx, conn, &related_pivot_key).await
    }

    /// Related records of the parent, each with its pivot row.
    ///
    /// Runs two queries: pivot rows first, then related records by key.
    /// Records come back in the order the database returns them.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn fetch<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Collection<WithPivot<R>>, Error> {
        let keys = self.relation.keys();
        let pivot_query = match self.filtered_pivot_query(true) {
            Ok(query) => query,
            Err(e) => return Outcome::Err(e),
        };
        let pivot_rows = match pivot_query.fetch_rows(cx, conn).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let pivots: Vec<PivotRow> = pivot_rows
            .iter()
            .map(|row| PivotRow::from_db_row(self.relation.pivot_table(), row))
            .collect();

        let mut related_ids: Vec<Value> = Vec::with_capacity(pivots.len());
        for pivot in &pivots {
            if let Some(value) = pivot.get(&keys.related_pivot_key) {
                if !related_ids.iter().any(|v| v.same_identity(value)) {
                    related_ids.push(value.clone());
                }
            }
        }
        if related_ids.is_empty() {
            tracing::debug!(related = R::TABLE_NAME, "No pivot rows for parent");
            return Outcome::Ok(Collection::new());
        }

        let related_query = self
            .relation
            .select_related(Select::of::<R>())
            .filter(Expr::qualified(R::TABLE_NAME, keys.related_key.as_str()).in_list(related_ids));
        let models: Vec<R> = match related_query.all::<R, C>(cx, conn).await {
            Outcome::Ok(models) => models,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut rows = Collection::new();
        for model in models {
            let pivot = model.column_value(&keys.related_key).and_then(|key| {
                pivots
                    .iter()
                    .find(|p| {
                        p.get(&keys.related_pivot_key)
                            .is_some_and(|v| v.same_identity(&key))
                    })
                    .cloned()
            });
            rows.add_row(WithPivot { model, pivot });
        }

        tracing::debug!(
            related = R::TABLE_NAME,
            fetched = rows.len(),
            "Fetched related records"
        );
        Outcome::Ok(rows)
    }

    /// Number of related records linked to the parent.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn count<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let parent_value = match self.parent_key_value("count") {
            Ok(value) => value,
            Err(e) => return Outcome::Err(e),
        };
        let condition = Expr::qualified(
            self.relation.pivot_table(),
            self.relation.keys().foreign_pivot_key.as_str(),
        )
        .eq(parent_value);
        self.relation
            .join_pivot(Select::of::<R>())
            .filter(self.relation.with_pivot_predicates(condition))
            .count(cx, conn)
            .await
    }
}

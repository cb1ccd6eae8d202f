//! Grouping eager-loaded rows by parent.

use super::config::BelongsToMany;
use super::pivot::PivotRow;
use super::query::PIVOT_PREFIX;
use crate::collection::Collection;
use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Error, Model, Result, Row, TypeError, Value};
use std::ops::Deref;

/// A related record together with the pivot row that links it.
#[derive(Debug, Clone, PartialEq)]
pub struct WithPivot<R> {
    pub model: R,
    pub pivot: Option<PivotRow>,
}

impl<R> WithPivot<R> {
    pub fn into_model(self) -> R {
        self.model
    }

    /// Pivot attribute, if the pivot row is attached and has the column.
    pub fn pivot_value(&self, column: &str) -> Option<&Value> {
        self.pivot.as_ref().and_then(|pivot| pivot.get(column))
    }
}

impl<R> Deref for WithPivot<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.model
    }
}

/// Related rows of one parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<T> {
    /// Parent key value the rows belong to.
    pub identity: Value,
    pub rows: Collection<T>,
}

/// Eager-load result: one group per parent key seen in the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedResult<T> {
    /// Parent key column the groups are keyed on.
    pub key: String,
    /// Groups in order of first appearance.
    pub values: Vec<Group<T>>,
    /// Returned for parents with no group.
    pub default_value: Collection<T>,
}

impl<T> GroupedResult<T> {
    /// Rows of the parent whose key has the identity of `key`.
    pub fn for_parent(&self, key: &Value) -> &Collection<T> {
        self.values
            .iter()
            .find(|group| group.identity.same_identity(key))
            .map_or(&self.default_value, |group| &group.rows)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<P: Model, R: Model> BelongsToMany<P, R> {
    /// Split joined rows into per-parent groups.
    ///
    /// Each row must carry `pivot_<foreign_pivot_key>`. Pivot columns are
    /// stripped before the related record is decoded and become its pivot row.
    #[allow(clippy::result_large_err)]
    pub fn group(&self, rows: Vec<Row>) -> Result<GroupedResult<WithPivot<R>>> {
        let key_column = format!("{PIVOT_PREFIX}{}", self.keys().foreign_pivot_key);
        let mut values: Vec<Group<WithPivot<R>>> = Vec::new();

        for row in &rows {
            let identity = match row.get_by_name(&key_column) {
                Some(value) if !value.is_null() => value.clone(),
                Some(_) | None => {
                    return Err(Error::Type(TypeError {
                        expected: "pivot foreign key",
                        actual: "missing".to_string(),
                        column: Some(key_column),
                    }));
                }
            };

            let model = R::from_row(&row.without_prefix(PIVOT_PREFIX))?;
            let pivot = PivotRow::from_db_row(self.pivot_table(), &row.subset_by_prefix(PIVOT_PREFIX));
            let item = WithPivot {
                model,
                pivot: Some(pivot),
            };

            match values
                .iter_mut()
                .find(|group| group.identity.same_identity(&identity))
            {
                Some(group) => group.rows.add_row(item),
                None => values.push(Group {
                    identity,
                    rows: Collection::from_rows(vec![item]),
                }),
            }
        }

        tracing::trace!(
            rows = rows.len(),
            groups = values.len(),
            "Grouped eager-loaded rows"
        );

        Ok(GroupedResult {
            key: self.keys().parent_key.clone(),
            values,
            default_value: Collection::new(),
        })
    }

    /// Load and group related records for a batch of parents in one query.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, parents))]
    pub async fn load<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        parents: &[P],
    ) -> Outcome<GroupedResult<WithPivot<R>>, Error> {
        let keys = self.map_values(parents);
        let rows = match self.eager_load(cx, conn, &keys).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match self.group(rows) {
            Ok(grouped) => Outcome::Ok(grouped),
            Err(e) => Outcome::Err(e),
        }
    }
}

//! Query composition for a relation.
//!
//! Everything here builds [`Select`] values and never touches a parent
//! instance, so the same definition serves eager loading across many parents.

use super::config::BelongsToMany;
use super::predicate;
use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Error, Model, Row, Value};
use sqlrelate_query::{Expr, Join, JoinType, Select};

/// Prefix of pivot columns in joined rows.
pub const PIVOT_PREFIX: &str = "pivot_";

impl<P: Model, R: Model> BelongsToMany<P, R> {
    /// Pivot columns loaded with related rows: both foreign keys, then the
    /// extra columns in the order they were added.
    pub fn pivot_columns(&self) -> Vec<String> {
        let keys = self.keys();
        let mut columns = vec![keys.related_pivot_key.clone(), keys.foreign_pivot_key.clone()];
        for column in self.config.extra_columns() {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }

    /// Parent key value of each parent, NULLs and duplicates dropped.
    pub fn map_values(&self, parents: &[P]) -> Vec<Value> {
        let parent_key = &self.keys().parent_key;
        let mut values: Vec<Value> = Vec::with_capacity(parents.len());
        for parent in parents {
            let Some(value) = parent.column_value(parent_key) else {
                continue;
            };
            if value.is_null() || values.iter().any(|v| v.same_identity(&value)) {
                continue;
            }
            values.push(value);
        }
        values
    }

    /// Related columns, qualified with the related table.
    pub(crate) fn select_related(&self, query: Select) -> Select {
        let columns = self.config.related_columns();
        if columns.is_empty() {
            return query.all_columns_of(R::TABLE_NAME);
        }
        columns.iter().fold(query, |query, column| {
            if column == "*" {
                query.all_columns_of(R::TABLE_NAME)
            } else {
                query.column(Expr::qualified(R::TABLE_NAME, column.as_str()))
            }
        })
    }

    /// Related table joined with the pivot table on the related key.
    pub(crate) fn join_pivot(&self, query: Select) -> Select {
        let keys = self.keys();
        let pivot = self.pivot_table();
        query.join(Join::inner(
            pivot,
            Expr::qualified(R::TABLE_NAME, keys.related_key.as_str())
                .eq(Expr::qualified(pivot, keys.related_pivot_key.as_str())),
        ))
    }

    /// AND `condition` with the folded pivot predicates.
    pub(crate) fn with_pivot_predicates(&self, condition: Expr) -> Expr {
        match predicate::combine(self.config.predicates(), self.pivot_table()) {
            Some(predicates) => condition.and(predicates),
            None => condition,
        }
    }

    /// Selected related columns plus every pivot column aliased `pivot_<col>`,
    /// joined through the pivot table.
    pub fn decorated_query(&self) -> Select {
        let pivot = self.pivot_table();
        let query = self
            .pivot_columns()
            .into_iter()
            .fold(self.select_related(Select::of::<R>()), |query, column| {
                let alias = format!("{PIVOT_PREFIX}{column}");
                query.column_as(Expr::qualified(pivot, column), alias)
            });
        self.join_pivot(query)
    }

    /// Related rows for a batch of parent keys, in one query.
    pub fn eager_query(&self, parent_keys: &[Value]) -> Select {
        let condition = Expr::qualified(self.pivot_table(), self.keys().foreign_pivot_key.as_str())
            .in_list(parent_keys.to_vec());
        self.decorated_query()
            .filter(self.with_pivot_predicates(condition))
    }

    /// Run [`eager_query`](Self::eager_query) and return the flat rows.
    ///
    /// An empty key list returns no rows without touching the database.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, parent_keys))]
    pub async fn eager_load<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        parent_keys: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        if parent_keys.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        tracing::debug!(
            related = R::TABLE_NAME,
            pivot_table = self.pivot_table(),
            parent_count = parent_keys.len(),
            "Eager loading related rows"
        );
        self.eager_query(parent_keys).fetch_rows(cx, conn).await
    }

    /// Related query correlated with an outer query on the parent table.
    ///
    /// Meant for existence checks:
    /// `Select::of::<User>().filter(posts.related_where(false).into_exists())`.
    /// With `count` the projection is `COUNT(*)`.
    pub fn related_where(&self, count: bool) -> Select {
        let keys = self.keys();
        let correlation = Expr::qualified(P::TABLE_NAME, keys.parent_key.as_str()).eq(
            Expr::qualified(self.pivot_table(), keys.foreign_pivot_key.as_str()),
        );
        let query = self
            .join_pivot(Select::of::<R>())
            .filter(self.with_pivot_predicates(correlation));
        if count {
            query.count_projection()
        } else {
            query
        }
    }

    /// Attach `parent.key = pivot.foreign_key` to a join's ON clause.
    pub fn add_where_on<'j>(&self, join: &'j mut Join) -> &'j mut Join {
        let keys = self.keys();
        join.on(
            Expr::qualified(P::TABLE_NAME, keys.parent_key.as_str()).eq(Expr::qualified(
                self.pivot_table(),
                keys.foreign_pivot_key.as_str(),
            )),
        )
    }

    /// `INNER JOIN pivot ON parent.key = pivot.foreign_key`, for queries on
    /// the parent table.
    pub fn parent_join(&self) -> Join {
        let mut join = Join::table(JoinType::Inner, self.pivot_table());
        self.add_where_on(&mut join);
        join
    }
}

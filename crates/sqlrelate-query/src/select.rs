//! SELECT query builder.
//!
//! Queries are addressed by table name rather than by model type so the same
//! builder serves model tables and pivot tables whose names are only known at
//! runtime.

use crate::clause::Where;
use crate::expr::Expr;
use crate::join::Join;
use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Dialect, Error, Model, Row, Value};

/// One entry of the SELECT list.
#[derive(Debug, Clone)]
enum SelectItem {
    /// `*` or `"table".*`
    Wildcard(Option<String>),
    /// Expression with an optional alias
    Expr { expr: Expr, alias: Option<String> },
}

/// A SELECT query builder.
#[derive(Debug, Clone)]
pub struct Select {
    table: String,
    /// Columns to select (empty = all)
    columns: Vec<SelectItem>,
    where_clause: Option<Where>,
    joins: Vec<Join>,
    distinct: bool,
    limit: Option<u64>,
}

impl Select {
    /// Create a new SELECT query against `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            where_clause: None,
            joins: Vec::new(),
            distinct: false,
            limit: None,
        }
    }

    /// Create a new SELECT query for the model's table.
    pub fn of<M: Model>() -> Self {
        Self::table(M::TABLE_NAME)
    }

    /// Select specific columns of the base table, replacing the current list.
    ///
    /// `*` selects every column.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols
            .iter()
            .map(|&c| {
                if c == "*" {
                    SelectItem::Wildcard(None)
                } else {
                    SelectItem::Expr {
                        expr: Expr::col(c),
                        alias: None,
                    }
                }
            })
            .collect();
        self
    }

    /// Append an expression to the SELECT list.
    pub fn column(mut self, expr: Expr) -> Self {
        self.columns.push(SelectItem::Expr { expr, alias: None });
        self
    }

    /// Append an aliased expression to the SELECT list.
    pub fn column_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(SelectItem::Expr {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Append `"table".*` to the SELECT list.
    pub fn all_columns_of(mut self, table: impl Into<String>) -> Self {
        self.columns.push(SelectItem::Wildcard(Some(table.into())));
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::and_opt(self.where_clause.take(), expr));
        self
    }

    /// Add an OR WHERE condition.
    pub fn or_filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::or_opt(self.where_clause.take(), expr));
        self
    }

    /// Add a JOIN clause.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Make this a DISTINCT query.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Replace the SELECT list with `COUNT(*) AS "count"`.
    pub fn count_projection(mut self) -> Self {
        self.columns = vec![SelectItem::Expr {
            expr: Expr::count_star(),
            alias: Some("count".to_string()),
        }];
        self.limit = None;
        self
    }

    /// Build the SQL query and parameters.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build_into(dialect, &mut params);
        (sql, params)
    }

    /// Render the query into a shared parameter list.
    ///
    /// Used directly when the query is embedded as a subquery.
    pub fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let mut parts = Vec::with_capacity(self.columns.len());
            for item in &self.columns {
                parts.push(match item {
                    SelectItem::Wildcard(None) => "*".to_string(),
                    SelectItem::Wildcard(Some(table)) => {
                        format!("{}.*", dialect.quote_identifier(table))
                    }
                    SelectItem::Expr { expr, alias } => {
                        let expr_sql = expr.build(dialect, params);
                        match alias {
                            Some(alias) => {
                                format!("{expr_sql} AS {}", dialect.quote_identifier(alias))
                            }
                            None => expr_sql,
                        }
                    }
                });
            }
            sql.push_str(&parts.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote_identifier(&self.table));

        for join in &self.joins {
            sql.push_str(&join.build_into(dialect, params));
        }

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_into(dialect, params));
        }

        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        sql
    }

    /// Convert this query to an EXISTS expression for use in another query.
    pub fn into_exists(self) -> Expr {
        Expr::exists(self)
    }

    /// Execute the query and return the raw rows.
    pub async fn fetch_rows<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, params = params.len(), "Executing select");
        conn.query(cx, &sql, &params).await
    }

    /// Execute the query and decode every row as `M`.
    pub async fn all<M: Model, C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<Vec<M>, Error> {
        let rows = self.fetch_rows(cx, conn).await;

        rows.and_then(|rows| {
            let mut models = Vec::with_capacity(rows.len());
            for row in &rows {
                match M::from_row(row) {
                    Ok(model) => models.push(model),
                    Err(e) => return Outcome::Err(e),
                }
            }
            Outcome::Ok(models)
        })
    }

    /// Execute the query and collect one column from every row.
    pub async fn pluck<C: Connection>(
        self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<Vec<Value>, Error> {
        let column = column.to_string();
        let rows = self.fetch_rows(cx, conn).await;

        rows.and_then(|rows| {
            let mut values = Vec::with_capacity(rows.len());
            for row in &rows {
                match row.get_named::<Value>(&column) {
                    Ok(value) => values.push(value),
                    Err(e) => return Outcome::Err(e),
                }
            }
            Outcome::Ok(values)
        })
    }

    /// Execute the query and return the count of matching rows.
    pub async fn count<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let (sql, params) = self.count_projection().build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing count");
        let row = conn.query_one(cx, &sql, &params).await;

        row.and_then(|opt_row| match opt_row {
            Some(row) => match row.get_named::<i64>("count") {
                Ok(count) => Outcome::Ok(u64::try_from(count).unwrap_or(0)),
                Err(e) => Outcome::Err(e),
            },
            None => Outcome::Ok(0),
        })
    }
}

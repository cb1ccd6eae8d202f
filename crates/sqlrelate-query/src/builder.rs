//! Query builders for INSERT, UPDATE, DELETE operations.

use crate::clause::Where;
use crate::expr::Expr;
use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Dialect, Error, Model, Value};

/// INSERT query builder.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, Value)>,
}

impl InsertBuilder {
    /// Create a new INSERT builder for `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    /// INSERT for a model instance.
    ///
    /// NULL primary key columns are left out so the database can generate them.
    pub fn for_model<M: Model>(model: &M) -> Self {
        let values = model
            .to_row()
            .into_iter()
            .filter(|(name, value)| !(M::PRIMARY_KEY.contains(name) && value.is_null()))
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self {
            table: M::TABLE_NAME.to_string(),
            values,
        }
    }

    /// Set one column.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Set several columns.
    pub fn values<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.values.extend(pairs);
        self
    }

    /// Build the INSERT SQL and parameters.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        if self.values.is_empty() {
            return (
                format!(
                    "INSERT INTO {} DEFAULT VALUES",
                    dialect.quote_identifier(&self.table)
                ),
                Vec::new(),
            );
        }

        let columns: Vec<_> = self
            .values
            .iter()
            .map(|(name, _)| dialect.quote_identifier(name))
            .collect();
        let placeholders: Vec<_> = (1..=self.values.len())
            .map(|i| dialect.placeholder(i))
            .collect();
        let params = self.values.iter().map(|(_, v)| v.clone()).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_identifier(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );
        (sql, params)
    }

    /// Execute the INSERT and return rows affected.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing insert");
        conn.execute(cx, &sql, &params).await
    }

    /// Execute the INSERT and return the generated ID.
    pub async fn execute_returning_id<C: Connection>(
        self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<i64, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing insert returning id");
        conn.insert(cx, &sql, &params).await
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set: Vec<(String, Value)>,
    where_clause: Option<Where>,
}

impl UpdateBuilder {
    /// Create a new UPDATE builder for `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            where_clause: None,
        }
    }

    /// UPDATE of every non-key column of a model instance, matched by primary key.
    pub fn for_model<M: Model>(model: &M) -> Self {
        let mut builder = Self::table(M::TABLE_NAME);
        for (name, value) in model.to_row() {
            if !M::PRIMARY_KEY.contains(&name) {
                builder.set.push((name.to_string(), value));
            }
        }
        for (col, value) in M::PRIMARY_KEY.iter().zip(model.primary_key_value()) {
            builder = builder.filter(Expr::col(*col).eq(value));
        }
        builder
    }

    /// Assign one column.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::and_opt(self.where_clause.take(), expr));
        self
    }

    /// Build the UPDATE SQL and parameters.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::with_capacity(self.set.len());
        let mut set_clauses = Vec::with_capacity(self.set.len());

        for (name, value) in &self.set {
            params.push(value.clone());
            set_clauses.push(format!(
                "{} = {}",
                dialect.quote_identifier(name),
                dialect.placeholder(params.len())
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            set_clauses.join(", ")
        );

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_into(dialect, &mut params));
        }

        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        if self.set.is_empty() {
            return Outcome::Err(Error::invalid_argument(
                "update",
                None,
                format!("no columns to update on {}", self.table),
            ));
        }
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing update");
        conn.execute(cx, &sql, &params).await
    }
}

/// DELETE query builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    where_clause: Option<Where>,
}

impl DeleteBuilder {
    /// Create a new DELETE builder for `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::and_opt(self.where_clause.take(), expr));
        self
    }

    /// Build the DELETE SQL and parameters.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table));
        let mut params = Vec::new();

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_into(dialect, &mut params));
        }

        (sql, params)
    }

    /// Execute the DELETE and return rows affected.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing delete");
        conn.execute(cx, &sql, &params).await
    }
}
